//! The uniform provider contract every backend realisation implements.

use async_trait::async_trait;

use crate::{
    config::{DEFAULT_SSH_CONNECTION_TIMEOUT, DEFAULT_SSH_PORT, DEFAULT_USER},
    StratusError, StratusResult,
};

use super::{
    ByteRange, Image, KeyPair, Network, NetworkRequest, Object, ObjectFilter, SshConfig, Vm,
    VmRequest, VmTemplate, Volume, VolumeAttachment, VolumeAttachmentRequest, VolumeRequest,
};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The uniform contract for provisioning and lifecycle management of cloud
/// compute, storage, network, key-material and object-store resources.
///
/// Every implementation must honour three invariants so higher layers can
/// treat backends identically:
///
/// - repeated `get_*(id)` calls with no intervening mutation return equal
///   records;
/// - a failed `create_*` leaves no partially-created resource observable
///   through `get_*` or `list_*`;
/// - `delete_*` on a nonexistent id fails with *not-found*, never silently
///   succeeds.
///
/// Every operation's failure mode is exactly one [`StratusError`] variant.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Lists available OS images.
    async fn list_images(&self) -> StratusResult<Vec<Image>>;

    /// Returns the image referenced by id.
    async fn get_image(&self, id: &str) -> StratusResult<Image>;

    /// Lists available VM templates.
    async fn list_templates(&self) -> StratusResult<Vec<VmTemplate>>;

    /// Returns the template referenced by id.
    async fn get_template(&self, id: &str) -> StratusResult<VmTemplate>;

    /// Generates an RSA-2048 key pair, registers its public half with the
    /// backend under `name`, and returns the full pair. The private key is
    /// never sent to the backend and cannot be recovered later.
    async fn create_key_pair(&self, name: &str) -> StratusResult<KeyPair>;

    /// Returns the key pair identified by id. The private key field of the
    /// returned record may be empty.
    async fn get_key_pair(&self, id: &str) -> StratusResult<KeyPair>;

    /// Lists registered key pairs.
    async fn list_key_pairs(&self) -> StratusResult<Vec<KeyPair>>;

    /// Deletes the key pair identified by id.
    async fn delete_key_pair(&self, id: &str) -> StratusResult<()>;

    /// Creates a network holding exactly one private subnet with the
    /// requested CIDR plus one started, publicly-reachable gateway VM.
    ///
    /// Compound: any step failure rolls back every previously-completed
    /// step in reverse order, and the observable state is identical to the
    /// pre-call state.
    async fn create_network(&self, request: NetworkRequest) -> StratusResult<Network>;

    /// Returns the network identified by id, gateway id resolved.
    async fn get_network(&self, id: &str) -> StratusResult<Network>;

    /// Lists available networks.
    async fn list_networks(&self) -> StratusResult<Vec<Network>>;

    /// Deletes the network identified by id together with its gateway VM
    /// and subnet, in dependency order.
    async fn delete_network(&self, id: &str) -> StratusResult<()>;

    /// Creates a VM satisfying the request and waits for it to reach
    /// `STARTED`. See the crate documentation for the compound obligations
    /// (key pair handling, user data, gateway wiring, public access,
    /// rollback).
    async fn create_vm(&self, request: VmRequest) -> StratusResult<Vm>;

    /// Returns the VM identified by id.
    async fn get_vm(&self, id: &str) -> StratusResult<Vm>;

    /// Lists available VMs.
    async fn list_vms(&self) -> StratusResult<Vec<Vm>>;

    /// Deletes the VM identified by id, releasing any floating or elastic
    /// IP attributable to it first. Address-release failures are logged and
    /// never prevent instance termination.
    async fn delete_vm(&self, id: &str) -> StratusResult<()>;

    /// Starts the VM identified by id.
    async fn start_vm(&self, id: &str) -> StratusResult<()>;

    /// Stops the VM identified by id.
    async fn stop_vm(&self, id: &str) -> StratusResult<()>;

    /// Assembles the SSH descriptor to reach the VM identified by id,
    /// including the descriptor of its gateway when the VM is only
    /// privately addressed.
    async fn get_ssh_config(&self, id: &str) -> StratusResult<SshConfig> {
        let vm = self.get_vm(id).await?;
        let host = vm.access_ip().ok_or_else(|| {
            StratusError::InvalidArgument(format!("vm {} has no reachable address", id))
        })?;

        let mut ssh = SshConfig::for_vm(&vm, host);
        if !vm.gateway_id.is_empty() {
            let gateway = self.get_vm(&vm.gateway_id).await?;
            let gateway_host = gateway.access_ip().ok_or_else(|| {
                StratusError::InvalidArgument(format!(
                    "gateway {} has no reachable address",
                    vm.gateway_id
                ))
            })?;
            ssh.gateway = Some(Box::new(SshConfig {
                host: gateway_host.to_string(),
                port: DEFAULT_SSH_PORT,
                user: DEFAULT_USER.to_string(),
                private_key: gateway.private_key.clone(),
                connection_timeout: DEFAULT_SSH_CONNECTION_TIMEOUT,
                gateway: None,
            }));
        }
        Ok(ssh)
    }

    /// Creates a block volume.
    async fn create_volume(&self, request: VolumeRequest) -> StratusResult<Volume>;

    /// Returns the volume identified by id.
    async fn get_volume(&self, id: &str) -> StratusResult<Volume>;

    /// Lists available volumes.
    async fn list_volumes(&self) -> StratusResult<Vec<Volume>>;

    /// Deletes the volume identified by id. Attached volumes must be
    /// detached first.
    async fn delete_volume(&self, id: &str) -> StratusResult<()>;

    /// Attaches a volume to a VM. The backend assigns the OS device path.
    async fn create_volume_attachment(
        &self,
        request: VolumeAttachmentRequest,
    ) -> StratusResult<VolumeAttachment>;

    /// Returns the attachment identified by (server id, attachment id).
    async fn get_volume_attachment(
        &self,
        server_id: &str,
        id: &str,
    ) -> StratusResult<VolumeAttachment>;

    /// Lists the volume attachments of a VM.
    async fn list_volume_attachments(
        &self,
        server_id: &str,
    ) -> StratusResult<Vec<VolumeAttachment>>;

    /// Detaches the volume attachment identified by (server id, attachment
    /// id).
    async fn delete_volume_attachment(&self, server_id: &str, id: &str) -> StratusResult<()>;

    /// Creates an object container.
    async fn create_container(&self, name: &str) -> StratusResult<()>;

    /// Deletes an object container.
    async fn delete_container(&self, name: &str) -> StratusResult<()>;

    /// Lists object containers.
    async fn list_containers(&self) -> StratusResult<Vec<String>>;

    /// Writes an object into a container, injecting the reserved
    /// `__date__` and `__delete_at__` metadata keys. Writes are
    /// last-writer-wins.
    async fn put_object(&self, container: &str, object: Object) -> StratusResult<()>;

    /// Replaces the user metadata of an object.
    async fn update_object_metadata(&self, container: &str, object: Object) -> StratusResult<()>;

    /// Reads an object. When `ranges` is non-empty the returned content is
    /// the concatenation of the requested byte ranges in order.
    async fn get_object(
        &self,
        container: &str,
        name: &str,
        ranges: &[ByteRange],
    ) -> StratusResult<Object>;

    /// Reads an object's metadata without its content.
    async fn get_object_metadata(&self, container: &str, name: &str) -> StratusResult<Object>;

    /// Lists the names of the objects of a container matching the filter.
    async fn list_objects(
        &self,
        container: &str,
        filter: ObjectFilter,
    ) -> StratusResult<Vec<String>>;

    /// Copies an object within a container.
    async fn copy_object(
        &self,
        container: &str,
        source: &str,
        destination: &str,
    ) -> StratusResult<()>;

    /// Deletes an object from a container.
    async fn delete_object(&self, container: &str, name: &str) -> StratusResult<()>;
}
