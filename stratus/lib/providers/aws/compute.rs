//! Compute operations of the AWS-family backend: images, instance types,
//! key pairs, instances and elastic IPs.

use base64::{engine::general_purpose, Engine as _};
use futures::future;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{Image, IpVersion, KeyPair, Network, Vm, VmRequest, VmSize, VmState, VmTemplate},
    config::VM_CREATION_TIMEOUT,
    metadata,
    service::wait,
    userdata::UserData,
    utils, StratusError, StratusResult,
};

use super::{
    client::{decode_ec2, ItemList, AWS_INSTANCES_CONTAINER, AWS_NETWORKS_CONTAINER},
    AwsProvider,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The owner accounts whose images are listed when none are configured:
/// Ubuntu, Fedora, Debian, CentOS, CoreOS, Gentoo.
const DEFAULT_IMAGE_OWNERS: &[&str] = &[
    "099720109477",
    "013116697141",
    "379101102735",
    "057448758665",
    "595879546273",
    "902460189751",
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DescribeImagesResponse {
    #[serde(rename = "imagesSet", default)]
    images: ItemList<ImageItem>,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    #[serde(rename = "imageId")]
    image_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeInstanceTypesResponse {
    #[serde(rename = "instanceTypeSet", default)]
    instance_types: ItemList<InstanceTypeItem>,
    #[serde(rename = "nextToken", default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstanceTypeItem {
    #[serde(rename = "instanceType")]
    instance_type: String,
    #[serde(rename = "vCpuInfo", default)]
    vcpu_info: VcpuInfo,
    #[serde(rename = "memoryInfo", default)]
    memory_info: MemoryInfo,
    #[serde(rename = "instanceStorageInfo", default)]
    storage_info: Option<StorageInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct VcpuInfo {
    #[serde(rename = "defaultVCpus", default)]
    default_vcpus: u32,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryInfo {
    #[serde(rename = "sizeInMiB", default)]
    size_in_mib: u64,
}

#[derive(Debug, Deserialize)]
struct StorageInfo {
    #[serde(rename = "totalSizeInGB", default)]
    total_size_in_gb: u32,
}

#[derive(Debug, Deserialize)]
struct ImportKeyPairResponse {
    #[serde(rename = "keyName")]
    key_name: String,
}

#[derive(Debug, Deserialize)]
struct DescribeKeyPairsResponse {
    #[serde(rename = "keySet", default)]
    keys: ItemList<KeyPairItem>,
}

#[derive(Debug, Deserialize)]
struct KeyPairItem {
    #[serde(rename = "keyName")]
    key_name: String,
    #[serde(rename = "keyFingerprint", default)]
    key_fingerprint: String,
}

#[derive(Debug, Deserialize)]
struct RunInstancesResponse {
    #[serde(rename = "instancesSet", default)]
    instances: ItemList<InstanceItem>,
}

#[derive(Debug, Deserialize)]
struct DescribeInstancesResponse {
    #[serde(rename = "reservationSet", default)]
    reservations: ItemList<ReservationItem>,
}

#[derive(Debug, Deserialize)]
struct ReservationItem {
    #[serde(rename = "instancesSet", default)]
    instances: ItemList<InstanceItem>,
}

#[derive(Debug, Deserialize)]
pub(super) struct InstanceItem {
    #[serde(rename = "instanceId")]
    pub(super) instance_id: String,
    #[serde(rename = "instanceType", default)]
    pub(super) instance_type: String,
    #[serde(rename = "instanceState", default)]
    pub(super) state: InstanceState,
    #[serde(rename = "networkInterfaceSet", default)]
    pub(super) network_interfaces: ItemList<NetworkInterfaceItem>,
    #[serde(rename = "ipAddress", default)]
    pub(super) public_ip: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct InstanceState {
    #[serde(default)]
    pub(super) code: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct NetworkInterfaceItem {
    #[serde(rename = "networkInterfaceId")]
    pub(super) network_interface_id: String,
    #[serde(rename = "privateIpAddress", default)]
    pub(super) private_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeNetworkInterfacesResponse {
    #[serde(rename = "networkInterfaceSet", default)]
    interfaces: ItemList<NetworkInterfaceItem>,
}

#[derive(Debug, Deserialize)]
struct AllocateAddressResponse {
    #[serde(rename = "allocationId")]
    allocation_id: String,
    #[serde(rename = "publicIp")]
    public_ip: String,
}

#[derive(Debug, Deserialize)]
struct DescribeAddressesResponse {
    #[serde(rename = "addressesSet", default)]
    addresses: ItemList<AddressItem>,
}

#[derive(Debug, Deserialize)]
struct AddressItem {
    #[serde(rename = "allocationId", default)]
    allocation_id: String,
    #[serde(rename = "associationId", default)]
    association_id: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Maps an EC2 instance state code onto the uniform VM state. The low byte
/// holds the state; the high byte is opaque.
pub(super) fn to_vm_state(code: u32) -> VmState {
    match code & 0xff {
        0 => VmState::Starting,
        16 => VmState::Started,
        32 | 64 => VmState::Stopping,
        48 | 80 => VmState::Stopped,
        _ => VmState::Error,
    }
}

/// Terminated instances no longer resolve through the uniform contract.
pub(super) fn is_terminated(code: u32) -> bool {
    code & 0xff == 48
}

fn filter_params(offset: usize, name: &str, values: &[String]) -> Vec<(String, String)> {
    let mut params = vec![(format!("Filter.{}.Name", offset), name.to_string())];
    for (i, value) in values.iter().enumerate() {
        params.push((format!("Filter.{}.Value.{}", offset, i + 1), value.clone()));
    }
    params
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AwsProvider {
    pub(super) async fn list_images(&self) -> StratusResult<Vec<Image>> {
        let owners = if self.auth.image_owners.is_empty() {
            DEFAULT_IMAGE_OWNERS.iter().map(|s| s.to_string()).collect()
        } else {
            self.auth.image_owners.clone()
        };

        let mut params = Vec::new();
        params.extend(filter_params(1, "state", &["available".to_string()]));
        params.extend(filter_params(2, "architecture", &["x86_64".to_string()]));
        params.extend(filter_params(3, "virtualization-type", &["hvm".to_string()]));
        params.extend(filter_params(4, "root-device-type", &["ebs".to_string()]));
        params.extend(filter_params(5, "owner-id", &owners));

        let xml = self
            .ec2_call("DescribeImages", params, "image", "list")
            .await?;
        let response: DescribeImagesResponse = decode_ec2(&xml)?;

        Ok(
            response
                .images
                .items
                .into_iter()
                .filter(|img| {
                    img.description.is_some() && !img.name.to_uppercase().contains("TEST")
                })
                .map(|img| Image {
                    id: img.image_id,
                    name: img.name,
                })
                .collect(),
        )
    }

    pub(super) async fn get_image(&self, id: &str) -> StratusResult<Image> {
        let params = vec![("ImageId.1".to_string(), id.to_string())];
        let xml = self.ec2_call("DescribeImages", params, "image", id).await?;
        let response: DescribeImagesResponse = decode_ec2(&xml)?;
        response
            .images
            .items
            .into_iter()
            .next()
            .map(|img| Image {
                id: img.image_id,
                name: img.name,
            })
            .ok_or_else(|| StratusError::not_found("image", id))
    }

    pub(super) async fn list_templates(&self) -> StratusResult<Vec<VmTemplate>> {
        let mut templates = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut params = Vec::new();
            if let Some(token) = &next_token {
                params.push(("NextToken".to_string(), token.clone()));
            }
            let xml = self
                .ec2_call("DescribeInstanceTypes", params, "template", "list")
                .await?;
            let response: DescribeInstanceTypesResponse = decode_ec2(&xml)?;
            templates.extend(response.instance_types.items.into_iter().map(to_template));

            next_token = response.next_token;
            if next_token.is_none() {
                break;
            }
        }
        Ok(templates)
    }

    pub(super) async fn get_template(&self, id: &str) -> StratusResult<VmTemplate> {
        let params = vec![("InstanceType.1".to_string(), id.to_string())];
        let xml = self
            .ec2_call("DescribeInstanceTypes", params, "template", id)
            .await?;
        let response: DescribeInstanceTypesResponse = decode_ec2(&xml)?;
        response
            .instance_types
            .items
            .into_iter()
            .next()
            .map(to_template)
            .ok_or_else(|| StratusError::not_found("template", id))
    }

    pub(super) async fn create_key_pair(&self, name: &str) -> StratusResult<KeyPair> {
        // The pair is generated locally; only the public half is imported.
        let generated = utils::generate_key_pair(name)?;
        let params = vec![
            ("KeyName".to_string(), name.to_string()),
            (
                "PublicKeyMaterial".to_string(),
                general_purpose::STANDARD.encode(generated.public_key.as_bytes()),
            ),
        ];
        let xml = self
            .ec2_call("ImportKeyPair", params, "key pair", name)
            .await?;
        let response: ImportKeyPairResponse = decode_ec2(&xml)?;

        Ok(KeyPair {
            id: response.key_name.clone(),
            name: response.key_name,
            public_key: generated.public_key,
            private_key: generated.private_key,
        })
    }

    pub(super) async fn get_key_pair(&self, id: &str) -> StratusResult<KeyPair> {
        let params = vec![("KeyName.1".to_string(), id.to_string())];
        let xml = self
            .ec2_call("DescribeKeyPairs", params, "key pair", id)
            .await?;
        let response: DescribeKeyPairsResponse = decode_ec2(&xml)?;
        response
            .keys
            .items
            .into_iter()
            .next()
            .map(|key| KeyPair {
                id: key.key_name.clone(),
                name: key.key_name,
                public_key: key.key_fingerprint,
                private_key: String::new(),
            })
            .ok_or_else(|| StratusError::not_found("key pair", id))
    }

    pub(super) async fn list_key_pairs(&self) -> StratusResult<Vec<KeyPair>> {
        let xml = self
            .ec2_call("DescribeKeyPairs", Vec::new(), "key pair", "list")
            .await?;
        let response: DescribeKeyPairsResponse = decode_ec2(&xml)?;
        Ok(
            response
                .keys
                .items
                .into_iter()
                .map(|key| KeyPair {
                    id: key.key_name.clone(),
                    name: key.key_name,
                    public_key: key.key_fingerprint,
                    private_key: String::new(),
                })
                .collect(),
        )
    }

    pub(super) async fn delete_key_pair(&self, id: &str) -> StratusResult<()> {
        let params = vec![("KeyName".to_string(), id.to_string())];
        self.ec2_call("DeleteKeyPair", params, "key pair", id)
            .await?;
        Ok(())
    }

    pub(super) async fn create_vm(&self, request: VmRequest) -> StratusResult<Vm> {
        let (key_pair, ephemeral_key) = match request.key_pair.clone() {
            Some(kp) => (kp, None),
            None => {
                let name = format!("{}_{}", request.name, Uuid::new_v4());
                let kp = self.create_key_pair(&name).await?;
                (kp, Some(name))
            }
        };

        let result = self.create_vm_with_keys(&request, &key_pair).await;

        if let Some(name) = ephemeral_key {
            if let Err(err) = self.delete_key_pair(&name).await {
                tracing::warn!("error deleting temporary key pair {}: {}", name, err);
            }
        }
        result
    }

    async fn create_vm_with_keys(
        &self,
        request: &VmRequest,
        key_pair: &KeyPair,
    ) -> StratusResult<Vm> {
        let primary_network = request
            .network_ids
            .first()
            .cloned()
            .ok_or_else(|| StratusError::InvalidArgument("vm request names no network".into()))?;

        let mut gateway: Option<Vm> = None;
        if !request.public_ip {
            let network: Network = metadata::load_json_record(
                self,
                AWS_NETWORKS_CONTAINER,
                &primary_network,
            )
            .await
            .map_err(|_| {
                StratusError::InvalidArgument(format!(
                    "network {} has no gateway",
                    primary_network
                ))
            })?;
            gateway = Some(self.get_vm(&network.gateway_id).await?);
        }

        let gateway_ip = gateway
            .as_ref()
            .and_then(|gw| {
                gw.private_ips_v4
                    .first()
                    .or_else(|| gw.private_ips_v6.first())
            })
            .cloned()
            .unwrap_or_default();
        let resolve_conf = if request.public_ip {
            String::new()
        } else {
            UserData::resolve_conf_for(&self.config.dns_list)
        };
        let user_data = UserData::builder()
            .key(key_pair.public_key.trim_end_matches('\n'))
            .is_gateway(request.is_gateway)
            .add_gateway(!request.public_ip)
            .resolve_conf(resolve_conf)
            .gateway_ip(gateway_ip)
            .conf_if(!self.config.auto_vm_network_interfaces)
            .build()
            .render_base64()?;

        // One interface per requested network, in request order.
        let mut params = vec![
            ("ImageId".to_string(), request.image_id.clone()),
            ("InstanceType".to_string(), request.template_id.clone()),
            ("KeyName".to_string(), key_pair.name.clone()),
            ("MinCount".to_string(), "1".to_string()),
            ("MaxCount".to_string(), "1".to_string()),
            ("UserData".to_string(), user_data),
            (
                "TagSpecification.1.ResourceType".to_string(),
                "instance".to_string(),
            ),
            ("TagSpecification.1.Tag.1.Key".to_string(), "Name".to_string()),
            (
                "TagSpecification.1.Tag.1.Value".to_string(),
                request.name.clone(),
            ),
        ];
        for (index, network_id) in request.network_ids.iter().enumerate() {
            let subnet_id = self
                .subnet_of_vpc(network_id)
                .await?
                .ok_or_else(|| StratusError::not_found("network", network_id.clone()))?;
            params.push((
                format!("NetworkInterface.{}.DeviceIndex", index + 1),
                index.to_string(),
            ));
            params.push((
                format!("NetworkInterface.{}.SubnetId", index + 1),
                subnet_id,
            ));
            params.push((
                format!("NetworkInterface.{}.AssociatePublicIpAddress", index + 1),
                "false".to_string(),
            ));
            params.push((
                format!("NetworkInterface.{}.DeleteOnTermination", index + 1),
                "true".to_string(),
            ));
        }

        let xml = self
            .ec2_call("RunInstances", params, "vm", &request.name)
            .await?;
        let response: RunInstancesResponse = decode_ec2(&xml)?;
        let instance = response
            .instances
            .items
            .into_iter()
            .next()
            .ok_or_else(|| StratusError::backend_str("run-instances returned no instance"))?;
        let instance_id = instance.instance_id.clone();

        let mut vm = match wait::wait_vm_state(
            self,
            &instance_id,
            VmState::Started,
            VM_CREATION_TIMEOUT,
        )
        .await
        {
            Ok(vm) => vm,
            Err(err) => {
                self.terminate_instance(&instance_id).await;
                return Err(err);
            }
        };

        vm.name = request.name.clone();
        vm.gateway_id = gateway.map(|gw| gw.id).unwrap_or_default();
        vm.private_key = key_pair.private_key.clone();

        if request.public_ip {
            if let Err(err) = self.attach_elastic_ip(&instance_id, &mut vm).await {
                self.terminate_instance(&instance_id).await;
                return Err(err);
            }
        }

        if let Err(err) =
            metadata::save_vm_record_in(self, AWS_INSTANCES_CONTAINER, &vm).await
        {
            if let Err(cleanup) = self.delete_vm(&vm.id).await {
                tracing::warn!("instance cleanup failed after record error: {}", cleanup);
            }
            return Err(err);
        }
        Ok(vm)
    }

    /// Allocates an elastic IP and associates it with the instance's primary
    /// interface, releasing the address when association fails.
    async fn attach_elastic_ip(&self, instance_id: &str, vm: &mut Vm) -> StratusResult<()> {
        let params = vec![("Domain".to_string(), "vpc".to_string())];
        let xml = self
            .ec2_call("AllocateAddress", params, "elastic ip", instance_id)
            .await?;
        let address: AllocateAddressResponse = decode_ec2(&xml)?;

        let interface = self.primary_interface(instance_id).await;
        let interface = match interface {
            Ok(interface) => interface,
            Err(err) => {
                self.release_address(&address.allocation_id).await;
                return Err(err);
            }
        };

        let params = vec![
            ("AllocationId".to_string(), address.allocation_id.clone()),
            ("NetworkInterfaceId".to_string(), interface),
        ];
        if let Err(err) = self
            .ec2_call("AssociateAddress", params, "elastic ip", instance_id)
            .await
        {
            self.release_address(&address.allocation_id).await;
            return Err(err);
        }

        match IpVersion::of(&address.public_ip) {
            Some(IpVersion::V6) => vm.access_ip_v6 = address.public_ip.clone(),
            _ => vm.access_ip_v4 = address.public_ip.clone(),
        }
        Ok(())
    }

    async fn primary_interface(&self, instance_id: &str) -> StratusResult<String> {
        let mut params = Vec::new();
        params.extend(filter_params(
            1,
            "attachment.instance-id",
            &[instance_id.to_string()],
        ));
        params.extend(filter_params(
            2,
            "attachment.device-index",
            &["0".to_string()],
        ));
        let xml = self
            .ec2_call("DescribeNetworkInterfaces", params, "vm", instance_id)
            .await?;
        let response: DescribeNetworkInterfacesResponse = decode_ec2(&xml)?;
        response
            .interfaces
            .items
            .into_iter()
            .next()
            .map(|interface| interface.network_interface_id)
            .ok_or_else(|| {
                StratusError::backend_str(format!("vm {} has no primary interface", instance_id))
            })
    }

    async fn terminate_instance(&self, id: &str) {
        let params = vec![("InstanceId.1".to_string(), id.to_string())];
        if let Err(err) = self.ec2_call("TerminateInstances", params, "vm", id).await {
            tracing::warn!("error terminating instance {} during rollback: {}", id, err);
        }
    }

    async fn release_address(&self, allocation_id: &str) {
        let params = vec![("AllocationId".to_string(), allocation_id.to_string())];
        if let Err(err) = self
            .ec2_call("ReleaseAddress", params, "elastic ip", allocation_id)
            .await
        {
            tracing::warn!("error releasing address {}: {}", allocation_id, err);
        }
    }

    /// Converts an instance description into the uniform VM record, merging
    /// in the side-channel facts.
    pub(super) async fn to_vm(&self, instance: InstanceItem) -> StratusResult<Vm> {
        let size = if instance.instance_type.is_empty() {
            VmSize::default()
        } else {
            self.get_template(&instance.instance_type).await?.size
        };

        let mut vm = Vm {
            id: instance.instance_id.clone(),
            name: String::new(),
            private_ips_v4: instance
                .network_interfaces
                .items
                .iter()
                .filter_map(|interface| interface.private_ip.clone())
                .collect(),
            private_ips_v6: Vec::new(),
            access_ip_v4: instance.public_ip.unwrap_or_default(),
            access_ip_v6: String::new(),
            size,
            state: to_vm_state(instance.state.code),
            private_key: String::new(),
            gateway_id: String::new(),
        };

        if let Ok(record) =
            metadata::load_vm_record_in(self, AWS_INSTANCES_CONTAINER, &vm.id).await
        {
            vm.name = record.name;
            vm.gateway_id = record.gateway_id;
            vm.private_key = record.private_key;
            if vm.access_ip_v4.is_empty() {
                vm.access_ip_v4 = record.access_ip_v4;
            }
            if vm.access_ip_v6.is_empty() {
                vm.access_ip_v6 = record.access_ip_v6;
            }
        }
        Ok(vm)
    }

    pub(super) async fn get_vm(&self, id: &str) -> StratusResult<Vm> {
        let params = vec![("InstanceId.1".to_string(), id.to_string())];
        let xml = self
            .ec2_call("DescribeInstances", params, "vm", id)
            .await?;
        let response: DescribeInstancesResponse = decode_ec2(&xml)?;
        let instance = response
            .reservations
            .items
            .into_iter()
            .flat_map(|reservation| reservation.instances.items)
            .next()
            .ok_or_else(|| StratusError::not_found("vm", id))?;

        if is_terminated(instance.state.code) {
            return Err(StratusError::not_found("vm", id));
        }
        self.to_vm(instance).await
    }

    pub(super) async fn list_vms(&self) -> StratusResult<Vec<Vm>> {
        let xml = self
            .ec2_call("DescribeInstances", Vec::new(), "vm", "list")
            .await?;
        let response: DescribeInstancesResponse = decode_ec2(&xml)?;

        future::try_join_all(
            response
                .reservations
                .items
                .into_iter()
                .flat_map(|reservation| reservation.instances.items)
                .filter(|instance| !is_terminated(instance.state.code))
                .map(|instance| self.to_vm(instance)),
        )
        .await
    }

    pub(super) async fn delete_vm(&self, id: &str) -> StratusResult<()> {
        // Elastic-IP cleanup must never prevent instance termination.
        match self.addresses_of(id).await {
            Ok(addresses) => {
                for address in addresses {
                    if let Some(association_id) = address.association_id {
                        let params =
                            vec![("AssociationId".to_string(), association_id.clone())];
                        if let Err(err) = self
                            .ec2_call("DisassociateAddress", params, "elastic ip", id)
                            .await
                        {
                            tracing::warn!("error disassociating address of {}: {}", id, err);
                        }
                    }
                    self.release_address(&address.allocation_id).await;
                }
            }
            Err(err) => tracing::warn!("error listing addresses of {}: {}", id, err),
        }

        if let Err(err) =
            metadata::remove_record(self, AWS_INSTANCES_CONTAINER, id).await
        {
            if !err.is_not_found() {
                tracing::warn!("error removing vm record {}: {}", id, err);
            }
        }

        let params = vec![("InstanceId.1".to_string(), id.to_string())];
        self.ec2_call("TerminateInstances", params, "vm", id).await?;
        Ok(())
    }

    async fn addresses_of(&self, instance_id: &str) -> StratusResult<Vec<AddressItem>> {
        let params = filter_params(1, "instance-id", &[instance_id.to_string()]);
        let xml = self
            .ec2_call("DescribeAddresses", params, "elastic ip", instance_id)
            .await?;
        let response: DescribeAddressesResponse = decode_ec2(&xml)?;
        Ok(response.addresses.items)
    }

    pub(super) async fn start_vm(&self, id: &str) -> StratusResult<()> {
        let params = vec![("InstanceId.1".to_string(), id.to_string())];
        self.ec2_call("StartInstances", params, "vm", id).await?;
        Ok(())
    }

    pub(super) async fn stop_vm(&self, id: &str) -> StratusResult<()> {
        let params = vec![
            ("InstanceId.1".to_string(), id.to_string()),
            ("Force".to_string(), "true".to_string()),
        ];
        self.ec2_call("StopInstances", params, "vm", id).await?;
        Ok(())
    }
}

fn to_template(item: InstanceTypeItem) -> VmTemplate {
    VmTemplate {
        id: item.instance_type.clone(),
        name: item.instance_type,
        size: VmSize {
            cores: item.vcpu_info.default_vcpus,
            ram_size: item.memory_info.size_in_mib as f32 / 1024.0,
            disk_size: item
                .storage_info
                .map(|info| info.total_size_in_gb)
                .unwrap_or_default(),
        },
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_state_codes() {
        assert_eq!(to_vm_state(0), VmState::Starting);
        assert_eq!(to_vm_state(16), VmState::Started);
        assert_eq!(to_vm_state(32), VmState::Stopping);
        assert_eq!(to_vm_state(64), VmState::Stopping);
        assert_eq!(to_vm_state(80), VmState::Stopped);
        // The high byte is opaque and must be masked off.
        assert_eq!(to_vm_state(0x0110), VmState::Started);
        assert!(is_terminated(48));
        assert!(!is_terminated(16));
    }

    #[test]
    fn test_describe_instances_decoding() -> anyhow::Result<()> {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeInstancesResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <requestId>req-1</requestId>
  <reservationSet>
    <item>
      <instancesSet>
        <item>
          <instanceId>i-012345</instanceId>
          <instanceType>t3.micro</instanceType>
          <instanceState><code>16</code><name>running</name></instanceState>
          <ipAddress>203.0.113.20</ipAddress>
          <networkInterfaceSet>
            <item>
              <networkInterfaceId>eni-1</networkInterfaceId>
              <privateIpAddress>10.0.0.5</privateIpAddress>
            </item>
          </networkInterfaceSet>
        </item>
      </instancesSet>
    </item>
  </reservationSet>
</DescribeInstancesResponse>"#;

        let response: DescribeInstancesResponse = decode_ec2(xml)?;
        let instance = &response.reservations.items[0].instances.items[0];
        assert_eq!(instance.instance_id, "i-012345");
        assert_eq!(instance.state.code, 16);
        assert_eq!(
            instance.network_interfaces.items[0].private_ip.as_deref(),
            Some("10.0.0.5")
        );
        assert_eq!(instance.public_ip.as_deref(), Some("203.0.113.20"));
        Ok(())
    }

    #[test]
    fn test_instance_type_decoding_is_unit_explicit() -> anyhow::Result<()> {
        let xml = r#"<DescribeInstanceTypesResponse>
  <instanceTypeSet>
    <item>
      <instanceType>m5d.large</instanceType>
      <vCpuInfo><defaultVCpus>2</defaultVCpus></vCpuInfo>
      <memoryInfo><sizeInMiB>8192</sizeInMiB></memoryInfo>
      <instanceStorageInfo><totalSizeInGB>75</totalSizeInGB></instanceStorageInfo>
    </item>
  </instanceTypeSet>
</DescribeInstanceTypesResponse>"#;

        let response: DescribeInstanceTypesResponse = decode_ec2(xml)?;
        let template = to_template(response.instance_types.items.into_iter().next().unwrap());
        assert_eq!(template.size.cores, 2);
        assert_eq!(template.size.ram_size, 8.0);
        assert_eq!(template.size.disk_size, 75);
        Ok(())
    }

    #[test]
    fn test_filter_params_layout() {
        let params = filter_params(2, "owner-id", &["a".to_string(), "b".to_string()]);
        assert_eq!(
            params,
            vec![
                ("Filter.2.Name".to_string(), "owner-id".to_string()),
                ("Filter.2.Value.1".to_string(), "a".to_string()),
                ("Filter.2.Value.2".to_string(), "b".to_string()),
            ]
        );
    }
}
