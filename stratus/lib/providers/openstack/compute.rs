//! Compute operations of the OpenStack-family backend: images, flavors,
//! key pairs, servers and floating IPs.

use std::collections::HashMap;

use futures::future;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{Image, IpVersion, KeyPair, Vm, VmRequest, VmSize, VmState, VmTemplate},
    config::VM_CREATION_TIMEOUT,
    metadata,
    service::wait,
    userdata::UserData,
    utils, StratusError, StratusResult,
};

use super::OpenStackProvider;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    images: Vec<ImageDto>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    image: ImageDto,
}

#[derive(Debug, Deserialize)]
struct ImageDto {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct FlavorsResponse {
    flavors: Vec<FlavorDto>,
}

#[derive(Debug, Deserialize)]
struct FlavorResponse {
    flavor: FlavorDto,
}

#[derive(Debug, Deserialize)]
struct FlavorDto {
    id: String,
    name: String,
    vcpus: u32,
    /// RAM in MB.
    ram: u32,
    disk: u32,
}

#[derive(Debug, Deserialize)]
struct KeypairsResponse {
    keypairs: Vec<KeypairWrapper>,
}

#[derive(Debug, Deserialize)]
struct KeypairWrapper {
    keypair: KeypairDto,
}

#[derive(Debug, Deserialize)]
struct KeypairResponse {
    keypair: KeypairDto,
}

#[derive(Debug, Deserialize)]
struct KeypairDto {
    name: String,
    public_key: String,
}

#[derive(Debug, Deserialize)]
struct ServersResponse {
    servers: Vec<ServerDto>,
}

#[derive(Debug, Deserialize)]
struct ServerResponse {
    server: ServerDto,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerDto {
    pub(super) id: String,
    #[serde(default)]
    pub(super) name: String,
    #[serde(default)]
    pub(super) status: String,
    #[serde(default)]
    pub(super) addresses: HashMap<String, Vec<ServerAddress>>,
    #[serde(default, rename = "accessIPv4")]
    pub(super) access_ipv4: String,
    #[serde(default, rename = "accessIPv6")]
    pub(super) access_ipv6: String,
    #[serde(default)]
    pub(super) flavor: FlavorRef,
}

/// One address entry of the server's per-network address map, decoded as a
/// typed record rather than a dynamic value.
#[derive(Debug, Deserialize)]
pub(super) struct ServerAddress {
    pub(super) version: u8,
    pub(super) addr: String,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct FlavorRef {
    #[serde(default)]
    pub(super) id: String,
}

#[derive(Debug, Deserialize)]
struct FloatingIpsResponse {
    floating_ips: Vec<FloatingIpDto>,
}

#[derive(Debug, Deserialize)]
struct FloatingIpResponse {
    floating_ip: FloatingIpDto,
}

#[derive(Debug, Deserialize)]
struct FloatingIpDto {
    id: String,
    ip: String,
    #[serde(default)]
    instance_id: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Maps a Nova server status onto the uniform VM state.
pub(super) fn to_vm_state(status: &str) -> VmState {
    match status.to_uppercase().as_str() {
        "BUILD" | "BUILDING" => VmState::Starting,
        "ACTIVE" => VmState::Started,
        "RESCUED" => VmState::Stopping,
        "STOPPED" | "SHUTOFF" => VmState::Stopped,
        _ => VmState::Error,
    }
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OpenStackProvider {
    pub(super) async fn list_images(&self) -> StratusResult<Vec<Image>> {
        let response: ImagesResponse = self
            .get_json(
                format!("{}/v2/images", self.endpoints.image),
                "image",
                "list",
            )
            .await?;
        Ok(
            response
                .images
                .into_iter()
                .map(|img| Image {
                    id: img.id,
                    name: img.name,
                })
                .collect(),
        )
    }

    pub(super) async fn get_image(&self, id: &str) -> StratusResult<Image> {
        let response: ImageResponse = self
            .get_json(
                format!("{}/v2/images/{}", self.endpoints.image, id),
                "image",
                id,
            )
            .await?;
        Ok(Image {
            id: response.image.id,
            name: response.image.name,
        })
    }

    pub(super) async fn list_templates(&self) -> StratusResult<Vec<VmTemplate>> {
        let response: FlavorsResponse = self
            .get_json(
                format!("{}/flavors/detail", self.endpoints.compute),
                "template",
                "list",
            )
            .await?;
        Ok(response.flavors.into_iter().map(to_template).collect())
    }

    pub(super) async fn get_template(&self, id: &str) -> StratusResult<VmTemplate> {
        let response: FlavorResponse = self
            .get_json(
                format!("{}/flavors/{}", self.endpoints.compute, id),
                "template",
                id,
            )
            .await?;
        Ok(to_template(response.flavor))
    }

    pub(super) async fn create_key_pair(&self, name: &str) -> StratusResult<KeyPair> {
        // The pair is generated locally; only the public half is registered.
        let generated = utils::generate_key_pair(name)?;

        let body = serde_json::json!({
            "keypair": {
                "name": name,
                "public_key": generated.public_key,
            }
        });
        let registered: KeypairResponse = self
            .post_json(
                format!("{}/os-keypairs", self.endpoints.compute),
                &body,
                "key pair",
                name,
            )
            .await?;

        Ok(KeyPair {
            id: registered.keypair.name.clone(),
            name: registered.keypair.name,
            public_key: registered.keypair.public_key,
            private_key: generated.private_key,
        })
    }

    pub(super) async fn get_key_pair(&self, id: &str) -> StratusResult<KeyPair> {
        let response: KeypairResponse = self
            .get_json(
                format!("{}/os-keypairs/{}", self.endpoints.compute, id),
                "key pair",
                id,
            )
            .await?;
        Ok(KeyPair {
            id: response.keypair.name.clone(),
            name: response.keypair.name,
            public_key: response.keypair.public_key,
            private_key: String::new(),
        })
    }

    pub(super) async fn list_key_pairs(&self) -> StratusResult<Vec<KeyPair>> {
        let response: KeypairsResponse = self
            .get_json(
                format!("{}/os-keypairs", self.endpoints.compute),
                "key pair",
                "list",
            )
            .await?;
        Ok(
            response
                .keypairs
                .into_iter()
                .map(|wrapper| KeyPair {
                    id: wrapper.keypair.name.clone(),
                    name: wrapper.keypair.name,
                    public_key: wrapper.keypair.public_key,
                    private_key: String::new(),
                })
                .collect(),
        )
    }

    pub(super) async fn delete_key_pair(&self, id: &str) -> StratusResult<()> {
        self.delete(
            format!("{}/os-keypairs/{}", self.endpoints.compute, id),
            "key pair",
            id,
        )
        .await
    }

    /// Splits the server's per-network address map into family-correct
    /// ordered sequences, leaving out addresses on the provider network.
    pub(super) fn convert_addresses(
        &self,
        addresses: &HashMap<String, Vec<ServerAddress>>,
    ) -> (Vec<String>, Vec<String>) {
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();
        for (network, entries) in addresses {
            if *network == self.config.provider_network {
                continue;
            }
            for entry in entries {
                match entry.version {
                    4 => v4.push(entry.addr.clone()),
                    6 => v6.push(entry.addr.clone()),
                    _ => {}
                }
            }
        }
        (v4, v6)
    }

    /// Converts a Nova server into the uniform VM record, merging in the
    /// side-channel facts the native API cannot hold.
    pub(super) async fn to_vm(&self, server: ServerDto) -> StratusResult<Vm> {
        let (private_ips_v4, private_ips_v6) = self.convert_addresses(&server.addresses);
        let size = if server.flavor.id.is_empty() {
            VmSize::default()
        } else {
            self.get_template(&server.flavor.id).await?.size
        };

        let mut vm = Vm {
            id: server.id,
            name: server.name,
            private_ips_v4,
            private_ips_v6,
            access_ip_v4: server.access_ipv4,
            access_ip_v6: server.access_ipv6,
            size,
            state: to_vm_state(&server.status),
            private_key: String::new(),
            gateway_id: String::new(),
        };

        if let Ok(record) = metadata::load_vm_record(self, &vm.id).await {
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

    pub(super) async fn create_vm(&self, request: VmRequest) -> StratusResult<Vm> {
        let primary_network = request
            .network_ids
            .first()
            .cloned()
            .ok_or_else(|| StratusError::InvalidArgument("vm request names no network".into()))?;

        // Without floating IPs a public VM fronts the provider network with
        // its first interface.
        let mut networks = Vec::new();
        if !self.config.use_floating_ip && request.public_ip {
            networks.push(serde_json::json!({ "uuid": self.provider_network_id }));
        }
        for network_id in &request.network_ids {
            networks.push(serde_json::json!({ "uuid": network_id }));
        }

        let (key_pair, ephemeral_key) = match request.key_pair.clone() {
            Some(kp) => (kp, None),
            None => {
                let name = format!("{}_{}", request.name, Uuid::new_v4());
                let kp = self.create_key_pair(&name).await?;
                (kp, Some(name))
            }
        };

        let result = self
            .create_vm_with_keys(&request, &primary_network, &key_pair, networks)
            .await;

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
        primary_network: &str,
        key_pair: &KeyPair,
        networks: Vec<serde_json::Value>,
    ) -> StratusResult<Vm> {
        let mut gateway: Option<Vm> = None;
        if !request.public_ip {
            let gateway_id = metadata::load_network_gateway(self, primary_network)
                .await
                .map_err(|_| {
                    StratusError::InvalidArgument(format!(
                        "network {} has no gateway",
                        primary_network
                    ))
                })?;
            gateway = Some(self.get_vm(&gateway_id).await?);
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

        // Behind a layer-3 router the subnet already routes and NATs, so the
        // rendered script skips gateway duties.
        let user_data = UserData::builder()
            .key(key_pair.public_key.trim_end_matches('\n'))
            .is_gateway(request.is_gateway && !self.config.use_layer3_networking)
            .add_gateway(!request.public_ip && !self.config.use_layer3_networking)
            .resolve_conf(resolve_conf)
            .gateway_ip(gateway_ip)
            .conf_if(!self.config.auto_vm_network_interfaces)
            .build()
            .render_base64()?;

        let body = serde_json::json!({
            "server": {
                "name": request.name,
                "imageRef": request.image_id,
                "flavorRef": request.template_id,
                "key_name": key_pair.id,
                "security_groups": [{ "name": super::DEFAULT_SECURITY_GROUP }],
                "networks": networks,
                "user_data": user_data,
            }
        });
        let created: ServerResponse = self
            .post_json(
                format!("{}/servers", self.endpoints.compute),
                &body,
                "vm",
                &request.name,
            )
            .await?;
        let server_id = created.server.id;

        let mut vm =
            match wait::wait_vm_state(self, &server_id, VmState::Started, VM_CREATION_TIMEOUT)
                .await
            {
                Ok(vm) => vm,
                Err(err) => {
                    self.terminate_instance(&server_id).await;
                    return Err(err);
                }
            };

        vm.gateway_id = gateway.map(|gw| gw.id).unwrap_or_default();
        vm.private_key = key_pair.private_key.clone();

        if self.config.use_floating_ip && request.public_ip {
            let floating_ip = match self.allocate_floating_ip().await {
                Ok(ip) => ip,
                Err(err) => {
                    self.terminate_instance(&vm.id).await;
                    return Err(err);
                }
            };
            if let Err(err) = self.associate_floating_ip(&vm.id, &floating_ip.1).await {
                self.release_floating_ip(&floating_ip.0).await;
                self.terminate_instance(&vm.id).await;
                return Err(err);
            }
            match IpVersion::of(&floating_ip.1) {
                Some(IpVersion::V6) => vm.access_ip_v6 = floating_ip.1,
                _ => vm.access_ip_v4 = floating_ip.1,
            }
        }

        if let Err(err) = metadata::save_vm_record(self, &vm).await {
            if let Err(cleanup) = self.delete_vm(&vm.id).await {
                tracing::warn!("instance cleanup failed after record error: {}", cleanup);
            }
            return Err(err);
        }
        Ok(vm)
    }

    /// Best-effort instance teardown used by rollback paths.
    async fn terminate_instance(&self, id: &str) {
        if let Err(err) = self
            .delete(
                format!("{}/servers/{}", self.endpoints.compute, id),
                "vm",
                id,
            )
            .await
        {
            tracing::warn!("error terminating instance {} during rollback: {}", id, err);
        }
    }

    pub(super) async fn get_vm(&self, id: &str) -> StratusResult<Vm> {
        let response: ServerResponse = self
            .get_json(
                format!("{}/servers/{}", self.endpoints.compute, id),
                "vm",
                id,
            )
            .await?;
        self.to_vm(response.server).await
    }

    pub(super) async fn list_vms(&self) -> StratusResult<Vec<Vm>> {
        let response: ServersResponse = self
            .get_json(
                format!("{}/servers/detail", self.endpoints.compute),
                "vm",
                "list",
            )
            .await?;
        future::try_join_all(
            response
                .servers
                .into_iter()
                .map(|server| self.to_vm(server)),
        )
        .await
    }

    pub(super) async fn delete_vm(&self, id: &str) -> StratusResult<()> {
        // Floating-IP cleanup must never prevent instance termination.
        if self.config.use_floating_ip {
            match self.floating_ip_of(id).await {
                Ok(Some(floating_ip)) => {
                    if let Err(err) = self
                        .post_action(
                            format!("{}/servers/{}/action", self.endpoints.compute, id),
                            &serde_json::json!({
                                "removeFloatingIp": { "address": floating_ip.ip }
                            }),
                            "floating ip",
                            &floating_ip.ip,
                        )
                        .await
                    {
                        tracing::warn!("error disassociating floating ip of {}: {}", id, err);
                    }
                    self.release_floating_ip(&floating_ip.id).await;
                }
                Ok(None) => {}
                Err(err) => tracing::warn!("error listing floating ips of {}: {}", id, err),
            }
        }

        if let Err(err) = metadata::remove_vm_record(self, id).await {
            if !err.is_not_found() {
                tracing::warn!("error removing vm record {}: {}", id, err);
            }
        }

        self.delete(
            format!("{}/servers/{}", self.endpoints.compute, id),
            "vm",
            id,
        )
        .await
    }

    pub(super) async fn start_vm(&self, id: &str) -> StratusResult<()> {
        self.post_action(
            format!("{}/servers/{}/action", self.endpoints.compute, id),
            &serde_json::json!({ "os-start": null }),
            "vm",
            id,
        )
        .await
    }

    pub(super) async fn stop_vm(&self, id: &str) -> StratusResult<()> {
        self.post_action(
            format!("{}/servers/{}/action", self.endpoints.compute, id),
            &serde_json::json!({ "os-stop": null }),
            "vm",
            id,
        )
        .await
    }

    async fn allocate_floating_ip(&self) -> StratusResult<(String, String)> {
        let response: FloatingIpResponse = self
            .post_json(
                format!("{}/os-floating-ips", self.endpoints.compute),
                &serde_json::json!({ "pool": self.auth.floating_ip_pool }),
                "floating ip",
                &self.auth.floating_ip_pool,
            )
            .await?;
        Ok((response.floating_ip.id, response.floating_ip.ip))
    }

    async fn associate_floating_ip(&self, server_id: &str, address: &str) -> StratusResult<()> {
        self.post_action(
            format!("{}/servers/{}/action", self.endpoints.compute, server_id),
            &serde_json::json!({ "addFloatingIp": { "address": address } }),
            "floating ip",
            address,
        )
        .await
    }

    async fn release_floating_ip(&self, id: &str) {
        if let Err(err) = self
            .delete(
                format!("{}/os-floating-ips/{}", self.endpoints.compute, id),
                "floating ip",
                id,
            )
            .await
        {
            tracing::warn!("error releasing floating ip {}: {}", id, err);
        }
    }

    /// The floating IP associated with a VM. By convention at most one
    /// floating IP is allocated per VM.
    async fn floating_ip_of(&self, server_id: &str) -> StratusResult<Option<FloatingIpDto>> {
        let response: FloatingIpsResponse = self
            .get_json(
                format!("{}/os-floating-ips", self.endpoints.compute),
                "floating ip",
                server_id,
            )
            .await?;
        let mut owned: Vec<FloatingIpDto> = response
            .floating_ips
            .into_iter()
            .filter(|ip| ip.instance_id.as_deref() == Some(server_id))
            .collect();
        if owned.len() > 1 {
            return Err(StratusError::backend_str(format!(
                "more than one floating ip associated to vm {}",
                server_id
            )));
        }
        Ok(owned.pop())
    }
}

fn to_template(flavor: FlavorDto) -> VmTemplate {
    VmTemplate {
        id: flavor.id,
        name: flavor.name,
        size: VmSize {
            cores: flavor.vcpus,
            ram_size: flavor.ram as f32 / 1000.0,
            disk_size: flavor.disk,
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
    fn test_to_vm_state_mapping() {
        assert_eq!(to_vm_state("BUILD"), VmState::Starting);
        assert_eq!(to_vm_state("building"), VmState::Starting);
        assert_eq!(to_vm_state("ACTIVE"), VmState::Started);
        assert_eq!(to_vm_state("active"), VmState::Started);
        assert_eq!(to_vm_state("SHUTOFF"), VmState::Stopped);
        assert_eq!(to_vm_state("stopped"), VmState::Stopped);
        assert_eq!(to_vm_state("RESCUED"), VmState::Stopping);
        assert_eq!(to_vm_state("PAUSED"), VmState::Error);
    }

    #[test]
    fn test_address_map_decodes_family_correct() -> anyhow::Result<()> {
        // The nested dynamic structure Nova returns, decoded typed.
        let payload = serde_json::json!({
            "lab": [
                { "version": 4, "addr": "192.168.1.7" },
                { "version": 6, "addr": "2001:db8::7" },
            ],
            "public": [
                { "version": 4, "addr": "203.0.113.9" },
            ],
        });
        let addresses: HashMap<String, Vec<ServerAddress>> =
            serde_json::from_value(payload)?;

        assert_eq!(addresses["lab"].len(), 2);
        let v6: Vec<&ServerAddress> = addresses["lab"]
            .iter()
            .filter(|entry| entry.version == 6)
            .collect();
        assert_eq!(v6.len(), 1);
        assert_eq!(v6[0].addr, "2001:db8::7");
        Ok(())
    }

    #[test]
    fn test_flavor_to_template() {
        let template = to_template(FlavorDto {
            id: "f1".into(),
            name: "m1.small".into(),
            vcpus: 2,
            ram: 4000,
            disk: 20,
        });
        assert_eq!(template.size.cores, 2);
        assert_eq!(template.size.ram_size, 4.0);
        assert_eq!(template.size.disk_size, 20);
    }
}
