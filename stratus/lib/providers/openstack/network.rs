//! Network operations of the OpenStack-family backend: networks, subnets,
//! routers and the gatewayed-network flow.

use serde::{Deserialize, Serialize};

use crate::{
    api::{IpVersion, Network, NetworkRequest},
    config::VM_CREATION_TIMEOUT,
    metadata,
    service::wait,
    StratusError, StratusResult,
};

use super::OpenStackProvider;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A sub network of a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    /// The provider-assigned id of the subnet.
    pub id: String,

    /// The name of the subnet.
    pub name: String,

    /// The IP version of the subnet.
    pub ip_version: IpVersion,

    /// The mask of the subnet in CIDR notation.
    pub mask: String,

    /// The id of the parent network.
    pub network_id: String,
}

/// Requirements for creating a router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterRequest {
    /// The name of the router.
    pub name: String,

    /// The id of the network the router's external gateway connects to.
    pub network_id: String,
}

/// A layer-3 router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Router {
    /// The provider-assigned id of the router.
    pub id: String,

    /// The name of the router.
    pub name: String,

    /// The id of the network the router's external gateway connects to.
    pub network_id: String,
}

#[derive(Debug, Deserialize)]
struct NetworksResponse {
    networks: Vec<NetworkDto>,
}

#[derive(Debug, Deserialize)]
struct NetworkResponse {
    network: NetworkDto,
}

#[derive(Debug, Deserialize)]
struct NetworkDto {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SubnetsResponse {
    subnets: Vec<SubnetDto>,
}

#[derive(Debug, Deserialize)]
struct SubnetResponse {
    subnet: SubnetDto,
}

#[derive(Debug, Deserialize)]
struct SubnetDto {
    id: String,
    name: String,
    ip_version: u8,
    cidr: String,
    network_id: String,
}

#[derive(Debug, Deserialize)]
struct RoutersResponse {
    routers: Vec<RouterDto>,
}

#[derive(Debug, Deserialize)]
struct RouterResponse {
    router: RouterDto,
}

#[derive(Debug, Deserialize)]
struct RouterDto {
    id: String,
    name: String,
    #[serde(default)]
    external_gateway_info: Option<GatewayInfoDto>,
}

#[derive(Debug, Deserialize)]
struct GatewayInfoDto {
    #[serde(default)]
    network_id: String,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn to_ip_version(version: u8) -> IpVersion {
    if version == 6 {
        IpVersion::V6
    } else {
        IpVersion::V4
    }
}

fn from_ip_version(version: IpVersion) -> u8 {
    match version {
        IpVersion::V4 => 4,
        IpVersion::V6 => 6,
    }
}

fn to_subnet(dto: SubnetDto) -> Subnet {
    Subnet {
        id: dto.id,
        name: dto.name,
        ip_version: to_ip_version(dto.ip_version),
        mask: dto.cidr,
        network_id: dto.network_id,
    }
}

fn to_router(dto: RouterDto) -> Router {
    Router {
        id: dto.id,
        name: dto.name,
        network_id: dto
            .external_gateway_info
            .map(|info| info.network_id)
            .unwrap_or_default(),
    }
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OpenStackProvider {
    /// Creates a gatewayed network with the layer-3 strategy: network,
    /// subnet, router on the provider network, then the gateway VM, with
    /// reverse-order compensation on any failure.
    pub(super) async fn create_network(&self, request: NetworkRequest) -> StratusResult<Network> {
        let body = serde_json::json!({
            "network": { "name": request.name, "admin_state_up": true }
        });
        let created: NetworkResponse = self
            .post_json(
                format!("{}/v2.0/networks", self.endpoints.network),
                &body,
                "network",
                &request.name,
            )
            .await?;
        let network_id = created.network.id;

        let subnet = match self
            .create_subnet(&request.name, &network_id, &request.cidr, request.ip_version)
            .await
        {
            Ok(subnet) => subnet,
            Err(err) => {
                self.rollback_network(&network_id, None, None).await;
                return Err(wrap_network_error(&request.name, err));
            }
        };

        let mut gateway_request = request.gateway.clone();
        gateway_request.public_ip = true;
        gateway_request.is_gateway = true;
        gateway_request.network_ids = vec![network_id.clone()];

        let gateway = match self.create_vm(gateway_request).await {
            Ok(vm) => vm,
            Err(err) => {
                self.rollback_network(&network_id, Some(&subnet.id), None).await;
                return Err(wrap_network_error(&request.name, err));
            }
        };

        if let Err(err) = metadata::save_network_gateway(self, &network_id, &gateway.id).await {
            self.rollback_network(&network_id, Some(&subnet.id), Some(&gateway.id))
                .await;
            return Err(wrap_network_error(&request.name, err));
        }

        Ok(Network {
            id: network_id,
            name: request.name,
            cidr: subnet.mask,
            ip_version: subnet.ip_version,
            gateway_id: gateway.id,
        })
    }

    /// Reverse-order compensation for a partially-created network. Cleanup
    /// failures are logged and never mask the originating error.
    async fn rollback_network(
        &self,
        network_id: &str,
        subnet_id: Option<&str>,
        gateway_id: Option<&str>,
    ) {
        if let Some(gateway_id) = gateway_id {
            if let Err(err) = self.delete_vm(gateway_id).await {
                tracing::warn!("rollback: error deleting gateway {}: {}", gateway_id, err);
            }
        }
        if let Some(subnet_id) = subnet_id {
            if let Err(err) = self.delete_subnet(subnet_id).await {
                tracing::warn!("rollback: error deleting subnet {}: {}", subnet_id, err);
            }
        }
        if let Err(err) = self
            .delete(
                format!("{}/v2.0/networks/{}", self.endpoints.network, network_id),
                "network",
                network_id,
            )
            .await
        {
            tracing::warn!("rollback: error deleting network {}: {}", network_id, err);
        }
    }

    pub(super) async fn get_network(&self, id: &str) -> StratusResult<Network> {
        let response: NetworkResponse = self
            .get_json(
                format!("{}/v2.0/networks/{}", self.endpoints.network, id),
                "network",
                id,
            )
            .await?;

        let mut subnets = self.list_subnets(id).await?;
        let subnet = match (subnets.len(), subnets.pop()) {
            (1, Some(subnet)) => subnet,
            _ => {
                return Err(StratusError::backend_str(
                    "bad configuration, each network should have exactly one subnet",
                ))
            }
        };

        let gateway_id = metadata::load_network_gateway(self, id).await.map_err(|_| {
            StratusError::backend_str(format!("network {} has no gateway record", id))
        })?;

        Ok(Network {
            id: response.network.id,
            name: response.network.name,
            cidr: subnet.mask,
            ip_version: subnet.ip_version,
            gateway_id,
        })
    }

    pub(super) async fn list_networks(&self) -> StratusResult<Vec<Network>> {
        let response: NetworksResponse = self
            .get_json(
                format!("{}/v2.0/networks", self.endpoints.network),
                "network",
                "list",
            )
            .await?;

        let mut networks = Vec::new();
        for dto in response.networks {
            if dto.id == self.provider_network_id {
                continue;
            }
            let mut subnets = self.list_subnets(&dto.id).await?;
            let subnet = match (subnets.len(), subnets.pop()) {
                (1, Some(subnet)) => subnet,
                _ => continue,
            };

            // Networks whose gateway record is missing (mid-create or
            // mid-delete) are skipped rather than failing the listing.
            match metadata::load_network_gateway(self, &dto.id).await {
                Ok(gateway_id) => networks.push(Network {
                    id: dto.id,
                    name: dto.name,
                    cidr: subnet.mask,
                    ip_version: subnet.ip_version,
                    gateway_id,
                }),
                Err(_) => continue,
            }
        }
        Ok(networks)
    }

    pub(super) async fn delete_network(&self, id: &str) -> StratusResult<()> {
        let gateway_id = metadata::load_network_gateway(self, id)
            .await
            .map_err(|err| StratusError::backend_msg("error deleting network", err))?;

        self.delete_vm(&gateway_id).await?;
        wait::wait_vm_gone(self, &gateway_id, VM_CREATION_TIMEOUT).await?;
        metadata::remove_network_gateway(self, id).await?;

        for subnet in self.list_subnets(id).await? {
            self.delete_subnet(&subnet.id).await?;
        }
        self.delete(
            format!("{}/v2.0/networks/{}", self.endpoints.network, id),
            "network",
            id,
        )
        .await
    }

    /// Creates a subnet inside a network: DHCP enabled, no built-in gateway
    /// when layer-3 networking is off. With layer-3 on, a router named after
    /// the subnet id is created on the provider network and the subnet is
    /// attached to it.
    pub async fn create_subnet(
        &self,
        name: &str,
        network_id: &str,
        cidr: &str,
        ip_version: IpVersion,
    ) -> StratusResult<Subnet> {
        let mut subnet_body = serde_json::json!({
            "subnet": {
                "network_id": network_id,
                "cidr": cidr,
                "ip_version": from_ip_version(ip_version),
                "name": name,
                "enable_dhcp": true,
            }
        });
        if !self.config.use_layer3_networking {
            subnet_body["subnet"]["gateway_ip"] = serde_json::Value::Null;
        }

        let created: SubnetResponse = self
            .post_json(
                format!("{}/v2.0/subnets", self.endpoints.network),
                &subnet_body,
                "subnet",
                name,
            )
            .await?;
        let subnet = to_subnet(created.subnet);

        if self.config.use_layer3_networking {
            let router = match self
                .create_router(RouterRequest {
                    name: subnet.id.clone(),
                    network_id: self.provider_network_id.clone(),
                })
                .await
            {
                Ok(router) => router,
                Err(err) => {
                    if let Err(cleanup) = self.delete_subnet(&subnet.id).await {
                        tracing::warn!("rollback: error deleting subnet: {}", cleanup);
                    }
                    return Err(err);
                }
            };
            if let Err(err) = self.add_subnet_to_router(&router.id, &subnet.id).await {
                if let Err(cleanup) = self.delete_router(&router.id).await {
                    tracing::warn!("rollback: error deleting router: {}", cleanup);
                }
                if let Err(cleanup) = self.delete_subnet(&subnet.id).await {
                    tracing::warn!("rollback: error deleting subnet: {}", cleanup);
                }
                return Err(err);
            }
        }
        Ok(subnet)
    }

    /// Returns the subnet identified by id.
    pub async fn get_subnet(&self, id: &str) -> StratusResult<Subnet> {
        let response: SubnetResponse = self
            .get_json(
                format!("{}/v2.0/subnets/{}", self.endpoints.network, id),
                "subnet",
                id,
            )
            .await?;
        Ok(to_subnet(response.subnet))
    }

    /// Lists the subnets of a network.
    pub async fn list_subnets(&self, network_id: &str) -> StratusResult<Vec<Subnet>> {
        let response: SubnetsResponse = self
            .get_json(
                format!(
                    "{}/v2.0/subnets?network_id={}",
                    self.endpoints.network, network_id
                ),
                "subnet",
                network_id,
            )
            .await?;
        Ok(response.subnets.into_iter().map(to_subnet).collect())
    }

    /// Deletes a subnet, detaching it from its router (and deleting the
    /// router) when one was wired by `create_subnet`.
    pub async fn delete_subnet(&self, id: &str) -> StratusResult<()> {
        let router = self
            .list_routers()
            .await?
            .into_iter()
            .find(|router| router.name == id);
        if let Some(router) = router {
            self.remove_subnet_from_router(&router.id, id).await?;
            self.delete_router(&router.id).await?;
        }

        self.delete(
            format!("{}/v2.0/subnets/{}", self.endpoints.network, id),
            "subnet",
            id,
        )
        .await
    }

    /// Creates a router whose external side is the given network.
    pub async fn create_router(&self, request: RouterRequest) -> StratusResult<Router> {
        let body = serde_json::json!({
            "router": {
                "name": request.name,
                "admin_state_up": true,
                "external_gateway_info": { "network_id": request.network_id },
            }
        });
        let response: RouterResponse = self
            .post_json(
                format!("{}/v2.0/routers", self.endpoints.network),
                &body,
                "router",
                &request.name,
            )
            .await?;
        Ok(to_router(response.router))
    }

    /// Returns the router identified by id.
    pub async fn get_router(&self, id: &str) -> StratusResult<Router> {
        let response: RouterResponse = self
            .get_json(
                format!("{}/v2.0/routers/{}", self.endpoints.network, id),
                "router",
                id,
            )
            .await?;
        Ok(to_router(response.router))
    }

    /// Lists available routers.
    pub async fn list_routers(&self) -> StratusResult<Vec<Router>> {
        let response: RoutersResponse = self
            .get_json(
                format!("{}/v2.0/routers", self.endpoints.network),
                "router",
                "list",
            )
            .await?;
        Ok(response.routers.into_iter().map(to_router).collect())
    }

    /// Deletes the router identified by id.
    pub async fn delete_router(&self, id: &str) -> StratusResult<()> {
        self.delete(
            format!("{}/v2.0/routers/{}", self.endpoints.network, id),
            "router",
            id,
        )
        .await
    }

    /// Attaches a subnet to a router.
    pub async fn add_subnet_to_router(&self, router_id: &str, subnet_id: &str) -> StratusResult<()> {
        let _: serde_json::Value = self
            .put_json(
                format!(
                    "{}/v2.0/routers/{}/add_router_interface",
                    self.endpoints.network, router_id
                ),
                &serde_json::json!({ "subnet_id": subnet_id }),
                "router interface",
                subnet_id,
            )
            .await?;
        Ok(())
    }

    /// Detaches a subnet from a router.
    pub async fn remove_subnet_from_router(
        &self,
        router_id: &str,
        subnet_id: &str,
    ) -> StratusResult<()> {
        let _: serde_json::Value = self
            .put_json(
                format!(
                    "{}/v2.0/routers/{}/remove_router_interface",
                    self.endpoints.network, router_id
                ),
                &serde_json::json!({ "subnet_id": subnet_id }),
                "router interface",
                subnet_id,
            )
            .await?;
        Ok(())
    }
}

fn wrap_network_error(name: &str, err: StratusError) -> StratusError {
    StratusError::backend_msg(format!("error creating network {}", name), err)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet_decoding() -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "subnet": {
                "id": "sn-1",
                "name": "lab",
                "ip_version": 4,
                "cidr": "192.168.1.0/24",
                "network_id": "net-1",
            }
        });
        let response: SubnetResponse = serde_json::from_value(payload)?;
        let subnet = to_subnet(response.subnet);
        assert_eq!(subnet.ip_version, IpVersion::V4);
        assert_eq!(subnet.mask, "192.168.1.0/24");
        Ok(())
    }

    #[test]
    fn test_router_decoding_without_gateway_info() -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "router": { "id": "r-1", "name": "sn-1" }
        });
        let response: RouterResponse = serde_json::from_value(payload)?;
        let router = to_router(response.router);
        assert!(router.network_id.is_empty());
        Ok(())
    }

    #[test]
    fn test_ip_version_mapping() {
        assert_eq!(to_ip_version(4), IpVersion::V4);
        assert_eq!(to_ip_version(6), IpVersion::V6);
        assert_eq!(from_ip_version(IpVersion::V6), 6);
    }
}
