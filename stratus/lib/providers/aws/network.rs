//! Network operations of the AWS-family backend: VPCs, subnets, internet
//! gateways and the route-table gatewayed-network flow.

use serde::Deserialize;

use crate::{
    api::{Network, NetworkRequest},
    config::VM_CREATION_TIMEOUT,
    metadata,
    service::wait,
    StratusError, StratusResult,
};

use super::{
    client::{decode_ec2, ItemList, AWS_NETWORKS_CONTAINER},
    AwsProvider,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateVpcResponse {
    vpc: VpcItem,
}

#[derive(Debug, Deserialize)]
struct DescribeVpcsResponse {
    #[serde(rename = "vpcSet", default)]
    vpcs: ItemList<VpcItem>,
}

#[derive(Debug, Deserialize)]
struct VpcItem {
    #[serde(rename = "vpcId")]
    vpc_id: String,
    #[serde(rename = "cidrBlock", default)]
    cidr_block: String,
}

#[derive(Debug, Deserialize)]
struct CreateSubnetResponse {
    subnet: SubnetItem,
}

#[derive(Debug, Deserialize)]
struct DescribeSubnetsResponse {
    #[serde(rename = "subnetSet", default)]
    subnets: ItemList<SubnetItem>,
}

#[derive(Debug, Deserialize)]
struct SubnetItem {
    #[serde(rename = "subnetId")]
    subnet_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateInternetGatewayResponse {
    #[serde(rename = "internetGateway")]
    internet_gateway: InternetGatewayItem,
}

#[derive(Debug, Deserialize)]
struct DescribeInternetGatewaysResponse {
    #[serde(rename = "internetGatewaySet", default)]
    internet_gateways: ItemList<InternetGatewayItem>,
}

#[derive(Debug, Deserialize)]
struct InternetGatewayItem {
    #[serde(rename = "internetGatewayId")]
    internet_gateway_id: String,
}

#[derive(Debug, Deserialize)]
struct DescribeRouteTablesResponse {
    #[serde(rename = "routeTableSet", default)]
    route_tables: ItemList<RouteTableItem>,
}

#[derive(Debug, Deserialize)]
struct RouteTableItem {
    #[serde(rename = "routeTableId")]
    route_table_id: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AwsProvider {
    /// Creates a gatewayed network with the route-table strategy: VPC,
    /// subnet, internet gateway, default route, then the gateway VM with an
    /// elastic IP, with reverse-order compensation on any failure.
    pub(super) async fn create_network(&self, request: NetworkRequest) -> StratusResult<Network> {
        let params = vec![("CidrBlock".to_string(), request.cidr.clone())];
        let xml = self
            .ec2_call("CreateVpc", params, "network", &request.name)
            .await?;
        let vpc: CreateVpcResponse = decode_ec2(&xml)?;
        let vpc_id = vpc.vpc.vpc_id;

        if let Err(err) = self.wire_vpc(&vpc_id, &request.cidr).await {
            self.rollback_vpc(&vpc_id, None).await;
            return Err(wrap_network_error(&request.name, err));
        }

        let mut gateway_request = request.gateway.clone();
        gateway_request.public_ip = true;
        gateway_request.is_gateway = true;
        gateway_request.network_ids = vec![vpc_id.clone()];

        let gateway = match self.create_vm(gateway_request).await {
            Ok(vm) => vm,
            Err(err) => {
                self.rollback_vpc(&vpc_id, None).await;
                return Err(wrap_network_error(&request.name, err));
            }
        };

        let network = Network {
            id: vpc_id.clone(),
            name: request.name.clone(),
            cidr: request.cidr.clone(),
            ip_version: request.ip_version,
            gateway_id: gateway.id.clone(),
        };
        if let Err(err) =
            metadata::save_json_record(self, AWS_NETWORKS_CONTAINER, &vpc_id, &network).await
        {
            self.rollback_vpc(&vpc_id, Some(&gateway.id)).await;
            return Err(wrap_network_error(&request.name, err));
        }
        Ok(network)
    }

    /// Wires a fresh VPC for internet access: subnet with the same CIDR,
    /// internet gateway, default route and route-table association.
    async fn wire_vpc(&self, vpc_id: &str, cidr: &str) -> StratusResult<()> {
        let params = vec![
            ("CidrBlock".to_string(), cidr.to_string()),
            ("VpcId".to_string(), vpc_id.to_string()),
        ];
        let xml = self.ec2_call("CreateSubnet", params, "subnet", cidr).await?;
        let subnet: CreateSubnetResponse = decode_ec2(&xml)?;
        let subnet_id = subnet.subnet.subnet_id;

        let xml = self
            .ec2_call(
                "CreateInternetGateway",
                Vec::new(),
                "internet gateway",
                vpc_id,
            )
            .await?;
        let igw: CreateInternetGatewayResponse = decode_ec2(&xml)?;
        let igw_id = igw.internet_gateway.internet_gateway_id;

        let params = vec![
            ("InternetGatewayId".to_string(), igw_id.clone()),
            ("VpcId".to_string(), vpc_id.to_string()),
        ];
        self.ec2_call("AttachInternetGateway", params, "internet gateway", &igw_id)
            .await?;

        let route_table_id = self
            .main_route_table(vpc_id)
            .await?
            .ok_or_else(|| StratusError::backend_str("vpc has no route table"))?;

        let params = vec![
            ("DestinationCidrBlock".to_string(), "0.0.0.0/0".to_string()),
            ("GatewayId".to_string(), igw_id),
            ("RouteTableId".to_string(), route_table_id.clone()),
        ];
        self.ec2_call("CreateRoute", params, "route", vpc_id).await?;

        let params = vec![
            ("RouteTableId".to_string(), route_table_id),
            ("SubnetId".to_string(), subnet_id),
        ];
        self.ec2_call("AssociateRouteTable", params, "route table", vpc_id)
            .await?;
        Ok(())
    }

    /// Reverse-order compensation for a partially-created network.
    async fn rollback_vpc(&self, vpc_id: &str, gateway_id: Option<&str>) {
        if let Some(gateway_id) = gateway_id {
            if let Err(err) = self.delete_vm(gateway_id).await {
                tracing::warn!("rollback: error deleting gateway {}: {}", gateway_id, err);
            } else if let Err(err) =
                wait::wait_vm_gone(self, gateway_id, VM_CREATION_TIMEOUT).await
            {
                tracing::warn!("rollback: gateway {} still resolves: {}", gateway_id, err);
            }
        }
        if let Err(err) = self.teardown_vpc(vpc_id).await {
            tracing::warn!("rollback: error deleting vpc {}: {}", vpc_id, err);
        }
    }

    /// Deletes a VPC and the plumbing `wire_vpc` created around it.
    async fn teardown_vpc(&self, vpc_id: &str) -> StratusResult<()> {
        for igw_id in self.internet_gateways_of(vpc_id).await? {
            let params = vec![
                ("InternetGatewayId".to_string(), igw_id.clone()),
                ("VpcId".to_string(), vpc_id.to_string()),
            ];
            self.ec2_call("DetachInternetGateway", params, "internet gateway", &igw_id)
                .await?;
            let params = vec![("InternetGatewayId".to_string(), igw_id.clone())];
            self.ec2_call("DeleteInternetGateway", params, "internet gateway", &igw_id)
                .await?;
        }

        for subnet_id in self.subnets_of_vpc(vpc_id).await? {
            let params = vec![("SubnetId".to_string(), subnet_id.clone())];
            self.ec2_call("DeleteSubnet", params, "subnet", &subnet_id)
                .await?;
        }

        let params = vec![("VpcId".to_string(), vpc_id.to_string())];
        self.ec2_call("DeleteVpc", params, "network", vpc_id).await?;
        Ok(())
    }

    pub(super) async fn get_network(&self, id: &str) -> StratusResult<Network> {
        let mut network: Network =
            metadata::load_json_record(self, AWS_NETWORKS_CONTAINER, id)
                .await
                .map_err(|_| StratusError::not_found("network", id))?;

        let params = vec![("VpcId.1".to_string(), id.to_string())];
        let xml = self.ec2_call("DescribeVpcs", params, "network", id).await?;
        let response: DescribeVpcsResponse = decode_ec2(&xml)?;
        let vpc = response
            .vpcs
            .items
            .into_iter()
            .next()
            .ok_or_else(|| StratusError::not_found("network", id))?;

        network.id = vpc.vpc_id;
        network.cidr = vpc.cidr_block;
        Ok(network)
    }

    pub(super) async fn list_networks(&self) -> StratusResult<Vec<Network>> {
        let xml = self
            .ec2_call("DescribeVpcs", Vec::new(), "network", "list")
            .await?;
        let response: DescribeVpcsResponse = decode_ec2(&xml)?;

        let mut networks = Vec::new();
        for vpc in response.vpcs.items {
            // VPCs without a record (the account default, or mid-create)
            // are not networks of this abstraction.
            match metadata::load_json_record::<_, Network>(
                self,
                AWS_NETWORKS_CONTAINER,
                &vpc.vpc_id,
            )
            .await
            {
                Ok(mut network) => {
                    network.id = vpc.vpc_id;
                    network.cidr = vpc.cidr_block;
                    networks.push(network);
                }
                Err(_) => continue,
            }
        }
        Ok(networks)
    }

    pub(super) async fn delete_network(&self, id: &str) -> StratusResult<()> {
        let network: Network = metadata::load_json_record(self, AWS_NETWORKS_CONTAINER, id)
            .await
            .map_err(|_| StratusError::not_found("network", id))?;

        self.delete_vm(&network.gateway_id).await?;
        wait::wait_vm_gone(self, &network.gateway_id, VM_CREATION_TIMEOUT).await?;

        metadata::remove_record(self, AWS_NETWORKS_CONTAINER, id).await?;
        self.teardown_vpc(id).await
    }

    /// The first subnet of a VPC, where instances land.
    pub(super) async fn subnet_of_vpc(&self, vpc_id: &str) -> StratusResult<Option<String>> {
        Ok(self.subnets_of_vpc(vpc_id).await?.into_iter().next())
    }

    async fn subnets_of_vpc(&self, vpc_id: &str) -> StratusResult<Vec<String>> {
        let params = vec![
            ("Filter.1.Name".to_string(), "vpc-id".to_string()),
            ("Filter.1.Value.1".to_string(), vpc_id.to_string()),
        ];
        let xml = self
            .ec2_call("DescribeSubnets", params, "subnet", vpc_id)
            .await?;
        let response: DescribeSubnetsResponse = decode_ec2(&xml)?;
        Ok(
            response
                .subnets
                .items
                .into_iter()
                .map(|subnet| subnet.subnet_id)
                .collect(),
        )
    }

    async fn internet_gateways_of(&self, vpc_id: &str) -> StratusResult<Vec<String>> {
        let params = vec![
            ("Filter.1.Name".to_string(), "attachment.vpc-id".to_string()),
            ("Filter.1.Value.1".to_string(), vpc_id.to_string()),
        ];
        let xml = self
            .ec2_call(
                "DescribeInternetGateways",
                params,
                "internet gateway",
                vpc_id,
            )
            .await?;
        let response: DescribeInternetGatewaysResponse = decode_ec2(&xml)?;
        Ok(
            response
                .internet_gateways
                .items
                .into_iter()
                .map(|igw| igw.internet_gateway_id)
                .collect(),
        )
    }

    async fn main_route_table(&self, vpc_id: &str) -> StratusResult<Option<String>> {
        let params = vec![
            ("Filter.1.Name".to_string(), "vpc-id".to_string()),
            ("Filter.1.Value.1".to_string(), vpc_id.to_string()),
        ];
        let xml = self
            .ec2_call("DescribeRouteTables", params, "route table", vpc_id)
            .await?;
        let response: DescribeRouteTablesResponse = decode_ec2(&xml)?;
        Ok(
            response
                .route_tables
                .items
                .into_iter()
                .next()
                .map(|table| table.route_table_id),
        )
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
    fn test_create_vpc_decoding() -> anyhow::Result<()> {
        let xml = r#"<CreateVpcResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <requestId>req-1</requestId>
  <vpc>
    <vpcId>vpc-0aa11</vpcId>
    <cidrBlock>192.168.1.0/24</cidrBlock>
    <state>pending</state>
  </vpc>
</CreateVpcResponse>"#;
        let response: CreateVpcResponse = decode_ec2(xml)?;
        assert_eq!(response.vpc.vpc_id, "vpc-0aa11");
        assert_eq!(response.vpc.cidr_block, "192.168.1.0/24");
        Ok(())
    }

    #[test]
    fn test_describe_route_tables_decoding() -> anyhow::Result<()> {
        let xml = r#"<DescribeRouteTablesResponse>
  <routeTableSet>
    <item><routeTableId>rtb-1</routeTableId></item>
  </routeTableSet>
</DescribeRouteTablesResponse>"#;
        let response: DescribeRouteTablesResponse = decode_ec2(xml)?;
        assert_eq!(response.route_tables.items[0].route_table_id, "rtb-1");
        Ok(())
    }
}
