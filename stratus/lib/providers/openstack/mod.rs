//! The OpenStack-family realisation of the provider contract.
//!
//! Compute, network, volume and object-store operations are issued straight
//! against the Keystone-catalogued service endpoints (Nova, Neutron, Cinder,
//! Swift). Networking uses the layer-3 strategy: a router fronts each
//! private subnet and floating IPs provide public access.

use async_trait::async_trait;

use crate::{
    api::{
        ByteRange, Image, KeyPair, Network, NetworkRequest, Object, ObjectFilter, Provider, Vm,
        VmRequest, VmTemplate, Volume, VolumeAttachment, VolumeAttachmentRequest, VolumeRequest,
    },
    StratusResult,
};

mod client;
mod compute;
mod network;
mod objects;
mod storage;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use client::{AuthOptions, OpenStackProvider, DEFAULT_SECURITY_GROUP};
pub use network::{Router, RouterRequest, Subnet};

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl Provider for OpenStackProvider {
    async fn list_images(&self) -> StratusResult<Vec<Image>> {
        OpenStackProvider::list_images(self).await
    }

    async fn get_image(&self, id: &str) -> StratusResult<Image> {
        OpenStackProvider::get_image(self, id).await
    }

    async fn list_templates(&self) -> StratusResult<Vec<VmTemplate>> {
        OpenStackProvider::list_templates(self).await
    }

    async fn get_template(&self, id: &str) -> StratusResult<VmTemplate> {
        OpenStackProvider::get_template(self, id).await
    }

    async fn create_key_pair(&self, name: &str) -> StratusResult<KeyPair> {
        OpenStackProvider::create_key_pair(self, name).await
    }

    async fn get_key_pair(&self, id: &str) -> StratusResult<KeyPair> {
        OpenStackProvider::get_key_pair(self, id).await
    }

    async fn list_key_pairs(&self) -> StratusResult<Vec<KeyPair>> {
        OpenStackProvider::list_key_pairs(self).await
    }

    async fn delete_key_pair(&self, id: &str) -> StratusResult<()> {
        OpenStackProvider::delete_key_pair(self, id).await
    }

    async fn create_network(&self, request: NetworkRequest) -> StratusResult<Network> {
        OpenStackProvider::create_network(self, request).await
    }

    async fn get_network(&self, id: &str) -> StratusResult<Network> {
        OpenStackProvider::get_network(self, id).await
    }

    async fn list_networks(&self) -> StratusResult<Vec<Network>> {
        OpenStackProvider::list_networks(self).await
    }

    async fn delete_network(&self, id: &str) -> StratusResult<()> {
        OpenStackProvider::delete_network(self, id).await
    }

    async fn create_vm(&self, request: VmRequest) -> StratusResult<Vm> {
        OpenStackProvider::create_vm(self, request).await
    }

    async fn get_vm(&self, id: &str) -> StratusResult<Vm> {
        OpenStackProvider::get_vm(self, id).await
    }

    async fn list_vms(&self) -> StratusResult<Vec<Vm>> {
        OpenStackProvider::list_vms(self).await
    }

    async fn delete_vm(&self, id: &str) -> StratusResult<()> {
        OpenStackProvider::delete_vm(self, id).await
    }

    async fn start_vm(&self, id: &str) -> StratusResult<()> {
        OpenStackProvider::start_vm(self, id).await
    }

    async fn stop_vm(&self, id: &str) -> StratusResult<()> {
        OpenStackProvider::stop_vm(self, id).await
    }

    async fn create_volume(&self, request: VolumeRequest) -> StratusResult<Volume> {
        OpenStackProvider::create_volume(self, request).await
    }

    async fn get_volume(&self, id: &str) -> StratusResult<Volume> {
        OpenStackProvider::get_volume(self, id).await
    }

    async fn list_volumes(&self) -> StratusResult<Vec<Volume>> {
        OpenStackProvider::list_volumes(self).await
    }

    async fn delete_volume(&self, id: &str) -> StratusResult<()> {
        OpenStackProvider::delete_volume(self, id).await
    }

    async fn create_volume_attachment(
        &self,
        request: VolumeAttachmentRequest,
    ) -> StratusResult<VolumeAttachment> {
        OpenStackProvider::create_volume_attachment(self, request).await
    }

    async fn get_volume_attachment(
        &self,
        server_id: &str,
        id: &str,
    ) -> StratusResult<VolumeAttachment> {
        OpenStackProvider::get_volume_attachment(self, server_id, id).await
    }

    async fn list_volume_attachments(
        &self,
        server_id: &str,
    ) -> StratusResult<Vec<VolumeAttachment>> {
        OpenStackProvider::list_volume_attachments(self, server_id).await
    }

    async fn delete_volume_attachment(&self, server_id: &str, id: &str) -> StratusResult<()> {
        OpenStackProvider::delete_volume_attachment(self, server_id, id).await
    }

    async fn create_container(&self, name: &str) -> StratusResult<()> {
        OpenStackProvider::create_container(self, name).await
    }

    async fn delete_container(&self, name: &str) -> StratusResult<()> {
        OpenStackProvider::delete_container(self, name).await
    }

    async fn list_containers(&self) -> StratusResult<Vec<String>> {
        OpenStackProvider::list_containers(self).await
    }

    async fn put_object(&self, container: &str, object: Object) -> StratusResult<()> {
        OpenStackProvider::put_object(self, container, object).await
    }

    async fn update_object_metadata(&self, container: &str, object: Object) -> StratusResult<()> {
        OpenStackProvider::update_object_metadata(self, container, object).await
    }

    async fn get_object(
        &self,
        container: &str,
        name: &str,
        ranges: &[ByteRange],
    ) -> StratusResult<Object> {
        OpenStackProvider::get_object(self, container, name, ranges).await
    }

    async fn get_object_metadata(&self, container: &str, name: &str) -> StratusResult<Object> {
        OpenStackProvider::get_object_metadata(self, container, name).await
    }

    async fn list_objects(
        &self,
        container: &str,
        filter: ObjectFilter,
    ) -> StratusResult<Vec<String>> {
        OpenStackProvider::list_objects(self, container, filter).await
    }

    async fn copy_object(
        &self,
        container: &str,
        source: &str,
        destination: &str,
    ) -> StratusResult<()> {
        OpenStackProvider::copy_object(self, container, source, destination).await
    }

    async fn delete_object(&self, container: &str, name: &str) -> StratusResult<()> {
        OpenStackProvider::delete_object(self, container, name).await
    }
}
