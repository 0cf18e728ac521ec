//! The AWS-family realisation of the provider contract.
//!
//! Compute, network and storage operations go through the SigV4-signed EC2
//! query API; the object store is S3. Networking uses the route-table
//! strategy: each network is a VPC with an internet gateway and a default
//! route, and gateway VMs hold elastic IPs. Facts the native model cannot
//! carry (network records, VM records, volume names) live in reserved S3
//! buckets.

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
mod sign;
mod storage;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use client::{AwsAuthOpts, AwsProvider};

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl Provider for AwsProvider {
    async fn list_images(&self) -> StratusResult<Vec<Image>> {
        AwsProvider::list_images(self).await
    }

    async fn get_image(&self, id: &str) -> StratusResult<Image> {
        AwsProvider::get_image(self, id).await
    }

    async fn list_templates(&self) -> StratusResult<Vec<VmTemplate>> {
        AwsProvider::list_templates(self).await
    }

    async fn get_template(&self, id: &str) -> StratusResult<VmTemplate> {
        AwsProvider::get_template(self, id).await
    }

    async fn create_key_pair(&self, name: &str) -> StratusResult<KeyPair> {
        AwsProvider::create_key_pair(self, name).await
    }

    async fn get_key_pair(&self, id: &str) -> StratusResult<KeyPair> {
        AwsProvider::get_key_pair(self, id).await
    }

    async fn list_key_pairs(&self) -> StratusResult<Vec<KeyPair>> {
        AwsProvider::list_key_pairs(self).await
    }

    async fn delete_key_pair(&self, id: &str) -> StratusResult<()> {
        AwsProvider::delete_key_pair(self, id).await
    }

    async fn create_network(&self, request: NetworkRequest) -> StratusResult<Network> {
        AwsProvider::create_network(self, request).await
    }

    async fn get_network(&self, id: &str) -> StratusResult<Network> {
        AwsProvider::get_network(self, id).await
    }

    async fn list_networks(&self) -> StratusResult<Vec<Network>> {
        AwsProvider::list_networks(self).await
    }

    async fn delete_network(&self, id: &str) -> StratusResult<()> {
        AwsProvider::delete_network(self, id).await
    }

    async fn create_vm(&self, request: VmRequest) -> StratusResult<Vm> {
        AwsProvider::create_vm(self, request).await
    }

    async fn get_vm(&self, id: &str) -> StratusResult<Vm> {
        AwsProvider::get_vm(self, id).await
    }

    async fn list_vms(&self) -> StratusResult<Vec<Vm>> {
        AwsProvider::list_vms(self).await
    }

    async fn delete_vm(&self, id: &str) -> StratusResult<()> {
        AwsProvider::delete_vm(self, id).await
    }

    async fn start_vm(&self, id: &str) -> StratusResult<()> {
        AwsProvider::start_vm(self, id).await
    }

    async fn stop_vm(&self, id: &str) -> StratusResult<()> {
        AwsProvider::stop_vm(self, id).await
    }

    async fn create_volume(&self, request: VolumeRequest) -> StratusResult<Volume> {
        AwsProvider::create_volume(self, request).await
    }

    async fn get_volume(&self, id: &str) -> StratusResult<Volume> {
        AwsProvider::get_volume(self, id).await
    }

    async fn list_volumes(&self) -> StratusResult<Vec<Volume>> {
        AwsProvider::list_volumes(self).await
    }

    async fn delete_volume(&self, id: &str) -> StratusResult<()> {
        AwsProvider::delete_volume(self, id).await
    }

    async fn create_volume_attachment(
        &self,
        request: VolumeAttachmentRequest,
    ) -> StratusResult<VolumeAttachment> {
        AwsProvider::create_volume_attachment(self, request).await
    }

    async fn get_volume_attachment(
        &self,
        server_id: &str,
        id: &str,
    ) -> StratusResult<VolumeAttachment> {
        AwsProvider::get_volume_attachment(self, server_id, id).await
    }

    async fn list_volume_attachments(
        &self,
        server_id: &str,
    ) -> StratusResult<Vec<VolumeAttachment>> {
        AwsProvider::list_volume_attachments(self, server_id).await
    }

    async fn delete_volume_attachment(&self, server_id: &str, id: &str) -> StratusResult<()> {
        AwsProvider::delete_volume_attachment(self, server_id, id).await
    }

    async fn create_container(&self, name: &str) -> StratusResult<()> {
        AwsProvider::create_container(self, name).await
    }

    async fn delete_container(&self, name: &str) -> StratusResult<()> {
        AwsProvider::delete_container(self, name).await
    }

    async fn list_containers(&self) -> StratusResult<Vec<String>> {
        AwsProvider::list_containers(self).await
    }

    async fn put_object(&self, container: &str, object: Object) -> StratusResult<()> {
        AwsProvider::put_object(self, container, object).await
    }

    async fn update_object_metadata(&self, container: &str, object: Object) -> StratusResult<()> {
        AwsProvider::update_object_metadata(self, container, object).await
    }

    async fn get_object(
        &self,
        container: &str,
        name: &str,
        ranges: &[ByteRange],
    ) -> StratusResult<Object> {
        AwsProvider::get_object(self, container, name, ranges).await
    }

    async fn get_object_metadata(&self, container: &str, name: &str) -> StratusResult<Object> {
        AwsProvider::get_object_metadata(self, container, name).await
    }

    async fn list_objects(
        &self,
        container: &str,
        filter: ObjectFilter,
    ) -> StratusResult<Vec<String>> {
        AwsProvider::list_objects(self, container, filter).await
    }

    async fn copy_object(
        &self,
        container: &str,
        source: &str,
        destination: &str,
    ) -> StratusResult<()> {
        AwsProvider::copy_object(self, container, source, destination).await
    }

    async fn delete_object(&self, container: &str, name: &str) -> StratusResult<()> {
        AwsProvider::delete_object(self, container, name).await
    }
}
