//! The high-level service facade over one backend realisation.

use std::{collections::HashMap, time::Duration};

use getset::Getters;
use uuid::Uuid;

use crate::{
    api::{
        Image, KeyPair, Network, Provider, SizingRequirements, Vm, VmRequest, VmState, VmTemplate,
        Volume, VolumeState,
    },
    StratusError, StratusResult,
};

use super::{rank, similarity, wait};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The minimum Jaro-Winkler score an image must reach to match a query.
const IMAGE_MATCH_THRESHOLD: f64 = 0.8;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The high-level service composing primitive provider operations into
/// compound flows: sized template selection, fuzzy image search, VM
/// creation with scoped key pairs, name-indexed lookups and bounded state
/// convergence.
#[derive(Debug, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Service<P: Provider> {
    /// The backend realisation the service drives.
    provider: P,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<P: Provider> Service<P> {
    /// Wraps a backend realisation.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Waits until the VM identified by `id` reaches `state`, returning the
    /// first record observed in that state, or *timeout*.
    pub async fn wait_vm_state(
        &self,
        id: &str,
        state: VmState,
        timeout: Duration,
    ) -> StratusResult<Vm> {
        wait::wait_vm_state(&self.provider, id, state, timeout).await
    }

    /// Waits until the volume identified by `id` reaches `state`.
    pub async fn wait_volume_state(
        &self,
        id: &str,
        state: VolumeState,
        timeout: Duration,
    ) -> StratusResult<Volume> {
        wait::wait_volume_state(&self.provider, id, state, timeout).await
    }

    /// Selects the templates satisfying the sizing requirements, ordered
    /// ascending by Dominant Resource Fairness rank (best fit first),
    /// stable on ties.
    pub async fn select_templates_by_size(
        &self,
        sizing: SizingRequirements,
    ) -> StratusResult<Vec<VmTemplate>> {
        let templates = self.provider.list_templates().await?;
        let mut selected: Vec<VmTemplate> = templates
            .into_iter()
            .filter(|tpl| {
                tpl.size.cores >= sizing.min_cores
                    && tpl.size.ram_size >= sizing.min_ram_size
                    && tpl.size.disk_size >= sizing.min_disk_size
            })
            .collect();
        rank::sort_by_rank_drf(&mut selected);
        Ok(selected)
    }

    /// Searches the image whose name best matches an OS name, using
    /// Jaro-Winkler similarity over upper-cased names.
    ///
    /// The best-scoring image wins when its score reaches 0.8; images tying
    /// on score keep the first one in list order. Below the threshold the
    /// search fails with *not-found*.
    pub async fn search_image(&self, os_name: &str) -> StratusResult<Image> {
        let images = self.provider.list_images().await?;
        let query = os_name.to_uppercase();

        let mut best: Option<(f64, Image)> = None;
        for image in images {
            let score = similarity::image_similarity(&image.name.to_uppercase(), &query);
            if best.as_ref().is_none_or(|(top, _)| score > *top) {
                best = Some((score, image));
            }
        }

        match best {
            Some((score, image)) if score >= IMAGE_MATCH_THRESHOLD => Ok(image),
            _ => Err(StratusError::not_found("image", os_name)),
        }
    }

    /// Creates a VM named `request.name` with a freshly generated key pair.
    ///
    /// The pair only lives for the duration of the call: it is registered
    /// under a unique name, handed to the creation flow, and deleted before
    /// returning. The returned pair is the caller's only copy; the VM
    /// record retains the private key. Fails with *already-exists* when a
    /// VM of that name is already up.
    pub async fn create_vm_with_key_pair(
        &self,
        request: VmRequest,
    ) -> StratusResult<(Vm, KeyPair)> {
        if self.get_vm_by_name(&request.name).await.is_ok() {
            return Err(StratusError::already_exists("vm", request.name));
        }

        let kp_name = Uuid::new_v4().to_string();
        let key_pair = self.provider.create_key_pair(&kp_name).await?;

        let vm_request = VmRequest {
            key_pair: Some(key_pair.clone()),
            ..request
        };
        let result = self.provider.create_vm(vm_request).await;

        if let Err(err) = self.provider.delete_key_pair(&kp_name).await {
            tracing::warn!("error deleting scoped key pair {}: {}", kp_name, err);
        }

        result.map(|vm| (vm, key_pair))
    }

    /// Lists networks indexed by name.
    pub async fn list_networks_by_name(&self) -> StratusResult<HashMap<String, Network>> {
        let networks = self.provider.list_networks().await?;
        Ok(
            networks
                .into_iter()
                .map(|net| (net.name.clone(), net))
                .collect(),
        )
    }

    /// Returns the network named `name`, or *not-found*.
    pub async fn get_network_by_name(&self, name: &str) -> StratusResult<Network> {
        let mut networks = self.list_networks_by_name().await?;
        networks
            .remove(name)
            .ok_or_else(|| StratusError::not_found("network", name))
    }

    /// Lists VMs indexed by name.
    pub async fn list_vms_by_name(&self) -> StratusResult<HashMap<String, Vm>> {
        let vms = self.provider.list_vms().await?;
        Ok(vms.into_iter().map(|vm| (vm.name.clone(), vm)).collect())
    }

    /// Returns the VM named `name`, or *not-found*.
    pub async fn get_vm_by_name(&self, name: &str) -> StratusResult<Vm> {
        let mut vms = self.list_vms_by_name().await?;
        vms.remove(name)
            .ok_or_else(|| StratusError::not_found("vm", name))
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<P: Provider> std::ops::Deref for Service<P> {
    type Target = P;

    fn deref(&self) -> &Self::Target {
        &self.provider
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{NetworkRequest, VmSize},
        providers::MemoryProvider,
    };

    fn template(id: &str, cores: u32, ram: f32, disk: u32) -> VmTemplate {
        VmTemplate {
            id: id.into(),
            name: id.into(),
            size: VmSize {
                cores,
                ram_size: ram,
                disk_size: disk,
            },
        }
    }

    fn service_with_catalog(templates: Vec<VmTemplate>) -> Service<MemoryProvider> {
        let provider = MemoryProvider::with_catalog(
            Default::default(),
            MemoryProvider::default_images(),
            templates,
        );
        Service::new(provider)
    }

    #[tokio::test]
    async fn test_select_templates_by_size() -> anyhow::Result<()> {
        let service = service_with_catalog(vec![
            template("a", 1, 1.0, 10),
            template("b", 2, 4.0, 20),
            template("c", 4, 8.0, 40),
        ]);

        let sizing = SizingRequirements {
            min_cores: 1,
            min_ram_size: 4.0,
            min_disk_size: 10,
        };
        let selected = service.select_templates_by_size(sizing).await?;
        let ids: Vec<&str> = selected.iter().map(|t| t.id.as_str()).collect();

        // `a` is excluded by RAM, the rest come back best fit first.
        assert_eq!(ids, vec!["b", "c"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_search_image_exact_and_miss() -> anyhow::Result<()> {
        let service = Service::new(MemoryProvider::new());

        let image = service.search_image("Ubuntu 16.04").await?;
        assert_eq!(image.name, "Ubuntu 16.04");

        let err = service.search_image("zzz").await.unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_vm_with_key_pair_scopes_the_pair() -> anyhow::Result<()> {
        let service = Service::new(MemoryProvider::new());

        let network = service
            .create_network(
                NetworkRequest::builder()
                    .name("lab")
                    .cidr("10.1.0.0/24")
                    .gateway(
                        VmRequest::builder()
                            .name("gw-lab")
                            .template_id("tpl-small")
                            .image_id("img-ubuntu-1804")
                            .build(),
                    )
                    .build(),
            )
            .await?;

        let (vm, key_pair) = service
            .create_vm_with_key_pair(
                VmRequest::builder()
                    .name("worker-0")
                    .network_ids(vec![network.id.clone()])
                    .public_ip(true)
                    .template_id("tpl-small")
                    .image_id("img-ubuntu-1804")
                    .build(),
            )
            .await?;

        assert_eq!(vm.state, VmState::Started);
        assert!(!key_pair.private_key.is_empty());
        // The scoped pair was deleted; only records remain.
        assert!(service.list_key_pairs().await?.is_empty());

        // A second VM of the same name is refused.
        let err = service
            .create_vm_with_key_pair(
                VmRequest::builder()
                    .name("worker-0")
                    .network_ids(vec![network.id.clone()])
                    .public_ip(true)
                    .template_id("tpl-small")
                    .image_id("img-ubuntu-1804")
                    .build(),
            )
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_name_indexed_lookups() -> anyhow::Result<()> {
        let service = Service::new(MemoryProvider::new());

        let network = service
            .create_network(
                NetworkRequest::builder()
                    .name("lab")
                    .cidr("10.2.0.0/24")
                    .gateway(
                        VmRequest::builder()
                            .name("gw-lab")
                            .template_id("tpl-small")
                            .image_id("img-ubuntu-1804")
                            .build(),
                    )
                    .build(),
            )
            .await?;

        assert_eq!(service.get_network_by_name("lab").await?.id, network.id);
        assert!(service
            .get_network_by_name("nope")
            .await
            .unwrap_err()
            .is_not_found());

        assert_eq!(
            service.get_vm_by_name("gw-lab").await?.id,
            network.gateway_id
        );
        Ok(())
    }
}
