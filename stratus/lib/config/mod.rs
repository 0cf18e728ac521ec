//! Backend configuration types.

use std::collections::HashMap;

use getset::Getters;
use typed_builder::TypedBuilder;

use crate::{api::VolumeSpeed, StratusError, StratusResult};

mod defaults;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Options shaping how a backend realises the provider contract.
///
/// The option set is uniform across backends; each backend interprets the
/// subset that applies to its networking model.
#[derive(Debug, Clone, Default, Getters, TypedBuilder)]
#[getset(get = "pub with_prefix")]
#[builder(build_method(into = BackendConfigUnchecked))]
pub struct BackendConfig {
    /// The name of the pre-existing externally-routable provider network.
    #[builder(default, setter(into))]
    pub(crate) provider_network: String,

    /// The DNS servers configured on gateway VMs, in order.
    #[builder(default)]
    pub(crate) dns_list: Vec<String>,

    /// Whether public access uses floating IPs. Requires
    /// `use_layer3_networking`.
    #[builder(default)]
    pub(crate) use_floating_ip: bool,

    /// Whether layer-3 networking features (routers) can be used.
    #[builder(default)]
    pub(crate) use_layer3_networking: bool,

    /// Whether the backend configures VM network interfaces automatically.
    /// When false, provisioned VMs enable DHCP on every interface
    /// themselves.
    #[builder(default)]
    pub(crate) auto_vm_network_interfaces: bool,

    /// Maps backend-specific volume type names to uniform speeds.
    #[builder(default)]
    pub(crate) volume_speeds: HashMap<String, VolumeSpeed>,
}

/// A [`BackendConfig`] built but not yet validated.
///
/// Produced by the builder so that flag coherence is checked exactly once,
/// at [`BackendConfigUnchecked::validate`].
#[derive(Debug)]
pub struct BackendConfigUnchecked(BackendConfig);

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BackendConfig {
    /// Maps a backend volume type name to its configured speed, HDD when the
    /// type is unknown.
    pub fn volume_speed(&self, type_name: &str) -> VolumeSpeed {
        self.volume_speeds
            .get(type_name)
            .copied()
            .unwrap_or(VolumeSpeed::Hdd)
    }

    /// Finds a backend volume type name mapped to the given speed.
    pub fn volume_type(&self, speed: VolumeSpeed) -> Option<&str> {
        self.volume_speeds
            .iter()
            .find(|(_, s)| **s == speed)
            .map(|(name, _)| name.as_str())
    }
}

impl BackendConfigUnchecked {
    /// Validates flag coherence and yields the usable configuration.
    ///
    /// Floating IPs ride on layer-3 routers, so `use_floating_ip` without
    /// `use_layer3_networking` is rejected as *invalid-argument*.
    pub fn validate(self) -> StratusResult<BackendConfig> {
        let config = self.0;
        if config.use_floating_ip && !config.use_layer3_networking {
            return Err(StratusError::InvalidArgument(
                "use_floating_ip requires use_layer3_networking".into(),
            ));
        }
        Ok(config)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<BackendConfig> for BackendConfigUnchecked {
    fn from(config: BackendConfig) -> Self {
        BackendConfigUnchecked(config)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floating_ip_requires_layer3() {
        let err = BackendConfig::builder()
            .provider_network("public")
            .use_floating_ip(true)
            .build()
            .validate()
            .unwrap_err();
        assert!(matches!(err, StratusError::InvalidArgument(_)));

        let config = BackendConfig::builder()
            .provider_network("public")
            .use_floating_ip(true)
            .use_layer3_networking(true)
            .build()
            .validate()
            .unwrap();
        assert!(config.use_floating_ip);
    }

    #[test]
    fn test_volume_speed_mapping() {
        let config = BackendConfig::builder()
            .volume_speeds(HashMap::from([
                ("classic".to_string(), VolumeSpeed::Hdd),
                ("high-speed".to_string(), VolumeSpeed::Ssd),
            ]))
            .build()
            .validate()
            .unwrap();

        assert_eq!(config.volume_speed("high-speed"), VolumeSpeed::Ssd);
        assert_eq!(config.volume_speed("unknown"), VolumeSpeed::Hdd);
        assert_eq!(config.volume_type(VolumeSpeed::Ssd), Some("high-speed"));
        assert_eq!(config.volume_type(VolumeSpeed::Cold), None);
    }
}
