//! The embedded user-data script rendered for every provisioned VM.
//!
//! The script is kept as a textual template with a fixed field set; backends
//! render it per VM and hand the result to the instance's first boot
//! (base64-encoded where the native API requires it).

use std::sync::LazyLock;

use base64::{engine::general_purpose, Engine as _};
use minijinja::Environment;
use serde::Serialize;
use typed_builder::TypedBuilder;

use crate::{config::DEFAULT_USER, StratusError, StratusResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The embedded user-data shell template.
const USERDATA_TEMPLATE: &str = include_str!("templates/userdata.sh");

/// The template name registered in the render environment.
const USERDATA_TEMPLATE_NAME: &str = "userdata.sh";

static TEMPLATES: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template(USERDATA_TEMPLATE_NAME, USERDATA_TEMPLATE)
        .expect("embedded user-data template must parse");
    env
});

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The field set applied to the user-data template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, TypedBuilder)]
pub struct UserData {
    /// The login user to create, with passwordless sudo.
    #[builder(default = DEFAULT_USER.to_string(), setter(into))]
    pub user: String,

    /// The public key installed in the user's `authorized_keys`, without a
    /// trailing newline.
    #[builder(setter(into))]
    pub key: String,

    /// Whether to enable persistent IPv4 forwarding and NAT masquerading.
    #[builder(default)]
    pub is_gateway: bool,

    /// Whether to install a default route via `gateway_ip`.
    #[builder(default)]
    pub add_gateway: bool,

    /// The content written to `/etc/resolv.conf`, one `nameserver X` line
    /// per configured DNS server. Empty when the VM is public.
    #[builder(default, setter(into))]
    pub resolve_conf: String,

    /// The private address of the gateway, IPv4 preferred.
    #[builder(default, setter(into))]
    pub gateway_ip: String,

    /// Whether the VM must enable DHCP on its interfaces itself.
    #[builder(default)]
    pub conf_if: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl UserData {
    /// Formats the resolv.conf content for a list of DNS server addresses.
    pub fn resolve_conf_for(dns_list: &[String]) -> String {
        dns_list
            .iter()
            .map(|dns| format!("nameserver {}\n", dns))
            .collect()
    }

    /// Renders the user-data script for this field set.
    pub fn render(&self) -> StratusResult<String> {
        let template = TEMPLATES
            .get_template(USERDATA_TEMPLATE_NAME)
            .map_err(StratusError::backend)?;
        template.render(self).map_err(StratusError::backend)
    }

    /// Renders the user-data script and base64-encodes it for backends that
    /// require encoded transport.
    pub fn render_base64(&self) -> StratusResult<String> {
        let script = self.render()?;
        Ok(general_purpose::STANDARD.encode(script.as_bytes()))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain_vm() -> anyhow::Result<()> {
        let data = UserData::builder().key("ssh-rsa AAAA test").build();
        let script = data.render()?;

        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("adduser gpac --gecos \"\" --disabled-password"));
        assert!(script.contains("echo \"gpac ALL=(ALL) NOPASSWD:ALL\" >> /etc/sudoers"));
        assert!(script.contains("echo \"ssh-rsa AAAA test\" > /home/gpac/.ssh/authorized_keys"));
        assert!(!script.contains("MASQUERADE"));
        assert!(!script.contains("ip route replace default"));
        assert!(!script.contains("iface $iface inet dhcp"));
        Ok(())
    }

    #[test]
    fn test_render_gateway_enables_forwarding() -> anyhow::Result<()> {
        let data = UserData::builder()
            .key("ssh-rsa AAAA gw")
            .is_gateway(true)
            .build();
        let script = data.render()?;

        assert!(script.contains("net.ipv4.ip_forward=1"));
        assert!(script.contains("MASQUERADE"));
        Ok(())
    }

    #[test]
    fn test_render_private_vm_routes_through_gateway() -> anyhow::Result<()> {
        let data = UserData::builder()
            .key("ssh-rsa AAAA priv")
            .add_gateway(true)
            .gateway_ip("192.168.1.254")
            .resolve_conf(UserData::resolve_conf_for(&[
                "8.8.8.8".to_string(),
                "1.1.1.1".to_string(),
            ]))
            .conf_if(true)
            .build();
        let script = data.render()?;

        assert!(script.contains("ip route replace default via 192.168.1.254"));
        assert!(script.contains("nameserver 8.8.8.8\nnameserver 1.1.1.1\n"));
        assert!(script.contains("iface $iface inet dhcp"));
        Ok(())
    }

    #[test]
    fn test_render_base64_round_trips() -> anyhow::Result<()> {
        let data = UserData::builder().key("ssh-rsa AAAA b64").build();
        let encoded = data.render_base64()?;
        let decoded = general_purpose::STANDARD.decode(encoded)?;
        assert_eq!(String::from_utf8(decoded)?, data.render()?);
        Ok(())
    }

    #[test]
    fn test_resolve_conf_formatting() {
        assert_eq!(UserData::resolve_conf_for(&[]), "");
        assert_eq!(
            UserData::resolve_conf_for(&["10.0.0.2".to_string()]),
            "nameserver 10.0.0.2\n"
        );
    }
}
