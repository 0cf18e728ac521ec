//! Entity records exchanged with backend realisations.
//!
//! All resources are keyed by opaque provider-assigned id strings. Records
//! serialize to JSON with snake_case field names so they can be persisted
//! in the metadata side-channel or handed to callers unchanged.

use std::{collections::HashMap, fmt, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::config::{DEFAULT_SSH_CONNECTION_TIMEOUT, DEFAULT_SSH_PORT, DEFAULT_USER};

use super::{IpVersion, VmState, VolumeSpeed, VolumeState};

//--------------------------------------------------------------------------------------------------
// Types: Compute
//--------------------------------------------------------------------------------------------------

/// An SSH key pair registered with a backend.
///
/// The private key is only known at creation time; later retrievals may
/// return it empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    /// The provider-assigned id of the key pair.
    pub id: String,

    /// The name of the key pair.
    pub name: String,

    /// The public key in OpenSSH `authorized_keys` format.
    pub public_key: String,

    /// The private key in PEM format, empty when unknown.
    pub private_key: String,
}

/// The sizing elements of a VM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VmSize {
    /// The number of virtual cores.
    pub cores: u32,

    /// The amount of RAM in GiB.
    pub ram_size: f32,

    /// The amount of local disk in GiB.
    pub disk_size: u32,
}

/// A VM template offered by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmTemplate {
    /// The provider-assigned id of the template.
    pub id: String,

    /// The name of the template.
    pub name: String,

    /// The sizing elements of the template.
    #[serde(rename = "vm_size")]
    pub size: VmSize,
}

/// Minimum sizing a template must satisfy to be selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct SizingRequirements {
    /// The minimum number of cores.
    #[builder(default)]
    pub min_cores: u32,

    /// The minimum amount of RAM in GiB.
    #[builder(default)]
    pub min_ram_size: f32,

    /// The minimum amount of disk in GiB.
    #[builder(default)]
    pub min_disk_size: u32,
}

/// A virtual machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vm {
    /// The provider-assigned id of the VM.
    pub id: String,

    /// The name of the VM.
    pub name: String,

    /// The private IPv4 addresses of the VM, in interface order.
    pub private_ips_v4: Vec<String>,

    /// The private IPv6 addresses of the VM, in interface order.
    pub private_ips_v6: Vec<String>,

    /// The publicly reachable IPv4 address, empty when the VM has neither a
    /// floating IPv4 nor a public IPv4 interface.
    pub access_ip_v4: String,

    /// The publicly reachable IPv6 address, empty when the VM has neither a
    /// floating IPv6 nor a public IPv6 interface.
    pub access_ip_v6: String,

    /// The sizing elements of the VM.
    pub size: VmSize,

    /// The lifecycle state of the VM.
    pub state: VmState,

    /// The private key retained with the VM, possibly empty.
    pub private_key: String,

    /// The id of the gateway VM of the VM's primary network. Empty iff the
    /// VM is itself a gateway or holds a public address.
    pub gateway_id: String,
}

/// Requirements for creating a virtual machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct VmRequest {
    /// The name of the VM.
    #[builder(setter(into))]
    pub name: String,

    /// The ids of the networks the VM must join, in order. The first entry
    /// is the primary network.
    #[builder(default)]
    pub network_ids: Vec<String>,

    /// Whether the VM must hold a publicly reachable address.
    #[builder(default)]
    pub public_ip: bool,

    /// The id of the template used to size the VM.
    #[builder(default, setter(into))]
    pub template_id: String,

    /// The id of the image holding the VM's OS and initial state.
    #[builder(default, setter(into))]
    pub image_id: String,

    /// The key pair installed on the VM. A temporary pair is generated when
    /// absent.
    #[builder(default)]
    pub key_pair: Option<KeyPair>,

    /// Whether the VM forwards traffic for siblings on its network.
    #[builder(default)]
    pub is_gateway: bool,
}

/// An SSH connection descriptor for a VM, with an optional descriptor for
/// the gateway the connection must hop through.
#[derive(Debug, Clone, PartialEq)]
pub struct SshConfig {
    /// The address to connect to.
    pub host: String,

    /// The TCP port of the SSH service.
    pub port: u16,

    /// The login user.
    pub user: String,

    /// The private key authenticating the connection, PEM format.
    pub private_key: String,

    /// How long to wait for the TCP connection.
    pub connection_timeout: Duration,

    /// The descriptor of the gateway to tunnel through, if any.
    pub gateway: Option<Box<SshConfig>>,
}

//--------------------------------------------------------------------------------------------------
// Types: Storage
//--------------------------------------------------------------------------------------------------

/// A block volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// The provider-assigned id of the volume.
    pub id: String,

    /// The name of the volume.
    pub name: String,

    /// The size of the volume in GiB.
    pub size: u32,

    /// The performance class of the volume.
    pub speed: VolumeSpeed,

    /// The lifecycle state of the volume.
    pub state: VolumeState,
}

/// Requirements for creating a block volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct VolumeRequest {
    /// The name of the volume.
    #[builder(setter(into))]
    pub name: String,

    /// The size of the volume in GiB.
    pub size: u32,

    /// The performance class of the volume.
    #[builder(default = VolumeSpeed::Hdd)]
    pub speed: VolumeSpeed,
}

/// The attachment of a volume to a VM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    /// The provider-assigned id of the attachment.
    pub id: String,

    /// The name of the attachment.
    pub name: String,

    /// The id of the attached volume.
    #[serde(rename = "volume")]
    pub volume_id: String,

    /// The id of the VM the volume is attached to.
    #[serde(rename = "vm")]
    pub server_id: String,

    /// The OS device path assigned by the backend.
    pub device: String,
}

/// Requirements for attaching a volume to a VM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct VolumeAttachmentRequest {
    /// The name of the attachment.
    #[builder(default, setter(into))]
    pub name: String,

    /// The id of the volume to attach.
    #[serde(rename = "volume")]
    #[builder(setter(into))]
    pub volume_id: String,

    /// The id of the VM to attach the volume to.
    #[serde(rename = "vm")]
    #[builder(setter(into))]
    pub server_id: String,
}

//--------------------------------------------------------------------------------------------------
// Types: Images & Networks
//--------------------------------------------------------------------------------------------------

/// An OS image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// The provider-assigned id of the image.
    pub id: String,

    /// The name of the image.
    pub name: String,
}

/// A virtual network.
///
/// Every network owns exactly one private subnet with the same CIDR and
/// exactly one gateway VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// The provider-assigned id of the network.
    pub id: String,

    /// The name of the network.
    pub name: String,

    /// The network mask in CIDR notation.
    pub cidr: String,

    /// The IP version of the network.
    pub ip_version: IpVersion,

    /// The id of the network's gateway VM.
    pub gateway_id: String,
}

/// Requirements for creating a gatewayed network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct NetworkRequest {
    /// The name of the network.
    #[builder(setter(into))]
    pub name: String,

    /// The network mask in CIDR notation, e.g. `192.168.1.0/24`.
    #[builder(setter(into))]
    pub cidr: String,

    /// The IP version of the network.
    #[builder(default = IpVersion::V4)]
    pub ip_version: IpVersion,

    /// The request describing the gateway VM. Its `network_ids`,
    /// `public_ip` and `is_gateway` fields are overridden by the network
    /// creation flow.
    pub gateway: VmRequest,
}

//--------------------------------------------------------------------------------------------------
// Types: Object Store
//--------------------------------------------------------------------------------------------------

/// An object stored in a container of the backend's object store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct Object {
    /// The name of the object within its container.
    #[builder(setter(into))]
    pub name: String,

    /// The content of the object.
    #[builder(default)]
    pub content: Bytes,

    /// The MIME type of the content.
    #[builder(default, setter(into))]
    pub content_type: String,

    /// The length of the content in bytes.
    #[builder(default)]
    pub content_length: u64,

    /// When the object was written.
    #[builder(default = Utc::now())]
    pub date: DateTime<Utc>,

    /// When the object was last modified.
    #[builder(default = Utc::now())]
    pub last_modified: DateTime<Utc>,

    /// When the object expires, if ever.
    #[builder(default)]
    pub delete_at: Option<DateTime<Utc>>,

    /// User metadata attached to the object.
    #[builder(default)]
    pub metadata: HashMap<String, String>,
}

/// A filter restricting an object listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct ObjectFilter {
    /// Only objects whose name starts with this prefix are listed.
    #[builder(default, setter(into))]
    pub prefix: String,

    /// Only objects under this path are listed.
    #[builder(default, setter(into))]
    pub path: String,
}

/// A range of bytes within an object's content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    /// The first byte of the range, inclusive.
    pub from: Option<u64>,

    /// The last byte of the range, inclusive.
    pub to: Option<u64>,
}

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Reserved metadata key recording when an object was written.
pub const METADATA_DATE_KEY: &str = "__date__";

/// Reserved metadata key recording when an object expires.
pub const METADATA_DELETE_AT_KEY: &str = "__delete_at__";

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Vm {
    /// Resolves the address to reach the VM at: the public IPv4, else the
    /// public IPv6, else the first private IPv4, else the first private
    /// IPv6. `None` when the VM holds no address at all.
    pub fn access_ip(&self) -> Option<&str> {
        if !self.access_ip_v4.is_empty() {
            return Some(&self.access_ip_v4);
        }
        if !self.access_ip_v6.is_empty() {
            return Some(&self.access_ip_v6);
        }
        if let Some(ip) = self.private_ips_v4.first() {
            return Some(ip);
        }
        self.private_ips_v6.first().map(String::as_str)
    }
}

impl SshConfig {
    /// Builds the SSH descriptor for a VM record, with no gateway hop.
    pub fn for_vm(vm: &Vm, host: impl Into<String>) -> SshConfig {
        SshConfig {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: DEFAULT_USER.to_string(),
            private_key: vm.private_key.clone(),
            connection_timeout: DEFAULT_SSH_CONNECTION_TIMEOUT,
            gateway: None,
        }
    }
}

impl Object {
    /// Creates an object holding the given content, content length derived.
    pub fn with_content(name: impl Into<String>, content: impl Into<Bytes>) -> Object {
        let content = content.into();
        Object {
            name: name.into(),
            content_length: content.len() as u64,
            content,
            ..Object::default()
        }
    }

    /// Returns the user metadata augmented with the two reserved keys
    /// injected on every write: `__date__` (now) and `__delete_at__` (the
    /// expiry, epoch zero when unset).
    pub fn stamped_metadata(&self) -> HashMap<String, String> {
        let mut meta = self.metadata.clone();
        meta.insert(METADATA_DATE_KEY.to_string(), Utc::now().to_rfc3339());
        let delete_at = self.delete_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        meta.insert(METADATA_DELETE_AT_KEY.to_string(), delete_at.to_rfc3339());
        meta
    }
}

impl ObjectFilter {
    /// Collapses the filter into a single listing prefix.
    pub fn as_prefix(&self) -> String {
        if self.path.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{}", self.path, self.prefix)
        }
    }
}

impl ByteRange {
    /// Creates a fully-bounded range covering bytes `from..=to`.
    pub fn new(from: u64, to: u64) -> ByteRange {
        ByteRange {
            from: Some(from),
            to: Some(to),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for ByteRange {
    /// Formats the range in HTTP range-spec notation: `a-b`, `a-` or `-b`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.from, self.to) {
            (Some(from), Some(to)) => write!(f, "{}-{}", from, to),
            (Some(from), None) => write!(f, "{}-", from),
            (None, Some(to)) => write!(f, "-{}", to),
            (None, None) => Ok(()),
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm {
            id: String::new(),
            name: String::new(),
            private_ips_v4: Vec::new(),
            private_ips_v6: Vec::new(),
            access_ip_v4: String::new(),
            access_ip_v6: String::new(),
            size: VmSize::default(),
            state: VmState::Stopped,
            private_key: String::new(),
            gateway_id: String::new(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_ip_resolution_order() {
        let mut vm = Vm {
            access_ip_v4: "203.0.113.10".into(),
            access_ip_v6: "2001:db8::a".into(),
            private_ips_v4: vec!["10.0.0.4".into()],
            private_ips_v6: vec!["fd00::4".into()],
            ..Vm::default()
        };
        assert_eq!(vm.access_ip(), Some("203.0.113.10"));

        vm.access_ip_v4.clear();
        assert_eq!(vm.access_ip(), Some("2001:db8::a"));

        vm.access_ip_v6.clear();
        assert_eq!(vm.access_ip(), Some("10.0.0.4"));

        vm.private_ips_v4.clear();
        assert_eq!(vm.access_ip(), Some("fd00::4"));

        vm.private_ips_v6.clear();
        assert_eq!(vm.access_ip(), None);
    }

    #[test]
    fn test_byte_range_display() {
        assert_eq!(ByteRange::new(0, 2).to_string(), "0-2");
        assert_eq!(
            ByteRange {
                from: Some(4),
                to: None
            }
            .to_string(),
            "4-"
        );
        assert_eq!(
            ByteRange {
                from: None,
                to: Some(7)
            }
            .to_string(),
            "-7"
        );
    }

    #[test]
    fn test_stamped_metadata_reserves_keys() {
        let mut obj = Object::with_content("o", "payload");
        obj.metadata.insert("tier".into(), "gold".into());

        let meta = obj.stamped_metadata();
        assert_eq!(meta.get("tier").map(String::as_str), Some("gold"));
        assert!(meta.contains_key(METADATA_DATE_KEY));
        assert_eq!(
            meta.get(METADATA_DELETE_AT_KEY).map(String::as_str),
            Some("1970-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_object_filter_prefix() {
        let filter = ObjectFilter::builder().prefix("vm-").build();
        assert_eq!(filter.as_prefix(), "vm-");

        let filter = ObjectFilter::builder().path("records").prefix("vm-").build();
        assert_eq!(filter.as_prefix(), "records/vm-");
    }

    #[test]
    fn test_vm_serde_field_names() -> anyhow::Result<()> {
        let vm = Vm {
            id: "vm-1".into(),
            name: "web-0".into(),
            state: VmState::Started,
            ..Vm::default()
        };
        let json = serde_json::to_value(&vm)?;
        assert_eq!(json["id"], "vm-1");
        assert_eq!(json["access_ip_v4"], "");
        assert_eq!(json["state"], "STARTED");
        assert!(json.get("private_ips_v4").is_some());
        Ok(())
    }
}
