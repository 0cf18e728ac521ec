//! Lifecycle enumerations shared by every backend realisation.

use std::{fmt, net::IpAddr, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::StratusError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The lifecycle state of a virtual machine.
///
/// Transitions: `Starting → Started`, `Started → Stopping → Stopped`,
/// `Stopped → Starting → Started`, and any state may degrade to `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VmState {
    /// The VM is provisioned but not running.
    Stopped,

    /// The VM is booting.
    Starting,

    /// The VM is running.
    Started,

    /// The VM is shutting down.
    Stopping,

    /// The VM is in an unrecoverable error state.
    Error,
}

/// The lifecycle state of a block volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeState {
    /// The volume is being allocated.
    Creating,

    /// The volume exists and is not attached.
    Available,

    /// The volume is being attached to a VM.
    Attaching,

    /// The volume is being detached from a VM.
    Detaching,

    /// The volume is attached to a VM.
    Used,

    /// The volume is being deleted.
    Deleting,

    /// The volume is in an error state.
    Error,

    /// A backend state that has no uniform equivalent.
    Other,
}

/// The performance class of a block volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeSpeed {
    /// Archival or throughput-optimized cold storage.
    Cold,

    /// Spinning-disk class storage.
    Hdd,

    /// Flash class storage.
    Ssd,
}

/// The IP protocol version of a network or address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpVersion {
    /// IPv4.
    #[serde(rename = "IPv4")]
    V4,

    /// IPv6.
    #[serde(rename = "IPv6")]
    V6,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl IpVersion {
    /// Classifies an address literal by family, or `None` when it does not
    /// parse as an IP address.
    pub fn of(addr: &str) -> Option<IpVersion> {
        match addr.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => Some(IpVersion::V4),
            Ok(IpAddr::V6(_)) => Some(IpVersion::V6),
            Err(_) => None,
        }
    }

    /// Returns true if `addr` belongs to this address family.
    pub fn is(&self, addr: &str) -> bool {
        IpVersion::of(addr) == Some(*self)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VmState::Stopped => "STOPPED",
            VmState::Starting => "STARTING",
            VmState::Started => "STARTED",
            VmState::Stopping => "STOPPING",
            VmState::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolumeState::Creating => "CREATING",
            VolumeState::Available => "AVAILABLE",
            VolumeState::Attaching => "ATTACHING",
            VolumeState::Detaching => "DETACHING",
            VolumeState::Used => "USED",
            VolumeState::Deleting => "DELETING",
            VolumeState::Error => "ERROR",
            VolumeState::Other => "OTHER",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for VolumeSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolumeSpeed::Cold => "COLD",
            VolumeSpeed::Hdd => "HDD",
            VolumeSpeed::Ssd => "SSD",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for VolumeSpeed {
    type Err = StratusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COLD" => Ok(VolumeSpeed::Cold),
            "HDD" => Ok(VolumeSpeed::Hdd),
            "SSD" => Ok(VolumeSpeed::Ssd),
            other => Err(StratusError::InvalidArgument(format!(
                "unknown volume speed: {}",
                other
            ))),
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
    fn test_ip_version_classification() {
        assert_eq!(IpVersion::of("192.168.1.1"), Some(IpVersion::V4));
        assert_eq!(IpVersion::of("2001:db8::1"), Some(IpVersion::V6));
        assert_eq!(IpVersion::of("not-an-address"), None);

        assert!(IpVersion::V4.is("10.0.0.1"));
        assert!(!IpVersion::V4.is("2001:db8::1"));
        assert!(IpVersion::V6.is("::1"));
    }

    #[test]
    fn test_state_serde_round_trip() -> anyhow::Result<()> {
        let json = serde_json::to_string(&VmState::Started)?;
        assert_eq!(json, "\"STARTED\"");
        let state: VmState = serde_json::from_str(&json)?;
        assert_eq!(state, VmState::Started);

        let json = serde_json::to_string(&VolumeState::Available)?;
        assert_eq!(json, "\"AVAILABLE\"");

        let json = serde_json::to_string(&IpVersion::V4)?;
        assert_eq!(json, "\"IPv4\"");

        Ok(())
    }

    #[test]
    fn test_volume_speed_from_str() {
        assert_eq!("SSD".parse::<VolumeSpeed>().unwrap(), VolumeSpeed::Ssd);
        assert!("NVME".parse::<VolumeSpeed>().is_err());
    }
}
