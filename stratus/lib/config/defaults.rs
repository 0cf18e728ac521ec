//! Fixed constants shared by every backend realisation.

use std::time::Duration;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The default login user created on every VM.
pub const DEFAULT_USER: &str = "gpac";

/// The TCP port of the SSH service on provisioned VMs.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// How long SSH descriptors wait for the TCP connection.
pub const DEFAULT_SSH_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a VM creation waits for the instance to reach `STARTED`.
pub const VM_CREATION_TIMEOUT: Duration = Duration::from_secs(120);

/// The fixed delay between two state probes of a convergence wait.
pub const STATE_PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// The poll interval used while waiting for a deleted resource to stop
/// resolving.
pub const DELETION_PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Reserved side-channel container mapping network ids to gateway VM ids.
pub const NETWORK_GATEWAYS_CONTAINER: &str = "__network_gws__";

/// Reserved side-channel container holding serialized VM records.
pub const VMS_CONTAINER: &str = "__vms__";
