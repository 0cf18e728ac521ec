//! The service layer: compound flows and the state-convergence engine.

mod rank;
mod service;
mod similarity;
pub mod wait;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use rank::*;
pub use service::*;
pub use similarity::*;
pub use wait::{wait_vm_gone, wait_vm_state, wait_volume_state};
