//! Backend realisations of the provider contract.

mod aws;
mod memory;
mod openstack;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use aws::*;
pub use memory::*;
pub use openstack::*;
