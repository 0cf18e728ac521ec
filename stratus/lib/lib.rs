//! `stratus` is a multi-cloud infrastructure provisioning library.
//!
//! # Overview
//!
//! stratus exposes one uniform [`api::Provider`] contract for provisioning
//! and lifecycle management of cloud compute, storage, network, key-material
//! and object-store resources, implemented against multiple backends. On top
//! of the contract, [`service::Service`] orchestrates the compound flows:
//! gatewayed-network creation, template selection under sizing constraints,
//! fuzzy image matching and bounded state convergence.
//!
//! # Architecture
//!
//! - **api**: the provider contract — value types, entity records and the
//!   operation set every backend honours identically.
//! - **service**: the facade composing primitive operations, plus the
//!   state-convergence engine.
//! - **metadata**: the side-channel persisting facts a backend's native
//!   resource model cannot carry, as objects in reserved containers of its
//!   own object store.
//! - **userdata**: the cloud-init-style boot script rendered per VM.
//! - **providers**: the backend realisations — an OpenStack-family client
//!   (layer-3 networking, floating IPs), an AWS-family client (route-table
//!   networking, elastic IPs) and an in-process memory backend for tests
//!   and simulation.
//!
//! # Usage Example
//!
//! ```
//! use stratus::{
//!     api::{NetworkRequest, Provider, VmRequest},
//!     providers::MemoryProvider,
//!     service::Service,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let service = Service::new(MemoryProvider::new());
//!
//! let image = service.search_image("Ubuntu 18.04").await?;
//! let network = service
//!     .create_network(
//!         NetworkRequest::builder()
//!             .name("lab")
//!             .cidr("192.168.1.0/24")
//!             .gateway(
//!                 VmRequest::builder()
//!                     .name("gw-lab")
//!                     .template_id("tpl-small")
//!                     .image_id(image.id)
//!                     .build(),
//!             )
//!             .build(),
//!     )
//!     .await?;
//!
//! let ssh = service.get_ssh_config(&network.gateway_id).await?;
//! assert!(!ssh.host.is_empty());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod api;
pub mod config;
pub mod metadata;
pub mod providers;
pub mod service;
pub mod userdata;
pub mod utils;

pub use error::*;
