//! In-memory storage backends for the OctoFHIR OpenID Connect provider.
//!
//! Every storage contract of `octofhir-oidc` backed by `dashmap`, with
//! expiry enforced on read. Suitable for tests, demos and single-node
//! deployments that can afford to lose state on restart.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use octofhir_oidc::{Provider, ProviderConfig};
//! use octofhir_oidc_memory::*;
//!
//! let provider = Provider::builder(ProviderConfig::with_issuer("https://op.example.com"))
//!     .token_stores(token_store)
//!     .session_store(Arc::new(InMemorySessionStore::new()))
//!     .client_registry(Arc::new(InMemoryClientRegistry::new()))
//!     .account_store(Arc::new(InMemoryAccountStore::new()))
//!     .suspension_transport(Arc::new(InMemoryTransport::new()))
//!     .build()?;
//! ```

mod expiring;
pub mod registry;
pub mod sessions;
pub mod tokens;
pub mod transport;

pub use registry::{InMemoryAccountStore, InMemoryClientRegistry};
pub use sessions::InMemorySessionStore;
pub use tokens::{InMemoryTokenStore, token_store};
pub use transport::InMemoryTransport;
