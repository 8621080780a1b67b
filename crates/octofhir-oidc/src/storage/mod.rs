//! Storage contracts.
//!
//! The provider never persists anything directly. Backends implement these
//! traits; `octofhir-oidc-memory` ships in-memory versions of all of them.

pub mod account;
pub mod client;
pub mod session;
pub mod token;
pub mod transport;

pub use account::AccountStore;
pub use client::ClientRegistry;
pub use session::SessionStore;
pub use token::{TokenStore, TokenStores};
pub use transport::SuspensionTransport;
