//! Token issuance and lookup.
//!
//! - [`jwt`]: signing keys and compact JWS handling
//! - [`id_token`]: ID token assembly and hash binding
//! - [`subject`]: public and pairwise subject identifiers
//! - [`lookup`]: kind-agnostic lookup, revocation and introspection

pub mod id_token;
pub mod introspection;
pub mod jwt;
pub mod lookup;
pub mod subject;

pub use id_token::{IdToken, hash_binding, hint_audience, validate_hint};
pub use introspection::IntrospectionResponse;
pub use jwt::{Jwk, Jwks, JwtError, JwtService, SigningAlgorithm, SigningKeyPair};
pub use lookup::TokenLookup;
pub use subject::subject_for;
