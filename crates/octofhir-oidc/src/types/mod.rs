//! Domain types shared across the provider.

pub mod account;
pub mod claims;
pub mod client;
pub mod session;
pub mod token;

pub use account::Account;
pub use claims::{ClaimRequest, ClaimsMask, ClaimsRequest};
pub use client::{Client, GrantType, SubjectType, TokenEndpointAuthMethod};
pub use session::{LogoutState, Session};
pub use token::{CodeBinding, Token, TokenKind, generate_token};
