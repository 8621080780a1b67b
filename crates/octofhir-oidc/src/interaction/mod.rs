//! End-User interaction: deciding when it is needed and resuming the
//! authorization request afterwards.
//!
//! - [`decision`] - ordered checks producing an [`InteractionOutcome`]
//! - [`resume`] - sealed suspension records and session merge

pub mod decision;
pub mod resume;

pub use decision::{CHECKS, Check, CheckContext, InteractionOutcome, decide};
pub use resume::{
    ConsentResult, InteractionResult, LoginResult, ResumeProtocol, SuspensionRecord, merge,
};
