//! Plain data shared by every `envb-*` crate.
//!
//! Nothing in here performs I/O: identities of a build attempt, lifecycle statuses,
//! the label contract applied to produced artifacts, environment properties as they
//! are stored on disk and the classification of raw build output lines.
mod domain;
pub use domain::*;
