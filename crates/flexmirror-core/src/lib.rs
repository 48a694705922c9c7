//! flexmirror-core: error and identifier types for flexmirror.
//!
//! The engine, transport and test-harness crates all share these types so
//! that applications can name entities and match on errors without pulling
//! in the protocol implementation.
//!
//! # Key types
//!
//! - [`EntityKind`] / [`EntityKey`] -- what a mirrored object is and its id
//! - [`AckState`] -- the forward-only entity lifecycle
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{AckState, EntityKey, EntityKind, StreamShape};
