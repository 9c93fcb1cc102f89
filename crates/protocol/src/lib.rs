//! Wire types for the bridge method channel.
//!
//! This crate contains the serde-serializable types exchanged between the
//! native host and the remote runtime over a single method channel:
//!
//! - [`Frame`]: the envelope for calls and their replies
//! - [`methods`]: names of the protocol calls the bridge reserves for itself
//! - [`args`]: argument records carried by those protocol calls
//!
//! Types in this crate are pure data. Correlation, dispatch and stream
//! lifecycles live in `bridge-runtime`.

pub mod args;
pub mod frame;
pub mod methods;

pub use args::*;
pub use frame::{CallId, Frame};
