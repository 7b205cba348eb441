//! Shared domain types for the voice turn-controller workspace: the
//! error taxonomy, chat message model, streaming primitives, and the
//! layered configuration tree. No I/O lives here — every other
//! `voice-*` crate depends on this one.

pub mod cancel;
pub mod config;
pub mod error;
pub mod message;
pub mod stream;

pub use cancel::CancelToken;
pub use config::Config;
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use stream::{BoxStream, Usage};
