//! Core types for rheo.

pub mod message;
pub mod stream;
pub mod tool_call;
pub mod usage;

pub use message::*;
pub use stream::*;
pub use tool_call::*;
pub use usage::*;
