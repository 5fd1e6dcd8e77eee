//! Host application boundary: inbound method calls and outbound events, both JSON encoded.

pub mod event;
pub mod method;

pub use event::*;
pub use method::*;
