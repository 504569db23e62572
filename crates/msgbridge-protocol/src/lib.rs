//! Wire-side types for the msgbridge bot protocol adapter.
//!
//! Everything in this crate is what a wire client sees: compact 32-bit-safe
//! message ids, flat segment lists, and the action response envelope. Native
//! chat-source identifiers never appear here except as opaque long-form refs.

pub mod ids;
pub mod messages;
pub mod response;

pub use ids::{MessageRef, WireId};
pub use messages::{
    MessageType, ParseMessageTypeError, Segment, WireMessage, WireSender, render_raw,
};
pub use response::{ActionResponse, ActionStatus};
