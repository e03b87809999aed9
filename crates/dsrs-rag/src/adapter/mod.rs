//! Prompt formatting and response parsing for generation steps.
//!
//! The [`ChatAdapter`] renders a [`SignatureSchema`](crate::SignatureSchema),
//! its demonstrations and the current inputs into a [`Chat`](crate::Chat), and
//! extracts the output fields from the LM's reply by their `[[ ## name ## ]]`
//! markers.

pub mod chat;

pub use chat::*;
