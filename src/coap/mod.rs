//! CoAP transport: message codec, UDP server loop and a small client.

pub mod client;
pub mod message;
pub mod server;

pub use client::{CoapClient, Response};
pub use message::{Code, CodecError, Message, MessageType};
pub use server::CoapServer;

/// IANA-assigned CoAP port.
pub const DEFAULT_PORT: u16 = 5683;
