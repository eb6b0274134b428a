//! Thin wrapper over the off-the-shelf OSC wire format.
//!
//! The bit-level encoding is explicitly out of scope for this daemon; this
//! module only adapts `rosc` to the shapes the rest of the code needs: build
//! a message with an address and zero-or-one typed argument, and decode one
//! back out of a received datagram.

use rosc::{OscMessage, OscPacket, OscType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OscCodecError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("packet was a bundle, not a message")]
    NotAMessage,
}

/// Builds an OSC message with no arguments.
pub fn encode_empty(address: &str) -> Result<Vec<u8>, OscCodecError> {
    encode_args(address, vec![])
}

/// Builds an OSC message carrying a single string argument (the common case:
/// a JSON-encoded payload, a passcode, or a plain string).
pub fn encode_string(address: &str, arg: impl Into<String>) -> Result<Vec<u8>, OscCodecError> {
    encode_args(address, vec![OscType::String(arg.into())])
}

/// Builds an OSC message carrying a single integer argument (port numbers).
pub fn encode_int(address: &str, arg: i32) -> Result<Vec<u8>, OscCodecError> {
    encode_args(address, vec![OscType::Int(arg)])
}

pub fn encode_args(address: &str, args: Vec<OscType>) -> Result<Vec<u8>, OscCodecError> {
    let packet = OscPacket::Message(OscMessage {
        addr: address.to_owned(),
        args,
    });
    rosc::encoder::encode(&packet).map_err(|e| OscCodecError::Encode(format!("{e:?}")))
}

/// Decodes a single inbound datagram into `(address, args)`.
///
/// Bundles are rejected — the remote protocol never sends them to us.
pub fn decode_message(bytes: &[u8]) -> Result<(String, Vec<OscType>), OscCodecError> {
    let (_, packet) =
        rosc::decoder::decode_udp(bytes).map_err(|e| OscCodecError::Decode(format!("{e:?}")))?;
    match packet {
        OscPacket::Message(msg) => Ok((msg.addr, msg.args)),
        OscPacket::Bundle(_) => Err(OscCodecError::NotAMessage),
    }
}

/// Extracts the sole string argument of a decoded message, if that's what it is.
pub fn single_string_arg(args: &[OscType]) -> Option<&str> {
    match args {
        [OscType::String(s)] => Some(s.as_str()),
        _ => None,
    }
}
