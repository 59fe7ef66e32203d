//! Datagram framing
//!
//! Layout: one type byte (0x00 request, 0x01 response), a 20-byte
//! message id, then a MessagePack body. Request bodies are
//! `[verb, [args...]]`; response bodies are verb-specific values. A
//! datagram never exceeds 8 KiB; senders refuse to build one that would.

use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::error::KadError;

pub const MSG_ID_LENGTH: usize = 20;
pub const HEADER_LENGTH: usize = MSG_ID_LENGTH + 1;
pub const MAX_DATAGRAM: usize = 8192;

const TYPE_REQUEST: u8 = 0x00;
const TYPE_RESPONSE: u8 = 0x01;

pub type MsgId = [u8; MSG_ID_LENGTH];

/// Fresh correlation id: SHA-1 of 32 random bytes.
pub fn new_msg_id() -> MsgId {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.finalize().into()
}

/// A decoded datagram.
#[derive(Debug)]
pub enum Datagram {
    Request { msg_id: MsgId, verb: String, args: Vec<rmpv::Value> },
    Response { msg_id: MsgId, body: rmpv::Value },
}

fn frame(type_byte: u8, msg_id: &MsgId, body: &rmpv::Value) -> Result<Vec<u8>, KadError> {
    let mut datagram = Vec::with_capacity(HEADER_LENGTH + 128);
    datagram.push(type_byte);
    datagram.extend_from_slice(msg_id);
    rmpv::encode::write_value(&mut datagram, body)
        .map_err(|e| KadError::malformed(format!("unencodable body: {e}")))?;
    if datagram.len() > MAX_DATAGRAM {
        return Err(KadError::malformed(format!(
            "datagram of {} bytes exceeds the {} byte cap",
            datagram.len(),
            MAX_DATAGRAM
        )));
    }
    Ok(datagram)
}

pub fn encode_request(
    msg_id: &MsgId,
    verb: &str,
    args: Vec<rmpv::Value>,
) -> Result<Vec<u8>, KadError> {
    let body = rmpv::Value::Array(vec![
        rmpv::Value::from(verb),
        rmpv::Value::Array(args),
    ]);
    frame(TYPE_REQUEST, msg_id, &body)
}

pub fn encode_response(msg_id: &MsgId, body: &rmpv::Value) -> Result<Vec<u8>, KadError> {
    frame(TYPE_RESPONSE, msg_id, body)
}

pub fn decode(datagram: &[u8]) -> Result<Datagram, KadError> {
    if datagram.len() < HEADER_LENGTH + 1 {
        return Err(KadError::malformed(format!(
            "datagram too small ({} bytes)",
            datagram.len()
        )));
    }
    let mut msg_id = [0u8; MSG_ID_LENGTH];
    msg_id.copy_from_slice(&datagram[1..HEADER_LENGTH]);
    let mut body_bytes = &datagram[HEADER_LENGTH..];
    let body = rmpv::decode::read_value(&mut body_bytes)
        .map_err(|e| KadError::malformed(format!("undecodable body: {e}")))?;

    match datagram[0] {
        TYPE_REQUEST => {
            let items = body
                .as_array()
                .filter(|items| items.len() == 2)
                .ok_or_else(|| KadError::malformed("request body is not [verb, args]"))?;
            let verb = items[0]
                .as_str()
                .ok_or_else(|| KadError::malformed("verb is not a string"))?
                .to_string();
            let args = items[1]
                .as_array()
                .ok_or_else(|| KadError::malformed("args is not an array"))?
                .clone();
            Ok(Datagram::Request { msg_id, verb, args })
        }
        TYPE_RESPONSE => Ok(Datagram::Response { msg_id, body }),
        other => Err(KadError::malformed(format!("unknown message type {other:#04x}"))),
    }
}
