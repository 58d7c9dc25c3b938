//! CoAP message codec (RFC 7252 §3).
//!
//! ```text
//!  0                   1                   2                   3
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! |   Token (if any, TKL bytes) ...
//! |   Options (if any) ...
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! ```

use crate::dispatch::Method;
use std::fmt;
use thiserror::Error;

pub const VERSION: u8 = 1;
pub const PAYLOAD_MARKER: u8 = 0xFF;
pub const MAX_TOKEN_LEN: usize = 8;
const HEADER_LEN: usize = 4;

/// Option numbers used by the service.
pub mod option {
    pub const URI_PATH: u16 = 11;
    pub const CONTENT_FORMAT: u16 = 12;
}

/// `text/plain; charset=utf-8`.
pub const TEXT_PLAIN: u16 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("datagram truncated")]
    Truncated,
    #[error("unsupported CoAP version {0}")]
    UnsupportedVersion(u8),
    #[error("token length {0} exceeds 8 bytes")]
    TokenTooLong(usize),
    #[error("reserved option nibble 15")]
    ReservedNibble,
    #[error("option number overflow")]
    OptionOverflow,
    #[error("option value too long ({0} bytes)")]
    OptionTooLong(usize),
    #[error("payload marker followed by empty payload")]
    EmptyPayload,
    #[error("empty message carries token, options or payload")]
    NonEmptyEmptyMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Confirmable => 0,
            Self::NonConfirmable => 1,
            Self::Acknowledgement => 2,
            Self::Reset => 3,
        }
    }
}

/// Method or response code, `class.detail` packed as `ccc ddddd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code(pub u8);

impl Code {
    pub const EMPTY: Code = Code::new(0, 0);
    pub const GET: Code = Code::new(0, 1);
    pub const POST: Code = Code::new(0, 2);
    pub const PUT: Code = Code::new(0, 3);
    pub const DELETE: Code = Code::new(0, 4);
    pub const CONTENT: Code = Code::new(2, 5);
    pub const NOT_FOUND: Code = Code::new(4, 4);
    pub const METHOD_NOT_ALLOWED: Code = Code::new(4, 5);

    pub const fn new(class: u8, detail: u8) -> Self {
        Self((class << 5) | (detail & 0x1f))
    }

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(self) -> u8 {
        self.0 & 0x1f
    }

    pub fn is_request(self) -> bool {
        self.class() == 0 && self != Self::EMPTY
    }

    pub fn method(self) -> Option<Method> {
        match self {
            Self::GET => Some(Method::Get),
            Self::POST => Some(Method::Post),
            Self::PUT => Some(Method::Put),
            Self::DELETE => Some(Method::Delete),
            _ => None,
        }
    }

    pub fn from_method(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub mtype: MessageType,
    pub code: Code,
    pub message_id: u16,
    pub token: Vec<u8>,
    /// Sorted by option number.
    pub options: Vec<CoapOption>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(mtype: MessageType, code: Code, message_id: u16) -> Self {
        Self {
            mtype,
            code,
            message_id,
            token: Vec::new(),
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Request for `path`, one Uri-Path option per non-empty segment.
    pub fn request(
        mtype: MessageType,
        method: Method,
        message_id: u16,
        token: Vec<u8>,
        path: &str,
        payload: Vec<u8>,
    ) -> Self {
        let mut msg = Self::new(mtype, Code::from_method(method), message_id);
        msg.token = token;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            msg.add_option(option::URI_PATH, segment.as_bytes().to_vec());
        }
        msg.payload = payload;
        msg
    }

    /// Text reply to `request`: piggybacked ACK for a confirmable request,
    /// otherwise a non-confirmable message carrying `fresh_id`.
    pub fn response_to(request: &Message, code: Code, payload: Vec<u8>, fresh_id: u16) -> Self {
        let (mtype, message_id) = match request.mtype {
            MessageType::Confirmable => (MessageType::Acknowledgement, request.message_id),
            _ => (MessageType::NonConfirmable, fresh_id),
        };
        let mut msg = Self::new(mtype, code, message_id);
        msg.token = request.token.clone();
        if !payload.is_empty() {
            msg.add_option(option::CONTENT_FORMAT, encode_uint(TEXT_PLAIN));
        }
        msg.payload = payload;
        msg
    }

    /// Empty ACK (0.00) for a confirmable message.
    pub fn empty_ack(message_id: u16) -> Self {
        Self::new(MessageType::Acknowledgement, Code::EMPTY, message_id)
    }

    /// RST for a message the endpoint cannot or will not process.
    pub fn reset(message_id: u16) -> Self {
        Self::new(MessageType::Reset, Code::EMPTY, message_id)
    }

    /// Insert an option, keeping the list ordered by number. Repeated
    /// options keep their insertion order.
    pub fn add_option(&mut self, number: u16, value: Vec<u8>) {
        let at = self.options.partition_point(|o| o.number <= number);
        self.options.insert(at, CoapOption { number, value });
    }

    pub fn option_values(&self, number: u16) -> impl Iterator<Item = &[u8]> {
        self.options
            .iter()
            .filter(move |o| o.number == number)
            .map(|o| o.value.as_slice())
    }

    /// Uri-Path segments joined with `/`.
    pub fn uri_path(&self) -> String {
        self.option_values(option::URI_PATH)
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(CodecError::TokenTooLong(self.token.len()));
        }

        let mut out = Vec::with_capacity(HEADER_LEN + self.token.len() + self.payload.len() + 16);
        // token.len() <= 8 fits in the 4-bit TKL field
        out.push((VERSION << 6) | (self.mtype.bits() << 4) | self.token.len() as u8);
        out.push(self.code.0);
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token);

        let mut previous = 0u16;
        for opt in &self.options {
            let delta = opt
                .number
                .checked_sub(previous)
                .ok_or(CodecError::OptionOverflow)?;
            let (delta_nibble, delta_ext) = split_extended(u32::from(delta))?;
            let len = u32::try_from(opt.value.len())
                .map_err(|_| CodecError::OptionTooLong(opt.value.len()))?;
            let (len_nibble, len_ext) = split_extended(len)
                .map_err(|_| CodecError::OptionTooLong(opt.value.len()))?;

            out.push((delta_nibble << 4) | len_nibble);
            out.extend_from_slice(&delta_ext);
            out.extend_from_slice(&len_ext);
            out.extend_from_slice(&opt.value);
            previous = opt.number;
        }

        if !self.payload.is_empty() {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Truncated);
        }
        let version = bytes[0] >> 6;
        if version != VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let mtype = MessageType::from_bits(bytes[0] >> 4);
        let token_len = usize::from(bytes[0] & 0x0f);
        if token_len > MAX_TOKEN_LEN {
            return Err(CodecError::TokenTooLong(token_len));
        }
        let code = Code(bytes[1]);
        let message_id = u16::from_be_bytes([bytes[2], bytes[3]]);

        if code == Code::EMPTY {
            if bytes.len() != HEADER_LEN || token_len != 0 {
                return Err(CodecError::NonEmptyEmptyMessage);
            }
            return Ok(Self::new(mtype, code, message_id));
        }

        let mut pos = HEADER_LEN;
        let token = bytes
            .get(pos..pos + token_len)
            .ok_or(CodecError::Truncated)?
            .to_vec();
        pos += token_len;

        let mut options = Vec::new();
        let mut payload = Vec::new();
        let mut number = 0u16;
        while pos < bytes.len() {
            let head = bytes[pos];
            pos += 1;
            if head == PAYLOAD_MARKER {
                if pos == bytes.len() {
                    return Err(CodecError::EmptyPayload);
                }
                payload = bytes[pos..].to_vec();
                break;
            }

            let delta = read_extended(head >> 4, bytes, &mut pos)?;
            let len = read_extended(head & 0x0f, bytes, &mut pos)? as usize;
            let delta = u16::try_from(delta).map_err(|_| CodecError::OptionOverflow)?;
            number = number.checked_add(delta).ok_or(CodecError::OptionOverflow)?;

            let value = bytes.get(pos..pos + len).ok_or(CodecError::Truncated)?;
            pos += len;
            options.push(CoapOption {
                number,
                value: value.to_vec(),
            });
        }

        Ok(Self {
            mtype,
            code,
            message_id,
            token,
            options,
            payload,
        })
    }
}

/// Minimal big-endian encoding of an unsigned option value (0 is empty).
pub fn encode_uint(value: u16) -> Vec<u8> {
    match value {
        0 => Vec::new(),
        1..=0xff => vec![value as u8],
        _ => value.to_be_bytes().to_vec(),
    }
}

/// Nibble plus extended bytes for an option delta or length.
fn split_extended(value: u32) -> Result<(u8, Vec<u8>), CodecError> {
    match value {
        0..=12 => Ok((value as u8, Vec::new())),
        13..=268 => Ok((13, vec![(value - 13) as u8])),
        269..=65_804 => Ok((14, ((value - 269) as u16).to_be_bytes().to_vec())),
        _ => Err(CodecError::OptionOverflow),
    }
}

fn read_extended(nibble: u8, bytes: &[u8], pos: &mut usize) -> Result<u32, CodecError> {
    match nibble {
        0..=12 => Ok(u32::from(nibble)),
        13 => {
            let b = *bytes.get(*pos).ok_or(CodecError::Truncated)?;
            *pos += 1;
            Ok(u32::from(b) + 13)
        }
        14 => {
            let raw = bytes.get(*pos..*pos + 2).ok_or(CodecError::Truncated)?;
            *pos += 2;
            Ok(u32::from(u16::from_be_bytes([raw[0], raw[1]])) + 269)
        }
        _ => Err(CodecError::ReservedNibble),
    }
}
