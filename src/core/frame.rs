// Length-prefixed request/response frames carried over the device socket.
// Layout: [u32 LE payload length][u8 frame type][payload]
use std::io::{self, Read};

use crate::core::error::{Error, ErrorKind, to_errno};

pub const FRAME_HEADER_LEN: usize = 5;
pub const MAX_PAYLOAD: usize = 4096;

const TYPE_READ: u8 = 0x01;
const TYPE_WRITE: u8 = 0x02;
const TYPE_CONTROL: u8 = 0x03;
const TYPE_DATA: u8 = 0x81;
const TYPE_WRITTEN: u8 = 0x82;
const TYPE_DONE: u8 = 0x83;
const TYPE_FAILURE: u8 = 0xFF;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameHeader {
    pub payload_len: usize,
    pub frame_type: u8,
}

impl FrameHeader {
    pub fn decode(buf: &[u8; FRAME_HEADER_LEN]) -> Result<Self, Error> {
        let payload_len = u32::from_le_bytes(read_4(buf, 0)) as usize;
        if payload_len > MAX_PAYLOAD {
            return Err(Error::new(ErrorKind::Protocol).with_message(format!(
                "frame payload of {payload_len} bytes exceeds {MAX_PAYLOAD}"
            )));
        }
        Ok(Self {
            payload_len,
            frame_type: buf[4],
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Request {
    Read { requested: u32 },
    Write(Vec<u8>),
    Control { opcode: u32, argument: Vec<u8> },
}

impl Request {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Request::Read { requested } => encode_frame(TYPE_READ, &requested.to_le_bytes()),
            Request::Write(bytes) => encode_frame(TYPE_WRITE, bytes),
            Request::Control { opcode, argument } => {
                let mut payload = Vec::with_capacity(4 + argument.len());
                payload.extend_from_slice(&opcode.to_le_bytes());
                payload.extend_from_slice(argument);
                encode_frame(TYPE_CONTROL, &payload)
            }
        }
    }

    pub fn decode(frame_type: u8, payload: &[u8]) -> Result<Self, Error> {
        match frame_type {
            TYPE_READ => {
                let requested = exact_u32(payload, "read request")?;
                Ok(Request::Read { requested })
            }
            TYPE_WRITE => Ok(Request::Write(payload.to_vec())),
            TYPE_CONTROL => {
                if payload.len() < 4 {
                    return Err(Error::new(ErrorKind::Protocol)
                        .with_message("control request is missing its opcode"));
                }
                Ok(Request::Control {
                    opcode: u32::from_le_bytes(read_4(payload, 0)),
                    argument: payload[4..].to_vec(),
                })
            }
            other => Err(Error::new(ErrorKind::Protocol)
                .with_message(format!("unknown request frame type {other:#04x}"))),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// Bytes produced by a read; empty means end of data.
    Data(Vec<u8>),
    Written(u32),
    Done,
    Failure { errno: i32, message: String },
}

impl Response {
    pub fn from_error(err: &Error) -> Self {
        Response::Failure {
            errno: to_errno(err.kind()),
            message: err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{:?}", err.kind())),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Response::Data(bytes) => encode_frame(TYPE_DATA, bytes),
            Response::Written(count) => encode_frame(TYPE_WRITTEN, &count.to_le_bytes()),
            Response::Done => encode_frame(TYPE_DONE, &[]),
            Response::Failure { errno, message } => {
                // Messages are advisory; clip so the frame always fits.
                let mut end = message.len().min(MAX_PAYLOAD - 4);
                while !message.is_char_boundary(end) {
                    end -= 1;
                }
                let mut payload = Vec::with_capacity(4 + end);
                payload.extend_from_slice(&errno.to_le_bytes());
                payload.extend_from_slice(&message.as_bytes()[..end]);
                encode_frame(TYPE_FAILURE, &payload)
            }
        }
    }

    pub fn decode(frame_type: u8, payload: &[u8]) -> Result<Self, Error> {
        match frame_type {
            TYPE_DATA => Ok(Response::Data(payload.to_vec())),
            TYPE_WRITTEN => Ok(Response::Written(exact_u32(payload, "write response")?)),
            TYPE_DONE => Ok(Response::Done),
            TYPE_FAILURE => {
                if payload.len() < 4 {
                    return Err(Error::new(ErrorKind::Protocol)
                        .with_message("failure response is missing its errno"));
                }
                Ok(Response::Failure {
                    errno: i32::from_le_bytes(read_4(payload, 0)),
                    message: String::from_utf8_lossy(&payload[4..]).into_owned(),
                })
            }
            other => Err(Error::new(ErrorKind::Protocol)
                .with_message(format!("unknown response frame type {other:#04x}"))),
        }
    }
}

/// Reads one frame, blocking. Returns the frame type and its payload.
pub fn read_frame(reader: &mut impl Read) -> Result<(u8, Vec<u8>), Error> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).map_err(frame_io_error)?;
    let header = FrameHeader::decode(&header)?;
    let mut payload = vec![0u8; header.payload_len];
    reader.read_exact(&mut payload).map_err(frame_io_error)?;
    Ok((header.frame_type, payload))
}

fn frame_io_error(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        return Error::new(ErrorKind::NotConnected)
            .with_message("device closed the connection")
            .with_source(err);
    }
    Error::new(ErrorKind::Io)
        .with_message("failed to read frame")
        .with_source(err)
}

fn encode_frame(frame_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.push(frame_type);
    buf.extend_from_slice(payload);
    buf
}

fn exact_u32(payload: &[u8], what: &str) -> Result<u32, Error> {
    if payload.len() != 4 {
        return Err(Error::new(ErrorKind::Protocol)
            .with_message(format!("{what} payload must be 4 bytes, got {}", payload.len())));
    }
    Ok(u32::from_le_bytes(read_4(payload, 0)))
}

fn read_4(buf: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    out
}
