//! Purpose: Blocking client for a published device socket.
//! Exports: `DeviceClient`.
//! Role: What the CLI and integration tests use to talk to a running device.
//! Invariants: One request is in flight per connection; responses arrive in order.
//! Invariants: Device failures decode back to the `ErrorKind` that produced them.
#![allow(clippy::result_large_err)]

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use crate::core::device::{ELEMENT_SIZE, SET_SIZE};
use crate::core::error::{Error, ErrorKind, from_errno};
use crate::core::frame::{MAX_PAYLOAD, Request, Response, read_frame};
use crate::core::stack::Pop;
use crate::device_paths::device_present;

pub type ApiResult<T> = Result<T, Error>;

#[derive(Debug)]
pub struct DeviceClient {
    path: PathBuf,
    stream: UnixStream,
}

impl DeviceClient {
    pub fn open(path: impl AsRef<Path>) -> ApiResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !device_present(&path) {
            return Err(not_attached(&path));
        }
        let stream = UnixStream::connect(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                not_attached(&path).with_source(err)
            }
            _ => Error::new(ErrorKind::Io)
                .with_message("failed to open device")
                .with_path(&path)
                .with_source(err),
        })?;
        Ok(Self { path, stream })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw read; an empty result means the stack is empty.
    pub fn read(&mut self, requested: usize) -> ApiResult<Vec<u8>> {
        let requested = u32::try_from(requested).map_err(|err| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message("read size does not fit in a request")
                .with_source(err)
        })?;
        match self.roundtrip(&Request::Read { requested })? {
            Response::Data(bytes) => Ok(bytes),
            other => Err(unexpected(&other)),
        }
    }

    /// Raw write; returns the number of bytes the device accepted.
    pub fn write(&mut self, bytes: &[u8]) -> ApiResult<usize> {
        if bytes.len() > MAX_PAYLOAD {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("write of {} bytes exceeds {MAX_PAYLOAD}", bytes.len())));
        }
        match self.roundtrip(&Request::Write(bytes.to_vec()))? {
            Response::Written(count) => Ok(count as usize),
            other => Err(unexpected(&other)),
        }
    }

    pub fn control(&mut self, opcode: u32, argument: &[u8]) -> ApiResult<()> {
        if argument.len() > MAX_PAYLOAD - 4 {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message("control argument is too large"));
        }
        let request = Request::Control {
            opcode,
            argument: argument.to_vec(),
        };
        match self.roundtrip(&request)? {
            Response::Done => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    pub fn set_size(&mut self, size: i32) -> ApiResult<()> {
        self.control(SET_SIZE, &size.to_ne_bytes())
    }

    pub fn push(&mut self, value: i32) -> ApiResult<()> {
        self.write(&value.to_ne_bytes()).map(|_| ())
    }

    pub fn pop(&mut self) -> ApiResult<Pop> {
        let bytes = self.read(ELEMENT_SIZE)?;
        if bytes.is_empty() {
            return Ok(Pop::Empty);
        }
        let raw: [u8; ELEMENT_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            Error::new(ErrorKind::Protocol)
                .with_message(format!("device returned {} bytes for one element", bytes.len()))
        })?;
        Ok(Pop::Value(i32::from_ne_bytes(raw)))
    }

    /// Pops until the device reports end of data, top first.
    pub fn unwind(&mut self) -> ApiResult<Vec<i32>> {
        let mut values = Vec::new();
        while let Pop::Value(value) = self.pop()? {
            values.push(value);
        }
        Ok(values)
    }

    fn roundtrip(&mut self, request: &Request) -> ApiResult<Response> {
        self.stream.write_all(&request.encode()).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to send request")
                .with_path(&self.path)
                .with_source(err)
        })?;
        let (frame_type, payload) =
            read_frame(&mut self.stream).map_err(|err| err.with_path(&self.path))?;
        match Response::decode(frame_type, &payload)? {
            Response::Failure { errno, message } => Err(Error::new(from_errno(errno))
                .with_message(message)
                .with_path(&self.path)),
            response => Ok(response),
        }
    }
}

fn not_attached(path: &Path) -> Error {
    Error::new(ErrorKind::NotConnected)
        .with_message("device is not attached")
        .with_path(path)
        .with_hint(
            "Is the device attached? Run `intstack serve --attached` or send SIGUSR1 to the daemon.",
        )
}

fn unexpected(response: &Response) -> Error {
    Error::new(ErrorKind::Protocol).with_message(format!("unexpected response {response:?}"))
}
