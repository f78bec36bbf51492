//! Purpose: Publish a device endpoint as a Unix domain socket.
//! Exports: `SocketHost`, `SocketRegistration`.
//! Role: `EndpointHost` used by the daemon; one task per accepted connection.
//! Invariants: The socket path exists exactly while the endpoint is published.
//! Invariants: A request that has been read is always answered before shutdown closes its connection.
//! Invariants: The stack lock is never held across an await.
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::device::{Endpoint, EndpointHost};
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{FRAME_HEADER_LEN, FrameHeader, Request, Response};

pub struct SocketHost {
    path: PathBuf,
    runtime: Handle,
}

impl SocketHost {
    pub fn new(path: impl Into<PathBuf>, runtime: Handle) -> Self {
        Self {
            path: path.into(),
            runtime,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Live publication of a socket; dropping it stops the listener and removes the path.
pub struct SocketRegistration {
    path: PathBuf,
    shutdown: watch::Sender<bool>,
}

impl EndpointHost for SocketHost {
    type Registration = SocketRegistration;

    fn publish(&self, endpoint: Endpoint) -> Result<SocketRegistration, Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to create device directory")
                    .with_path(parent)
                    .with_source(err)
            })?;
        }
        remove_stale_socket(&self.path)?;

        let listener = {
            let _guard = self.runtime.enter();
            UnixListener::bind(&self.path).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to bind device socket")
                    .with_path(&self.path)
                    .with_source(err)
            })?
        };

        let (shutdown, stopped) = watch::channel(false);
        self.runtime.spawn(accept_loop(listener, endpoint, stopped));
        info!(path = %self.path.display(), "device socket published");
        Ok(SocketRegistration {
            path: self.path.clone(),
            shutdown,
        })
    }

    fn withdraw(&self, registration: SocketRegistration) {
        drop(registration);
    }
}

impl Drop for SocketRegistration {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "device socket removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove device socket"
            ),
        }
    }
}

fn remove_stale_socket(path: &Path) -> Result<(), Error> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(Error::new(ErrorKind::Io)
                .with_message("failed to inspect device path")
                .with_path(path)
                .with_source(err));
        }
    };
    if !meta.file_type().is_socket() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("device path exists and is not a socket")
            .with_path(path)
            .with_hint("Remove the file or pass a different --device path."));
    }
    debug!(path = %path.display(), "removing stale device socket");
    std::fs::remove_file(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to remove stale device socket")
            .with_path(path)
            .with_source(err)
    })
}

async fn accept_loop(
    listener: UnixListener,
    endpoint: Endpoint,
    mut stopped: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    debug!("device opened");
                    tokio::spawn(serve_connection(stream, endpoint.clone(), stopped.clone()));
                }
                Err(err) => warn!(error = %err, "failed to accept device connection"),
            },
            _ = stopped.changed() => break,
        }
    }
    debug!("device accept loop stopped");
}

async fn serve_connection(
    mut stream: UnixStream,
    endpoint: Endpoint,
    mut stopped: watch::Receiver<bool>,
) {
    loop {
        if *stopped.borrow() {
            break;
        }
        let request = tokio::select! {
            request = read_request(&mut stream) => request,
            _ = stopped.changed() => break,
        };
        let response = match request {
            Ok(Some(request)) => dispatch(&endpoint, request),
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "dropping device connection");
                let _ = stream.write_all(&Response::from_error(&err).encode()).await;
                break;
            }
        };
        if let Err(err) = stream.write_all(&response.encode()).await {
            warn!(error = %err, "failed to answer device request");
            break;
        }
    }
    debug!("device closed");
}

async fn read_request(stream: &mut UnixStream) -> Result<Option<Request>, Error> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => {
            return Err(Error::new(ErrorKind::Io)
                .with_message("failed to read request header")
                .with_source(err));
        }
    }
    let header = FrameHeader::decode(&header)?;
    let mut payload = vec![0u8; header.payload_len];
    stream.read_exact(&mut payload).await.map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read request payload")
            .with_source(err)
    })?;
    Request::decode(header.frame_type, &payload).map(Some)
}

fn dispatch(endpoint: &Endpoint, request: Request) -> Response {
    let result = match request {
        Request::Read { requested } => endpoint.read(requested as usize).map(Response::Data),
        Request::Write(bytes) => endpoint
            .write(&bytes)
            .map(|count| Response::Written(count as u32)),
        Request::Control { opcode, argument } => {
            endpoint.control(opcode, &argument).map(|()| Response::Done)
        }
    };
    result.unwrap_or_else(|err| {
        debug!(error = %err, "device request failed");
        Response::from_error(&err)
    })
}
