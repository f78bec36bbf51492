//! Purpose: Expose a `StackStore` as a byte-oriented device gated by hotplug events.
//! Exports: `Endpoint`, `EndpointHost`, `DetachedHost`, `HotplugHandler`, `InterfaceController`.
//! Role: The only path from external callers to stack data.
//! Invariants: Attach/detach never allocate, replace, or clear the store.
//! Invariants: Reads and writes move exactly one native-endian `i32` (4 bytes).
//! Invariants: `SET_SIZE` is the only recognised control opcode.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::core::error::{Error, ErrorKind};
use crate::core::stack::{Pop, StackStore};

pub const ELEMENT_SIZE: usize = size_of::<i32>();

/// `_IOW('s', 1, int)`: the "set size" control request.
pub const SET_SIZE: u32 = ioc_write(b's', 1, ELEMENT_SIZE);

const fn ioc_write(group: u8, number: u8, size: usize) -> u32 {
    const IOC_WRITE: u32 = 1;
    (IOC_WRITE << 30) | ((size as u32) << 16) | ((group as u32) << 8) | number as u32
}

/// Handle bound to the one store; cloning it is cheap.
///
/// An endpoint stays usable after its controller detaches, so calls already in
/// flight always run to completion.
#[derive(Clone, Debug)]
pub struct Endpoint {
    store: Arc<StackStore>,
}

impl Endpoint {
    pub fn new(store: Arc<StackStore>) -> Self {
        Self { store }
    }

    /// Pops one element. An empty result means end of data (empty stack).
    pub fn read(&self, requested: usize) -> Result<Vec<u8>, Error> {
        if requested != ELEMENT_SIZE {
            return Err(Error::new(ErrorKind::InvalidArgument).with_message(format!(
                "read must request exactly {ELEMENT_SIZE} bytes, got {requested}"
            )));
        }
        match self.store.pop() {
            Pop::Value(value) => Ok(value.to_ne_bytes().to_vec()),
            Pop::Empty => Ok(Vec::new()),
        }
    }

    /// Pushes one element and returns the number of bytes accepted.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, Error> {
        let value = decode_element(bytes, "write")?;
        self.store.push(value)?;
        Ok(ELEMENT_SIZE)
    }

    pub fn control(&self, opcode: u32, argument: &[u8]) -> Result<(), Error> {
        if opcode != SET_SIZE {
            return Err(Error::new(ErrorKind::NotSupported)
                .with_message(format!("unsupported control opcode {opcode:#x}")));
        }
        let size = decode_element(argument, "set-size argument")?;
        self.store.resize(size)
    }
}

fn decode_element(bytes: &[u8], what: &str) -> Result<i32, Error> {
    let raw: [u8; ELEMENT_SIZE] = bytes.try_into().map_err(|_| {
        Error::new(ErrorKind::InvalidArgument).with_message(format!(
            "{what} must be exactly {ELEMENT_SIZE} bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok(i32::from_ne_bytes(raw))
}

/// Callbacks invoked by an external presence mechanism, once per event.
pub trait HotplugHandler {
    fn on_attach(&self) -> Result<(), Error>;
    fn on_detach(&self);
}

/// Makes an endpoint reachable from outside, and takes it away again.
pub trait EndpointHost {
    type Registration;

    fn publish(&self, endpoint: Endpoint) -> Result<Self::Registration, Error>;
    fn withdraw(&self, registration: Self::Registration);
}

/// Host for in-process use: publishing only flips presence.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetachedHost;

impl EndpointHost for DetachedHost {
    type Registration = ();

    fn publish(&self, _endpoint: Endpoint) -> Result<Self::Registration, Error> {
        Ok(())
    }

    fn withdraw(&self, _registration: Self::Registration) {}
}

pub struct InterfaceController<H: EndpointHost = DetachedHost> {
    store: Arc<StackStore>,
    host: H,
    registration: Mutex<Option<H::Registration>>,
}

impl<H: EndpointHost> InterfaceController<H> {
    /// Starts detached; nothing is published until the first `on_attach`.
    pub fn new(store: Arc<StackStore>, host: H) -> Self {
        Self {
            store,
            host,
            registration: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<StackStore> {
        &self.store
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn registration(&self) -> MutexGuard<'_, Option<H::Registration>> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_present(&self) -> bool {
        self.registration().is_some()
    }

    pub fn open(&self) -> Result<Endpoint, Error> {
        if !self.is_present() {
            return Err(Error::new(ErrorKind::NotConnected)
                .with_message("device is not attached")
                .with_hint("Attach the device before opening it."));
        }
        Ok(Endpoint::new(Arc::clone(&self.store)))
    }

    pub fn handle_read(&self, requested: usize) -> Result<Vec<u8>, Error> {
        self.open()?.read(requested)
    }

    pub fn handle_write(&self, bytes: &[u8]) -> Result<usize, Error> {
        self.open()?.write(bytes)
    }

    pub fn handle_control(&self, opcode: u32, argument: &[u8]) -> Result<(), Error> {
        self.open()?.control(opcode, argument)
    }
}

impl<H: EndpointHost> HotplugHandler for InterfaceController<H> {
    fn on_attach(&self) -> Result<(), Error> {
        let mut registration = self.registration();
        if registration.is_some() {
            debug!("attach while already attached; ignoring");
            return Ok(());
        }
        let endpoint = Endpoint::new(Arc::clone(&self.store));
        *registration = Some(self.host.publish(endpoint)?);
        info!(
            capacity = self.store.capacity(),
            height = self.store.height(),
            "device attached"
        );
        Ok(())
    }

    fn on_detach(&self) {
        let mut registration = self.registration();
        let Some(current) = registration.take() else {
            debug!("detach while already detached; ignoring");
            return;
        };
        self.host.withdraw(current);
        info!(height = self.store.height(), "device detached");
    }
}
