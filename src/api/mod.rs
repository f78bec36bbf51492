//! Purpose: Define the public Rust API boundary for intstack.
//! Exports: The stack, the device surface, the socket host, and the client.
//! Role: Public, additive-only surface used by the CLI and integration tests.
//! Invariants: This module is the only public path to core types.
//! Invariants: Wire framing stays internal; callers see bytes, values, and errors.

mod client;
mod host;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::device::{
    DetachedHost, ELEMENT_SIZE, Endpoint, EndpointHost, HotplugHandler, InterfaceController,
    SET_SIZE,
};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::stack::{Pop, StackSnapshot, StackStore};
pub use crate::device_paths::{DEVICE_NAME, default_device_path, device_present};
pub use client::{ApiResult, DeviceClient};
pub use host::{SocketHost, SocketRegistration};
