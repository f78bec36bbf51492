// Core modules implementing the stack, the device surface, framing, and errors.
pub mod device;
pub mod error;
pub mod frame;
pub mod stack;
