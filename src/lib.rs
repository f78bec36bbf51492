//! Purpose: Library crate behind the `intstack` CLI, daemon, and tests.
//! Exports: `api` (stack store, device controller, socket host, client, errors).
//! Role: Everything with real synchronization or lifecycle logic lives here.
//! Invariants: Exactly one `StackStore` backs a device for the life of the process.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
mod core;
mod device_paths;
