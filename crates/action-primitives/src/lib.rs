//! Action Primitives - the device seam of the Tapline engine
//!
//! This crate provides:
//! - `DeviceInterface`, the narrow trait every device backend implements
//! - `ActionSpace`, a name-keyed registry of schema-validated actions
//! - Typed parameters for the builtin actions
//! - Post-action settling
//! - `MockDevice`, a deterministic in-memory backend

pub mod action_space;
pub mod builtin;
pub mod device;
pub mod errors;
pub mod mock;
pub mod types;
mod waiting;

pub use action_space::*;
pub use device::DeviceInterface;
pub use errors::*;
pub use mock::{Invocation, MockDevice, MockElement};
pub use types::*;
pub use waiting::*;
