//! Shared pieces of the execution harness.
//!
//! This crate is used by both sides of the process boundary:
//! - Wire format (invocation request, execution result)
//! - Handler interface and registry
//! - Protocol and resolution errors

mod error;
mod handler;
mod wire;

pub use error::{ProtocolError, ResolutionError};
pub use handler::{Context, Event, Handler, Module, Registry};
pub use wire::{ExecutionResult, InvocationRequest, PROTOCOL_VERSION, TIMEOUT_MESSAGE, millis};
