//! Supervised, time-bounded execution of registered handlers.
//!
//! The `harness` binary is the supervisor: it launches `harness-exec` in its
//! own process group, waits with a timeout and emits one JSON result. The
//! execution side ([`sandbox`]) loads the payload, resolves the handler and
//! runs it with its output captured.

pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod loader;
pub mod process;
pub mod sandbox;
pub mod supervisor;
