//! rulehost - command-execution server for rule containers
//!
//! Hosts independently deployed rule releases as named containers, each
//! with its own type namespace and stateful sessions. Clients drive the
//! server with command scripts over REST or a message queue, in XML or JSON.

pub mod client;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod marshal;
pub mod model;
pub mod registry;
pub mod release;
pub mod session;
pub mod transport;
pub mod types;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use engine::{EngineOptions, ExecutionEngine};
pub use error::{ErrorKind, ServerError};
