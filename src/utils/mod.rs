//! Process-level helpers shared by the server binary and the client.

pub mod bootstrap;
pub mod retry;
