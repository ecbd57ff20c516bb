pub mod cli;
pub mod config;
pub mod error;
pub mod sandbox;

pub use error::{BwrapperError, Result};
pub use sandbox::{CommandRequest, CommandResult, SandboxProfile, SandboxRunner};
