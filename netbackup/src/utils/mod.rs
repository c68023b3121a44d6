//! Utility modules for netbackup.

pub mod errors;
pub mod logger;

pub use errors::{
    ConfigError, Error, RemoteError, ResolutionError, Result, ScheduleError, ToolError,
    TransferError,
};
