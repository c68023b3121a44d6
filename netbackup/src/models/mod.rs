//! Data model shared by the resolver, the transfer session and the scheduler.

pub mod schedule;
pub mod server;
pub mod transfer;

pub use schedule::{Interval, ScheduleEntry, ScheduleTime};
pub use server::{MacAddress, ServerEntry, ServerRegistry};
pub use transfer::{ResolutionRequest, ResolvedEndpoint, Strategy, TransferMode, TransferSpec};
