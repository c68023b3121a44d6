//! Discovery, wake orchestration and the recurring-job registry.

pub mod probe;
pub mod resolver;
pub mod schedule;
pub mod wake;

pub use probe::{LivenessProbe, NetworkProbe};
pub use resolver::ServerResolver;
pub use schedule::ScheduleRegistry;
pub use wake::{WakeOrchestrator, WakeSignal};
