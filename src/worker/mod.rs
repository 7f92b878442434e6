//! Background jobs: live monitoring, settlement, daily backfill and season seeding.

pub mod daily;
pub mod enrichment;
pub mod live_monitor;
pub mod orchestrator;
pub mod scheduler;
pub mod settlement;
pub mod tracker;

#[cfg(test)]
pub mod testing;

pub use live_monitor::LiveMonitorConfig;
pub use orchestrator::Orchestrator;
pub use scheduler::SchedulerHandle;
