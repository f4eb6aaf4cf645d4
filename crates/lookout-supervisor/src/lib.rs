//! `lookout-supervisor`: process supervision for watcher units.
//!
//! This crate owns everything that runs: the orchestrator loop that spawns
//! and health-checks the units declared in config, the checkpoint that lets
//! a restarted orchestrator adopt still-running processes, the control-file
//! channel the CLI uses to reach a live orchestrator, and the watchdog that
//! keeps the orchestrator itself alive.
//!
//! # Architecture
//!
//! ```text
//! watchdog        ← respawns `lookout run` on the unit backoff curve,
//!     │             no failure ceiling
//!     ▼
//! Orchestrator    ← one per root; claims orchestrator.pid
//!     │             tick: control → health → spawn → queue housekeeping
//!     ├─► unit processes   (spawned from config, logs to .lookout/logs/)
//!     ├─► heartbeat files  (written by units, judged stale here)
//!     └─► checkpoint.yaml  (survives orchestrator restarts)
//! ```
//!
//! Units are watcher processes that scan some source and submit candidate
//! events to the queue in `lookout-core`. The orchestrator restarts them on
//! exit or stale heartbeat with exponential backoff, and gives up on a unit
//! only after `max_consecutive_failures` rapid failures in a row.

pub mod control;
pub mod error;
pub mod heartbeat;
pub mod orchestrator;
pub mod process;
pub mod unit;
pub mod watchdog;

pub use error::SupervisorError;
pub use orchestrator::{status, Orchestrator, StatusReport, UnitView};
pub use unit::{backoff_delay, Checkpoint, UnitRecord, UnitStatus};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, SupervisorError>;
