#![forbid(unsafe_code)]
//! Request admission and ordering for an inference-serving miner.
//!
//! Before a request reaches the model the serving layer asks a [`MinerGate`]
//! whether to accept it ([`MinerGate::admit`]), whether the payload was served
//! recently ([`MinerGate::check_duplicate`]), and how urgently to run it
//! ([`MinerGate::prioritize`]). Policy rejections are ordinary [`Verdict`]
//! values, never errors.

pub mod blacklist;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod history;
pub mod priority;
pub mod request;
pub mod snapshot;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use blacklist::{Reason, Verdict};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GateConfig;
pub use dedup::DedupCache;
pub use dispatch::{
    AdmissionPolicy, Decision, DecisionSink, LogSink, MemorySink, PolicyOutcome, PriorityPolicy,
    Recorded, Source,
};
pub use error::{ConfigError, PolicyError, SnapshotError};
pub use gate::MinerGate;
pub use history::TimestampTracker;
pub use request::{Fingerprint, Identity, IncomingRequest, Message};
pub use snapshot::{NetworkSnapshot, SnapshotHandle, SnapshotRefresher, SnapshotSource};
