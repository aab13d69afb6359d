#![allow(dead_code)]

use std::sync::Arc;

use miner_gate::{
    GateConfig, Identity, IncomingRequest, ManualClock, Message, MinerGate, NetworkSnapshot,
    SnapshotHandle,
};

pub const NOW: f64 = 1_700_000_000.0;

/// Registered callers used across the integration suites.
pub const VALIDATOR: &str = "5Validator";
pub const MINER: &str = "5Miner";
pub const WHALE: &str = "5Whale";

pub fn snapshot(block: u64) -> NetworkSnapshot {
    NetworkSnapshot::new(
        block,
        vec![
            Identity::from(VALIDATOR),
            Identity::from(MINER),
            Identity::from(WHALE),
        ],
        vec![10.0, 0.5, 5_000.0],
        vec![true, false, true],
    )
    .expect("aligned snapshot")
}

pub fn handle(block: u64) -> Arc<SnapshotHandle> {
    Arc::new(SnapshotHandle::with_snapshot(snapshot(block)))
}

pub fn chat(caller: &str, text: &str) -> IncomingRequest {
    IncomingRequest::new(
        caller,
        vec![
            Message::new("system", "answer briefly"),
            Message::new("user", text),
        ],
    )
}

pub fn gate(cfg: GateConfig, snapshots: Arc<SnapshotHandle>) -> (MinerGate<ManualClock>, ManualClock) {
    let clock = ManualClock::new(NOW);
    let gate = MinerGate::with_clock(cfg, snapshots, clock.clone()).expect("valid config");
    (gate, clock)
}
