#![allow(clippy::unwrap_used, clippy::expect_used)]
use std::sync::Arc;
use std::time::Duration;

use miner_gate::{
    GateConfig, IncomingRequest, PolicyError, PolicyOutcome, Reason, SnapshotHandle,
};

mod util;
use util::{chat, gate, handle, MINER, VALIDATOR, WHALE};

#[test]
fn whitelisted_callers_always_pass() {
    let mut cfg = GateConfig::default();
    cfg.blacklist.whitelist.insert("5Friend".into());
    cfg.blacklist.whitelist.insert(MINER.into());
    cfg.blacklist.blacklist.insert(MINER.into());
    cfg.blacklist.force_validator_permit = true;
    cfg.blacklist.min_request_period_secs = 3_600.0;
    cfg.priority.history_len = 10;
    let (gate, _clock) = gate(cfg, handle(10));

    for caller in ["5Friend", MINER] {
        for _ in 0..25 {
            let v = gate.admit(&chat(caller, "hi"));
            assert!(v.accepted);
            assert_eq!(v.reason, Reason::Whitelisted);
            gate.prioritize(&chat(caller, "hi"));
        }
    }
}

#[test]
fn blacklisted_callers_always_fail() {
    let mut cfg = GateConfig::default();
    cfg.blacklist.blacklist.insert(VALIDATOR.into());
    cfg.blacklist.blacklist.insert("5Stranger".into());
    cfg.blacklist.allow_non_registered = true;
    let snapshots = handle(10);
    let (gate, _clock) = gate(cfg, Arc::clone(&snapshots));

    for caller in [VALIDATOR, "5Stranger"] {
        assert_eq!(
            gate.admit(&chat(caller, "hi")).into_parts(),
            (false, "blacklisted".to_string())
        );
    }
    snapshots.clear();
    assert!(gate.admit(&chat(VALIDATOR, "hi")).is_rejected());
}

#[test]
fn unregistered_caller_rejected_with_snapshot_present() {
    let (gate, _clock) = gate(GateConfig::default(), handle(10));
    assert_eq!(
        gate.admit(&chat("5Stranger", "hi")).into_parts(),
        (false, "not registered".to_string())
    );
}

#[test]
fn unsynced_node_admits_unknown_callers() {
    let (gate, _clock) = gate(GateConfig::default(), Arc::new(SnapshotHandle::new()));
    assert_eq!(gate.admit(&chat("5Stranger", "hi")).reason, Reason::Passed);
    // and scores them at the default priority without tracking them
    assert_eq!(gate.prioritize(&chat("5Stranger", "hi")), 0.0);
    assert_eq!(gate.history().callers(), 0);
}

#[test]
fn rate_limit_kicks_in_after_full_window() {
    let mut cfg = GateConfig::default();
    cfg.priority.history_len = 10;
    cfg.blacklist.min_request_period_secs = 60.0;
    let (gate, clock) = gate(cfg, handle(10));

    for _ in 0..10 {
        assert!(gate.screen(&chat(VALIDATOR, "hi")).is_ok());
        clock.advance(Duration::from_secs(1));
    }
    let refused = gate.screen(&chat(VALIDATOR, "hi")).unwrap_err();
    assert_eq!(refused.reason.kind(), "rate_limited");
    // refusals are not recorded, so the window drains with time alone
    clock.advance(Duration::from_secs(60));
    assert!(gate.screen(&chat(VALIDATOR, "hi")).is_ok());
    // other callers are unaffected throughout
    assert!(gate.admit(&chat(WHALE, "hi")).accepted);
}

#[test]
fn throwing_override_matches_default_call_for_call() {
    let mut cfg = GateConfig::default();
    cfg.priority.history_len = 10;
    cfg.blacklist.min_request_period_secs = 30.0;
    cfg.blacklist.blacklist.insert(WHALE.into());

    let failing = |_: &IncomingRequest| -> Result<Option<PolicyOutcome>, PolicyError> {
        Err(PolicyError::Failed("always broken".into()))
    };
    let (with_override, clock_a) = gate(cfg.clone(), handle(10));
    let with_override = with_override.with_admission_policy(Arc::new(failing));
    let (plain, clock_b) = gate(cfg, handle(10));

    let callers = [VALIDATOR, MINER, WHALE, "5Stranger", VALIDATOR, VALIDATOR];
    for step in 0..60 {
        let caller = callers[step % callers.len()];
        let req = chat(caller, "hi");
        let a = with_override.admit(&req);
        let b = plain.admit(&req);
        assert_eq!(a, b, "step {step} caller {caller}");
        if a.accepted {
            assert_eq!(with_override.prioritize(&req), plain.prioritize(&req));
        }
        clock_a.advance(Duration::from_millis(700));
        clock_b.advance(Duration::from_millis(700));
    }
}

#[test]
fn panicking_override_still_yields_a_verdict() {
    let panicking = |req: &IncomingRequest| -> Result<Option<PolicyOutcome>, PolicyError> {
        if req.payload.len() > 1 {
            panic!("custom policy bug");
        }
        Ok(Some(false.into()))
    };
    let (gate, _clock) = gate(GateConfig::default(), handle(10));
    let gate = gate.with_admission_policy(Arc::new(panicking));
    assert_eq!(gate.admit(&chat("5Stranger", "hi")).reason, Reason::NotRegistered);
    assert!(gate.admit(&chat(VALIDATOR, "hi")).accepted);
}
