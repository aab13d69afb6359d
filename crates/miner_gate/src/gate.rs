use std::sync::Arc;

use crate::blacklist::{self, Reason, Verdict};
use crate::clock::{Clock, SystemClock};
use crate::config::GateConfig;
use crate::dedup::DedupCache;
use crate::dispatch::{
    self, AdmissionPolicy, Decision, DecisionSink, LogSink, PriorityPolicy,
};
use crate::error::ConfigError;
use crate::history::TimestampTracker;
use crate::priority;
use crate::request::IncomingRequest;
use crate::snapshot::SnapshotSource;

/// Admission, deduplication and priority for one serving process.
///
/// Owns the dedup cache and per-caller request history; borrows the network
/// view through a [`SnapshotSource`]. Every method takes `&self` and is safe
/// to call from any number of threads.
pub struct MinerGate<C: Clock = SystemClock> {
    config: GateConfig,
    snapshots: Arc<dyn SnapshotSource>,
    dedup: DedupCache,
    history: TimestampTracker,
    clock: C,
    admission: Option<Arc<dyn AdmissionPolicy>>,
    priority: Option<Arc<dyn PriorityPolicy>>,
    sink: Arc<dyn DecisionSink>,
}

impl MinerGate<SystemClock> {
    pub fn new(config: GateConfig, snapshots: Arc<dyn SnapshotSource>) -> Result<Self, ConfigError> {
        Self::with_clock(config, snapshots, SystemClock)
    }
}

impl<C: Clock> MinerGate<C> {
    pub fn with_clock(
        config: GateConfig,
        snapshots: Arc<dyn SnapshotSource>,
        clock: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        for warning in config.warnings() {
            tracing::warn!("{warning}; this is a security risk");
        }
        Ok(Self {
            dedup: DedupCache::new(config.blacklist.request_cache_block_span),
            history: TimestampTracker::new(config.priority.history_len),
            config,
            snapshots,
            clock,
            admission: None,
            priority: None,
            sink: Arc::new(LogSink),
        })
    }

    pub fn with_admission_policy(mut self, policy: Arc<dyn AdmissionPolicy>) -> Self {
        self.admission = Some(policy);
        self
    }

    pub fn with_priority_policy(mut self, policy: Arc<dyn PriorityPolicy>) -> Self {
        self.priority = Some(policy);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    pub fn history(&self) -> &TimestampTracker {
        &self.history
    }

    /// Accept or refuse `req`, consulting the override when installed.
    pub fn admit(&self, req: &IncomingRequest) -> Verdict {
        dispatch::dispatch_admission(self.admission.as_deref(), &*self.sink, req, || {
            self.default_admission(req)
        })
    }

    /// The built-in admission policy, bypassing any override.
    pub fn default_admission(&self, req: &IncomingRequest) -> Verdict {
        let snapshot = self.snapshots.current();
        blacklist::evaluate(
            req,
            snapshot.as_deref(),
            &self.config,
            &self.history,
            self.clock.now_secs(),
        )
    }

    /// Priority of an admitted request. Records the caller's arrival time
    /// whenever the built-in scorer runs for a registered caller.
    pub fn prioritize(&self, req: &IncomingRequest) -> f64 {
        dispatch::dispatch_priority(self.priority.as_deref(), &*self.sink, req, || {
            self.default_priority(req)
        })
    }

    pub fn default_priority(&self, req: &IncomingRequest) -> f64 {
        let snapshot = self.snapshots.current();
        priority::score(
            req,
            snapshot.as_deref(),
            &self.config,
            &self.history,
            self.clock.now_secs(),
        )
    }

    /// Refuse payloads already served within the configured block span.
    /// Always passes when the request cache is disabled. Duplicates are
    /// reported as [`Decision::Duplicate`], never as a second admission.
    pub fn check_duplicate(&self, req: &IncomingRequest) -> Verdict {
        if !self.config.blacklist.use_request_cache {
            return Verdict::accept(Reason::Passed);
        }
        let block = self.snapshots.current().map(|s| s.block()).unwrap_or(0);
        let fingerprint = req.fingerprint();
        let duplicate = self.dedup.check_and_record(&fingerprint, block);
        dispatch::report(
            &*self.sink,
            Decision::Duplicate {
                caller: &req.caller,
                fingerprint: &fingerprint,
                duplicate,
            },
        );
        if duplicate {
            Verdict::reject(Reason::Duplicate {
                block_span: self.dedup.ttl_blocks(),
            })
        } else {
            Verdict::accept(Reason::Passed)
        }
    }

    /// Admit then score: `Ok(priority)` for accepted requests, `Err` with the
    /// refusal otherwise. Refused requests are never scored.
    pub fn screen(&self, req: &IncomingRequest) -> Result<f64, Verdict> {
        let verdict = self.admit(req);
        if verdict.is_rejected() {
            return Err(verdict);
        }
        Ok(self.prioritize(req))
    }
}
