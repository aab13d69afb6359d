//! Deployment overrides for admission and priority.
//!
//! A deployment may plug in its own [`AdmissionPolicy`] or [`PriorityPolicy`].
//! The default policy runs whenever no override is installed, the override
//! reports [`PolicyError::NotImplemented`], returns nothing, fails, or
//! panics. Whatever happens a well-formed result comes back, and every final
//! decision is handed to a [`DecisionSink`].

use parking_lot::Mutex;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::blacklist::{Reason, Verdict};
use crate::error::PolicyError;
use crate::request::{Fingerprint, Identity, IncomingRequest};

/// Result shape accepted from admission overrides: a bare flag or a flag
/// with a reason. `reject == true` refuses the request.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyOutcome {
    pub reject: bool,
    pub reason: Option<String>,
}

impl From<bool> for PolicyOutcome {
    fn from(reject: bool) -> Self {
        Self {
            reject,
            reason: None,
        }
    }
}

impl From<(bool, String)> for PolicyOutcome {
    fn from((reject, reason): (bool, String)) -> Self {
        Self {
            reject,
            reason: Some(reason),
        }
    }
}

impl From<(bool, &str)> for PolicyOutcome {
    fn from((reject, reason): (bool, &str)) -> Self {
        (reject, reason.to_string()).into()
    }
}

impl PolicyOutcome {
    pub fn into_verdict(self) -> Verdict {
        let reason = Reason::Custom(
            self.reason
                .unwrap_or_else(|| "no reason provided".to_string()),
        );
        Verdict {
            accepted: !self.reject,
            reason,
        }
    }
}

pub trait AdmissionPolicy: Send + Sync {
    /// `Ok(None)` means the policy has no opinion and the default decides.
    fn blacklist(&self, req: &IncomingRequest) -> Result<Option<PolicyOutcome>, PolicyError>;
}

pub trait PriorityPolicy: Send + Sync {
    fn priority(&self, req: &IncomingRequest) -> Result<Option<f64>, PolicyError>;
}

impl<F> AdmissionPolicy for F
where
    F: Fn(&IncomingRequest) -> Result<Option<PolicyOutcome>, PolicyError> + Send + Sync,
{
    fn blacklist(&self, req: &IncomingRequest) -> Result<Option<PolicyOutcome>, PolicyError> {
        self(req)
    }
}

impl<F> PriorityPolicy for F
where
    F: Fn(&IncomingRequest) -> Result<Option<f64>, PolicyError> + Send + Sync,
{
    fn priority(&self, req: &IncomingRequest) -> Result<Option<f64>, PolicyError> {
        self(req)
    }
}

/// Which code path produced a decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// The deployment override decided.
    Override,
    /// No override applies; the built-in policy decided.
    Default,
    /// The override misbehaved and the built-in policy stood in.
    Fallback,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Default => "default",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Stage {
    Admission,
    Priority,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admission => "admission",
            Self::Priority => "priority",
        }
    }
}

/// A terminal decision as seen by a [`DecisionSink`].
#[derive(Clone, Copy, Debug)]
pub enum Decision<'a> {
    Admission {
        caller: &'a Identity,
        verdict: &'a Verdict,
        source: Source,
    },
    Priority {
        caller: &'a Identity,
        priority: f64,
        source: Source,
    },
    /// Outcome of the payload cache lookup; separate from admission so one
    /// request never counts as admitted twice.
    Duplicate {
        caller: &'a Identity,
        fingerprint: &'a Fingerprint,
        duplicate: bool,
    },
}

/// Observability hook for decisions. Implementations must return promptly;
/// a panicking sink is contained and ignored.
pub trait DecisionSink: Send + Sync {
    fn record(&self, decision: &Decision<'_>);
}

/// Default sink: structured log lines plus prometheus counters when the
/// `telemetry` feature is on.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DecisionSink for LogSink {
    fn record(&self, decision: &Decision<'_>) {
        match decision {
            Decision::Admission {
                caller,
                verdict,
                source,
            } => {
                tracing::trace!(
                    caller = %caller,
                    accepted = verdict.accepted,
                    reason = %verdict.reason,
                    source = source.as_str(),
                    "admission decided"
                );
                if verdict.is_rejected() {
                    tracing::debug!(caller = %caller, reason = %verdict.reason, "request rejected");
                }
                #[cfg(feature = "telemetry")]
                {
                    if verdict.accepted {
                        crate::telemetry::ADMITTED_TOTAL.inc();
                    } else {
                        crate::telemetry::REJECTED_TOTAL
                            .with_label_values(&[verdict.reason.kind()])
                            .inc();
                    }
                }
            }
            Decision::Priority {
                caller,
                priority,
                source,
            } => {
                tracing::trace!(
                    caller = %caller,
                    priority = *priority,
                    source = source.as_str(),
                    "priority assigned"
                );
            }
            Decision::Duplicate {
                caller,
                fingerprint,
                duplicate,
            } => {
                tracing::trace!(caller = %caller, %fingerprint, duplicate = *duplicate, "payload cache checked");
                if *duplicate {
                    tracing::debug!(caller = %caller, %fingerprint, "duplicate payload rejected");
                }
            }
        }
    }
}

/// Owned copy of a [`Decision`].
#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    Admission {
        caller: Identity,
        verdict: Verdict,
        source: Source,
    },
    Priority {
        caller: Identity,
        priority: f64,
        source: Source,
    },
    Duplicate {
        caller: Identity,
        fingerprint: Fingerprint,
        duplicate: bool,
    },
}

/// Sink keeping every decision in memory, for tests and debugging.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Recorded>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl DecisionSink for MemorySink {
    fn record(&self, decision: &Decision<'_>) {
        let owned = match *decision {
            Decision::Admission {
                caller,
                verdict,
                source,
            } => Recorded::Admission {
                caller: caller.clone(),
                verdict: verdict.clone(),
                source,
            },
            Decision::Priority {
                caller,
                priority,
                source,
            } => Recorded::Priority {
                caller: caller.clone(),
                priority,
                source,
            },
            Decision::Duplicate {
                caller,
                fingerprint,
                duplicate,
            } => Recorded::Duplicate {
                caller: caller.clone(),
                fingerprint: *fingerprint,
                duplicate,
            },
        };
        self.events.lock().push(owned);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Run an override, turning a panic into [`PolicyError::Failed`].
fn guarded<T>(f: impl FnOnce() -> Result<Option<T>, PolicyError>) -> Result<Option<T>, PolicyError> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(PolicyError::Failed(panic_message(payload))))
}

pub(crate) fn report(sink: &dyn DecisionSink, decision: Decision<'_>) {
    if catch_unwind(AssertUnwindSafe(|| sink.record(&decision))).is_err() {
        tracing::warn!("decision sink panicked; event dropped");
    }
}

/// Shared override/fallback resolution for both stages.
fn resolve<T>(
    stage: Stage,
    caller: &Identity,
    custom: Option<Result<Option<T>, PolicyError>>,
    fallback: impl FnOnce() -> T,
) -> (T, Source) {
    match custom {
        None | Some(Err(PolicyError::NotImplemented)) => (fallback(), Source::Default),
        Some(Ok(Some(value))) => (value, Source::Override),
        Some(Ok(None)) => {
            tracing::debug!(caller = %caller, stage = stage.as_str(), "override returned nothing; using default policy");
            (fallback(), Source::Fallback)
        }
        Some(Err(err)) => {
            tracing::error!(caller = %caller, stage = stage.as_str(), %err, "override failed; using default policy");
            #[cfg(feature = "telemetry")]
            crate::telemetry::OVERRIDE_FALLBACK_TOTAL
                .with_label_values(&[stage.as_str()])
                .inc();
            (fallback(), Source::Fallback)
        }
    }
}

/// Decide admission through `custom` when present, `fallback` otherwise.
pub fn dispatch_admission(
    custom: Option<&dyn AdmissionPolicy>,
    sink: &dyn DecisionSink,
    req: &IncomingRequest,
    fallback: impl FnOnce() -> Verdict,
) -> Verdict {
    let outcome = custom.map(|policy| guarded(|| policy.blacklist(req)));
    let outcome = outcome.map(|res| res.map(|o| o.map(PolicyOutcome::into_verdict)));
    let (verdict, source) = resolve(Stage::Admission, &req.caller, outcome, fallback);
    report(
        sink,
        Decision::Admission {
            caller: &req.caller,
            verdict: &verdict,
            source,
        },
    );
    verdict
}

/// Decide priority through `custom` when present, `fallback` otherwise.
/// Negative or non-finite override scores count as failures.
pub fn dispatch_priority(
    custom: Option<&dyn PriorityPolicy>,
    sink: &dyn DecisionSink,
    req: &IncomingRequest,
    fallback: impl FnOnce() -> f64,
) -> f64 {
    let outcome = custom.map(|policy| {
        guarded(|| policy.priority(req)).and_then(|p| match p {
            Some(v) if !(v.is_finite() && v >= 0.0) => {
                Err(PolicyError::Failed(format!("invalid priority {v}")))
            }
            other => Ok(other),
        })
    });
    let (priority, source) = resolve(Stage::Priority, &req.caller, outcome, fallback);
    report(
        sink,
        Decision::Priority {
            caller: &req.caller,
            priority,
            source,
        },
    );
    priority
}
