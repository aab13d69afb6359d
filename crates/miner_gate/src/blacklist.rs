//! Default admission policy.
//!
//! Rules are checked in a fixed order and the first match decides:
//! whitelist, blacklist, registration, validator permit, minimum stake,
//! request rate. A request matching none of them passes.

use std::fmt;

use crate::config::GateConfig;
use crate::history::TimestampTracker;
use crate::request::IncomingRequest;
use crate::snapshot::NetworkSnapshot;

/// Why a request was admitted or refused.
#[derive(Clone, Debug, PartialEq)]
pub enum Reason {
    Whitelisted,
    Blacklisted,
    NotRegistered,
    PermitRequired,
    PermitRequiredUnregistered,
    InsufficientStake { stake: f64, required: f64 },
    RateLimited { caller: String, requests: usize, window_secs: f64 },
    Duplicate { block_span: u64 },
    Passed,
    /// Free-form reason supplied by a deployment override.
    Custom(String),
}

impl Reason {
    /// Stable short label, used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Whitelisted => "whitelisted",
            Self::Blacklisted => "blacklisted",
            Self::NotRegistered => "not_registered",
            Self::PermitRequired | Self::PermitRequiredUnregistered => "permit_required",
            Self::InsufficientStake { .. } => "insufficient_stake",
            Self::RateLimited { .. } => "rate_limited",
            Self::Duplicate { .. } => "duplicate",
            Self::Passed => "passed",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whitelisted => f.write_str("whitelisted"),
            Self::Blacklisted => f.write_str("blacklisted"),
            Self::NotRegistered => f.write_str("not registered"),
            Self::PermitRequired => f.write_str("validator permit required"),
            Self::PermitRequiredUnregistered => {
                f.write_str("validator permit required, but not registered")
            }
            Self::InsufficientStake { stake, required } => write!(
                f,
                "stake below minimum requirement ({stake} < {required})"
            ),
            Self::RateLimited {
                caller,
                requests,
                window_secs,
            } => write!(
                f,
                "{caller} request frequency exceeded {requests} requests in {window_secs} seconds"
            ),
            Self::Duplicate { block_span } => {
                write!(f, "request sent recently in last {block_span} blocks")
            }
            Self::Passed => f.write_str("passed"),
            Self::Custom(text) => f.write_str(text),
        }
    }
}

/// Canonical admission outcome handed back to the serving layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    pub accepted: bool,
    pub reason: Reason,
}

impl Verdict {
    pub fn accept(reason: Reason) -> Self {
        Self {
            accepted: true,
            reason,
        }
    }

    pub fn reject(reason: Reason) -> Self {
        Self {
            accepted: false,
            reason,
        }
    }

    pub fn is_rejected(&self) -> bool {
        !self.accepted
    }

    /// `(accepted, reason)` pair as exposed over the serving boundary.
    pub fn into_parts(self) -> (bool, String) {
        (self.accepted, self.reason.to_string())
    }
}

/// Decide whether `req` may proceed. Reads `history` for rate limiting but
/// never writes it; timestamps are recorded by the priority scorer.
pub fn evaluate(
    req: &IncomingRequest,
    snapshot: Option<&NetworkSnapshot>,
    cfg: &GateConfig,
    history: &TimestampTracker,
    now: f64,
) -> Verdict {
    let rules = &cfg.blacklist;
    let caller = req.caller.as_str();

    if rules.whitelist.contains(caller) {
        return Verdict::accept(Reason::Whitelisted);
    }
    if rules.blacklist.contains(caller) {
        return Verdict::reject(Reason::Blacklisted);
    }

    let uid = snapshot.and_then(|s| s.uid_of(caller));

    // An absent snapshot skips the registration check.
    if !rules.allow_non_registered && snapshot.is_some() && uid.is_none() {
        return Verdict::reject(Reason::NotRegistered);
    }

    if rules.force_validator_permit {
        match (snapshot, uid) {
            (Some(s), Some(uid)) => {
                if !s.has_validator_permit(uid) {
                    return Verdict::reject(Reason::PermitRequired);
                }
            }
            _ => return Verdict::reject(Reason::PermitRequiredUnregistered),
        }
    }

    if rules.minimum_stake_requirement > 0.0 {
        if let Some(stake) = snapshot.zip(uid).and_then(|(s, uid)| s.stake(uid)) {
            if stake < rules.minimum_stake_requirement {
                return Verdict::reject(Reason::InsufficientStake {
                    stake,
                    required: rules.minimum_stake_requirement,
                });
            }
        }
    }

    if let Some(oldest) = history.oldest(caller) {
        if now - oldest < rules.min_request_period_secs {
            let requests = history.capacity();
            tracing::warn!(caller, requests, "rate limit exceeded");
            return Verdict::reject(Reason::RateLimited {
                caller: caller.to_string(),
                requests,
                window_secs: rules.min_request_period_secs,
            });
        }
    }

    Verdict::accept(Reason::Passed)
}
