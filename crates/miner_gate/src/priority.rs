use crate::config::GateConfig;
use crate::history::TimestampTracker;
use crate::request::IncomingRequest;
use crate::snapshot::NetworkSnapshot;

/// How many requests back the idle time is measured from.
pub const LOOKBACK: usize = 10;

/// Stake-weighted priority of `req`; higher is served first.
///
/// Unregistered callers, or any caller while no snapshot is available, get
/// `priority.default`. A registered caller's stake is multiplied by the time
/// since its request `LOOKBACK` entries ago, in units of the doubling period,
/// floored at 1. A caller with no history yet gets the default.
///
/// While a caller has made fewer than `LOOKBACK` requests the lookback reads
/// a zero sentinel, so the elapsed time is effectively the unix timestamp and
/// the multiplier is very large. Infrequent callers are favoured this way.
///
/// Every registered caller's arrival time is recorded after scoring.
pub fn score(
    req: &IncomingRequest,
    snapshot: Option<&NetworkSnapshot>,
    cfg: &GateConfig,
    history: &TimestampTracker,
    now: f64,
) -> f64 {
    let p = &cfg.priority;
    let caller = req.caller.as_str();
    let stake = match snapshot.and_then(|s| s.uid_of(caller).and_then(|uid| s.stake(uid))) {
        Some(stake) => stake,
        None => return p.default,
    };

    let index = history.capacity().saturating_sub(LOOKBACK);
    let priority = match history.get(caller, index) {
        Some(then) => {
            let elapsed = now - then;
            let scale = elapsed / p.stake_doubling_period_secs;
            scale.max(1.0) * stake
        }
        None => p.default,
    };

    history.record(&req.caller, now);
    priority
}
