//! Rate limiter with a leniency gate.
//!
//! Decides whether a request of a given kind may proceed at a given instant:
//!
//! 1. exempt kinds skip both cooldown checks
//! 2. global cooldown since the last admission of any kind
//! 3. per-kind cooldown since the last admission of the same kind
//! 4. lenient kinds must be observed `violations_before_prompt` times
//!    (spaced at least `recount_cooldown` apart) before one is admitted
//! 5. an admission stamps both the global and the per-kind clock

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum time between admissions of any kind (milliseconds).
    /// Default: 10000ms
    pub global_cooldown_ms: u64,

    /// Minimum time between admissions of the same kind (milliseconds).
    /// Default: 15000ms
    pub per_kind_cooldown_ms: u64,

    /// Per-kind overrides of `per_kind_cooldown_ms`.
    pub kind_cooldowns_ms: HashMap<String, u64>,

    /// Kinds that bypass the cooldown checks.
    /// Default: ["Directions"]
    pub exempt_kinds: Vec<String>,

    /// Kinds subject to the leniency gate.
    /// Default: ["LaneWarning"]
    pub lenient_kinds: Vec<String>,

    /// Observations of a lenient kind needed before one is admitted.
    /// Default: 2
    pub violations_before_prompt: u32,

    /// Minimum spacing between two counted observations (milliseconds).
    /// Default: 3000ms
    pub recount_cooldown_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_cooldown_ms: 10_000,
            per_kind_cooldown_ms: 15_000,
            kind_cooldowns_ms: HashMap::new(),
            exempt_kinds: vec!["Directions".to_string()],
            lenient_kinds: vec!["LaneWarning".to_string()],
            violations_before_prompt: 2,
            recount_cooldown_ms: 3_000,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed.
    Admitted,
    /// Another request was admitted too recently.
    GlobalCooldown,
    /// A request of the same kind was admitted too recently.
    KindCooldown,
    /// Counted as a violation, threshold not reached yet.
    Counted { count: u32, threshold: u32 },
    /// Observed again within the recount cooldown, not counted.
    Recount,
}

impl Admission {
    #[inline]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Debug, Default)]
struct RateLimitState {
    last_any: Option<Instant>,
    last_allowed: HashMap<String, Instant>,
    leniency_counts: HashMap<String, u32>,
    last_counted: HashMap<String, Instant>,
}

/// Admission gate for collaborator requests.
///
/// State lives behind a mutex so producers on any thread can ask.
pub struct RateLimiter {
    global_cooldown: Duration,
    per_kind_cooldown: Duration,
    kind_cooldowns: HashMap<String, Duration>,
    exempt: HashSet<String>,
    lenient: HashSet<String>,
    threshold: u32,
    recount_cooldown: Duration,
    state: Mutex<RateLimitState>,
}

/// True when fewer than `window` has elapsed since `last`.
#[inline]
fn within(now: Instant, last: Option<&Instant>, window: Duration) -> bool {
    last.is_some_and(|last| now.saturating_duration_since(*last) < window)
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            global_cooldown: Duration::from_millis(config.global_cooldown_ms),
            per_kind_cooldown: Duration::from_millis(config.per_kind_cooldown_ms),
            kind_cooldowns: config
                .kind_cooldowns_ms
                .iter()
                .map(|(kind, ms)| (kind.clone(), Duration::from_millis(*ms)))
                .collect(),
            exempt: config.exempt_kinds.iter().cloned().collect(),
            lenient: config.lenient_kinds.iter().cloned().collect(),
            threshold: config.violations_before_prompt,
            recount_cooldown: Duration::from_millis(config.recount_cooldown_ms),
            state: Mutex::new(RateLimitState::default()),
        }
    }

    /// Whether `kind` bypasses the cooldown checks.
    pub fn is_exempt(&self, kind: &str) -> bool {
        self.exempt.contains(kind)
    }

    fn cooldown_for(&self, kind: &str) -> Duration {
        self.kind_cooldowns
            .get(kind)
            .copied()
            .unwrap_or(self.per_kind_cooldown)
    }

    /// Run the admission check for `kind` at `now`, updating state.
    pub fn check(&self, kind: &str, now: Instant) -> Admission {
        let mut state = self.state.lock();

        if !self.is_exempt(kind) {
            if within(now, state.last_any.as_ref(), self.global_cooldown) {
                return Admission::GlobalCooldown;
            }
            if within(now, state.last_allowed.get(kind), self.cooldown_for(kind)) {
                return Admission::KindCooldown;
            }
        }

        if self.lenient.contains(kind) {
            if within(now, state.last_counted.get(kind), self.recount_cooldown) {
                return Admission::Recount;
            }
            state.last_counted.insert(kind.to_string(), now);

            let count = state.leniency_counts.entry(kind.to_string()).or_insert(0);
            *count += 1;
            if *count < self.threshold {
                return Admission::Counted {
                    count: *count,
                    threshold: self.threshold,
                };
            }
            *count = 0;
        }

        state.last_any = Some(now);
        state.last_allowed.insert(kind.to_string(), now);
        Admission::Admitted
    }

    /// Convenience wrapper returning only the verdict.
    pub fn admit(&self, kind: &str, now: Instant) -> bool {
        self.check(kind, now).is_admitted()
    }

    /// Forget all timestamps and counters.
    pub fn reset(&self) {
        *self.state.lock() = RateLimitState::default();
    }
}
