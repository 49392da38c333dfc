//! Advisory derivation under cooldown policies.
//!
//! Stateless condition checks (speed warning, eco tip, step reminder)
//! gated by the per-trip [`CooldownBank`] and deduplicated against the
//! immediately preceding advisory of the same kind. An advisory fires
//! only when its condition holds, its cooldown has elapsed, and it is
//! not a repeat announcement for an unchanged condition.
//!
//! Upstream data failures degrade rather than block: a missing
//! elevation profile yields slope 0 (slope tips disabled), a missing
//! speed limit retains the last known value with staleness flagged in
//! the payload.

use crate::trip::{CooldownBank, CooldownKind};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Default eco tip cooldown, in seconds.
pub const DEFAULT_ECO_COOLDOWN_S: u64 = 20;

/// Default step reminder cooldown, in seconds.
pub const DEFAULT_STEP_REMINDER_COOLDOWN_S: u64 = 20;

/// Default hold between speed warnings, in seconds.
pub const DEFAULT_SPEED_WARNING_HOLD_S: u64 = 30;

/// Tolerance above the limit before a speed warning fires, in km/h.
pub const DEFAULT_SPEED_TOLERANCE_KMH: f64 = 5.0;

/// Minimum absolute slope for slope-based eco tips, in percent.
pub const DEFAULT_SLOPE_THRESHOLD_PERCENT: f64 = 6.0;

/// Distance to the upcoming maneuver below which a reminder fires.
pub const DEFAULT_REMINDER_DISTANCE_M: f64 = 200.0;

/// The fixed set of advisory kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdvisoryKind {
    /// Driving faster than the known speed limit.
    SpeedWarning,
    /// Fuel-saving hint derived from the road ahead.
    Eco,
    /// Spoken reminder for the upcoming maneuver.
    StepReminder,
}

impl AdvisoryKind {
    fn cooldown_kind(self) -> CooldownKind {
        match self {
            AdvisoryKind::SpeedWarning => CooldownKind::SpeedWarning,
            AdvisoryKind::Eco => CooldownKind::Eco,
            AdvisoryKind::StepReminder => CooldownKind::StepReminder,
        }
    }

    fn slot(self) -> usize {
        match self {
            AdvisoryKind::SpeedWarning => 0,
            AdvisoryKind::Eco => 1,
            AdvisoryKind::StepReminder => 2,
        }
    }
}

const ADVISORY_KINDS: usize = 3;

/// Slope-based eco hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EcoHint {
    /// Sustained climb ahead; steady throttle saves fuel.
    SteepClimb,
    /// Sustained descent ahead; lift off and coast.
    SteepDescent,
}

/// A fired advisory with its payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Advisory {
    /// Current speed exceeds the known limit beyond tolerance.
    SpeedWarning {
        /// Current speed in km/h.
        speed_kmh: f64,
        /// Known limit in km/h.
        limit_kmh: f64,
        /// The limit is a retained value from an earlier fetch.
        limit_stale: bool,
    },
    /// Slope-derived eco tip.
    Eco {
        /// The hint.
        hint: EcoHint,
        /// Slope ahead in percent, signed.
        slope_percent: f64,
    },
    /// The next maneuver is close.
    StepReminder {
        /// Maneuver instruction text.
        instruction: String,
        /// Distance to the maneuver point in meters.
        distance_m: f64,
    },
}

impl Advisory {
    /// The kind this advisory belongs to.
    pub fn kind(&self) -> AdvisoryKind {
        match self {
            Advisory::SpeedWarning { .. } => AdvisoryKind::SpeedWarning,
            Advisory::Eco { .. } => AdvisoryKind::Eco,
            Advisory::StepReminder { .. } => AdvisoryKind::StepReminder,
        }
    }

    /// Whether `other` announces the same condition.
    ///
    /// Continuously varying fields (current speed, slope magnitude,
    /// remaining distance) are ignored; two advisories are duplicates
    /// when a listener would hear the same announcement twice.
    fn same_condition(&self, other: &Advisory) -> bool {
        match (self, other) {
            (
                Advisory::SpeedWarning {
                    limit_kmh: a,
                    limit_stale: sa,
                    ..
                },
                Advisory::SpeedWarning {
                    limit_kmh: b,
                    limit_stale: sb,
                    ..
                },
            ) => a == b && sa == sb,
            (Advisory::Eco { hint: a, .. }, Advisory::Eco { hint: b, .. }) => a == b,
            (
                Advisory::StepReminder { instruction: a, .. },
                Advisory::StepReminder { instruction: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

/// Coarse road classification derived from the known speed limit.
///
/// Used to scale the deviation threshold: wide motorway carriageways
/// tolerate larger GPS offsets than urban streets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoadClass {
    /// Limit 100 km/h or above.
    Motorway,
    /// Limit 70 km/h or above.
    Rural,
    /// Everything else, including unknown.
    Urban,
}

impl RoadClass {
    /// Classifies from a speed limit in km/h.
    pub fn from_speed_limit(limit_kmh: Option<f64>) -> Self {
        match limit_kmh {
            Some(limit) if limit >= 100.0 => RoadClass::Motorway,
            Some(limit) if limit >= 70.0 => RoadClass::Rural,
            _ => RoadClass::Urban,
        }
    }

    /// Scales the base deviation threshold for this class.
    pub fn deviation_threshold_m(self, base_m: f64) -> f64 {
        match self {
            RoadClass::Motorway => base_m * 2.0,
            RoadClass::Rural => base_m * 1.5,
            RoadClass::Urban => base_m,
        }
    }
}

/// The upcoming maneuver, as seen from the current fix.
#[derive(Debug, Clone, Copy)]
pub struct NextManeuver<'a> {
    /// Instruction text of the current step.
    pub instruction: &'a str,
    /// Distance from the fix to the step's end point, in meters.
    pub distance_m: f64,
}

/// Per-fix input for advisory derivation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdvisoryContext<'a> {
    /// Current speed in km/h, if the fix carried one.
    pub speed_kmh: Option<f64>,
    /// Last known speed limit in km/h.
    pub speed_limit_kmh: Option<f64>,
    /// The limit was fetched for an earlier position.
    pub speed_limit_stale: bool,
    /// Slope of the road ahead in percent; 0 when elevation data is
    /// unavailable.
    pub slope_percent: f64,
    /// The upcoming maneuver, while navigating.
    pub next_maneuver: Option<NextManeuver<'a>>,
}

/// Cooldown periods and condition thresholds.
#[derive(Debug, Clone)]
pub struct AdvisoryConfig {
    /// Minimum interval between eco tips.
    pub eco_cooldown: Duration,
    /// Minimum interval between step reminders.
    pub step_reminder_cooldown: Duration,
    /// Minimum interval between speed warnings.
    pub speed_warning_hold: Duration,
    /// Margin above the limit before warning, in km/h.
    pub speed_tolerance_kmh: f64,
    /// Minimum absolute slope for eco tips, in percent.
    pub slope_threshold_percent: f64,
    /// Reminder distance to the upcoming maneuver, in meters.
    pub reminder_distance_m: f64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            eco_cooldown: Duration::from_secs(DEFAULT_ECO_COOLDOWN_S),
            step_reminder_cooldown: Duration::from_secs(DEFAULT_STEP_REMINDER_COOLDOWN_S),
            speed_warning_hold: Duration::from_secs(DEFAULT_SPEED_WARNING_HOLD_S),
            speed_tolerance_kmh: DEFAULT_SPEED_TOLERANCE_KMH,
            slope_threshold_percent: DEFAULT_SLOPE_THRESHOLD_PERCENT,
            reminder_distance_m: DEFAULT_REMINDER_DISTANCE_M,
        }
    }
}

impl AdvisoryConfig {
    fn cooldown_period(&self, kind: AdvisoryKind) -> Duration {
        match kind {
            AdvisoryKind::SpeedWarning => self.speed_warning_hold,
            AdvisoryKind::Eco => self.eco_cooldown,
            AdvisoryKind::StepReminder => self.step_reminder_cooldown,
        }
    }
}

/// Derives advisories from per-fix context.
///
/// Holds the last fired advisory per kind for deduplication; cooldown
/// timestamps live in the trip so a route change resets them together
/// with the rest of the trip state.
#[derive(Debug, Default)]
pub struct AdvisoryEngine {
    config: AdvisoryConfig,
    last_fired: [Option<Advisory>; ADVISORY_KINDS],
}

impl AdvisoryEngine {
    /// Creates an engine with the given thresholds.
    pub fn new(config: AdvisoryConfig) -> Self {
        Self {
            config,
            last_fired: Default::default(),
        }
    }

    /// Evaluates every advisory condition for one fix.
    ///
    /// Fired advisories touch their cooldown in `cooldowns`. A kind
    /// whose condition does not hold has its dedup memory cleared, so
    /// the same announcement can fire again once the condition
    /// re-occurs.
    pub fn evaluate(
        &mut self,
        ctx: &AdvisoryContext<'_>,
        cooldowns: &mut CooldownBank,
        now: Instant,
    ) -> Vec<Advisory> {
        let mut fired = Vec::new();

        let candidates = [
            self.derive_speed_warning(ctx),
            self.derive_eco(ctx),
            self.derive_step_reminder(ctx),
        ];

        for (slot, candidate) in candidates.into_iter().enumerate() {
            let Some(advisory) = candidate else {
                self.last_fired[slot] = None;
                continue;
            };
            let kind = advisory.kind();
            debug_assert_eq!(kind.slot(), slot);

            let duplicate = self.last_fired[slot]
                .as_ref()
                .is_some_and(|last| last.same_condition(&advisory));
            if duplicate {
                continue;
            }
            if !cooldowns.ready(kind.cooldown_kind(), now, self.config.cooldown_period(kind)) {
                continue;
            }

            cooldowns.touch(kind.cooldown_kind(), now);
            self.last_fired[slot] = Some(advisory.clone());
            fired.push(advisory);
        }

        fired
    }

    /// Clears dedup memory. Called when a trip activates.
    pub fn reset(&mut self) {
        self.last_fired = Default::default();
    }

    fn derive_speed_warning(&self, ctx: &AdvisoryContext<'_>) -> Option<Advisory> {
        let speed = ctx.speed_kmh?;
        let limit = ctx.speed_limit_kmh?;
        if speed > limit + self.config.speed_tolerance_kmh {
            Some(Advisory::SpeedWarning {
                speed_kmh: speed,
                limit_kmh: limit,
                limit_stale: ctx.speed_limit_stale,
            })
        } else {
            None
        }
    }

    fn derive_eco(&self, ctx: &AdvisoryContext<'_>) -> Option<Advisory> {
        // Degraded elevation data reports slope 0 and disables this.
        if ctx.slope_percent.abs() < self.config.slope_threshold_percent {
            return None;
        }
        let hint = if ctx.slope_percent > 0.0 {
            EcoHint::SteepClimb
        } else {
            EcoHint::SteepDescent
        };
        Some(Advisory::Eco {
            hint,
            slope_percent: ctx.slope_percent,
        })
    }

    fn derive_step_reminder(&self, ctx: &AdvisoryContext<'_>) -> Option<Advisory> {
        let maneuver = ctx.next_maneuver?;
        if maneuver.distance_m <= self.config.reminder_distance_m {
            Some(Advisory::StepReminder {
                instruction: maneuver.instruction.to_string(),
                distance_m: maneuver.distance_m,
            })
        } else {
            None
        }
    }
}
