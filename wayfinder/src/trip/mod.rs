//! Trips, multi-stop chains, cooldowns and sequence tokens.
//!
//! A [`Trip`] is one origin→destination leg: the active route cursor,
//! the cooldown bank gating recurring actions (reroute, advisories)
//! and the monotonic sequence token that invalidates stale
//! asynchronous results. A [`TripChain`] orders several trips into a
//! multi-stop journey; at most one trip is active at a time.

use crate::geo::Point;
use crate::route::{Route, RouteProgress};
use std::time::{Duration, Instant};

/// Recurring actions gated by an independent cooldown timer.
///
/// A fixed enumerated set rather than an open-ended map: every kind
/// the engine can fire is known at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownKind {
    /// Reroute trigger after a confirmed deviation.
    Reroute,
    /// Spoken reminder for the upcoming maneuver.
    StepReminder,
    /// Eco driving tip.
    Eco,
    /// Speed-limit warning.
    SpeedWarning,
}

const COOLDOWN_KINDS: usize = 4;

impl CooldownKind {
    fn slot(self) -> usize {
        match self {
            CooldownKind::Reroute => 0,
            CooldownKind::StepReminder => 1,
            CooldownKind::Eco => 2,
            CooldownKind::SpeedWarning => 3,
        }
    }
}

/// Last-fired timestamps for every [`CooldownKind`].
#[derive(Debug, Clone, Default)]
pub struct CooldownBank {
    last_fired: [Option<Instant>; COOLDOWN_KINDS],
}

impl CooldownBank {
    /// Creates a bank with no kind on cooldown.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `kind` has not fired within `period` before `now`.
    pub fn ready(&self, kind: CooldownKind, now: Instant, period: Duration) -> bool {
        match self.last_fired[kind.slot()] {
            Some(last) => now.duration_since(last) >= period,
            None => true,
        }
    }

    /// Records that `kind` fired at `now`.
    pub fn touch(&mut self, kind: CooldownKind, now: Instant) {
        self.last_fired[kind.slot()] = Some(now);
    }

    /// Clears every timer. Called when a trip activates.
    pub fn reset(&mut self) {
        self.last_fired = [None; COOLDOWN_KINDS];
    }
}

/// One origin→destination leg of a journey.
#[derive(Debug, Clone)]
pub struct Trip {
    /// Position of this trip within its chain.
    pub index: usize,
    /// Start coordinate.
    pub origin: Point,
    /// Destination coordinate.
    pub destination: Point,
    /// Display label for the destination.
    pub label: String,
    /// Active route cursor; `None` until a route has been committed.
    pub progress: Option<RouteProgress>,
    /// Cooldown timers for recurring actions.
    pub cooldowns: CooldownBank,
    /// Monotonic token invalidating stale fetch results.
    sequence: u64,
}

impl Trip {
    /// Creates an un-routed trip.
    pub fn new(index: usize, origin: Point, destination: Point, label: impl Into<String>) -> Self {
        Self {
            index,
            origin,
            destination,
            label: label.into(),
            progress: None,
            cooldowns: CooldownBank::new(),
            sequence: 0,
        }
    }

    /// Current sequence token.
    pub fn token(&self) -> u64 {
        self.sequence
    }

    /// Bumps the token, invalidating every outstanding fetch started
    /// under an older one, and returns the new value.
    pub fn bump_token(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// True when `token` still matches the trip's current token.
    pub fn token_is_current(&self, token: u64) -> bool {
        token == self.sequence
    }

    /// Raises the token to at least `floor`.
    ///
    /// Tokens must stay monotonic across trip boundaries so that a
    /// later trip's fetches are never mistaken for an earlier trip's;
    /// the engine seeds each newly activated trip with the highest
    /// token issued so far.
    pub fn seed_token(&mut self, floor: u64) {
        self.sequence = self.sequence.max(floor);
    }

    /// Commits a route, resetting the cursor to step 0 and clearing
    /// the cooldown timers.
    pub fn commit_route(&mut self, route: Route) {
        match &mut self.progress {
            Some(progress) => progress.set_route(route),
            None => self.progress = Some(RouteProgress::new(route)),
        }
        self.cooldowns.reset();
    }
}

/// Ordered multi-stop journey (A→B→C→D).
///
/// Invariant: at most one trip is active; completing a trip's final
/// step activates the next trip in order; the chain is exhausted when
/// no next trip exists.
#[derive(Debug, Clone, Default)]
pub struct TripChain {
    trips: Vec<Trip>,
    active: usize,
}

impl TripChain {
    /// Builds a chain of trips through the given stops.
    ///
    /// `stops` holds the start position followed by each destination;
    /// `n` stops produce `n - 1` trips. Returns an empty chain for
    /// fewer than two stops.
    pub fn through(stops: &[(Point, String)]) -> Self {
        let trips = stops
            .windows(2)
            .enumerate()
            .map(|(i, pair)| Trip::new(i, pair[0].0, pair[1].0, pair[1].1.clone()))
            .collect();
        Self { trips, active: 0 }
    }

    /// Builds a chain from ready-made trips.
    pub fn new(trips: Vec<Trip>) -> Self {
        Self { trips, active: 0 }
    }

    /// Number of trips in the chain.
    pub fn len(&self) -> usize {
        self.trips.len()
    }

    /// True when the chain holds no trips.
    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    /// Index of the active trip.
    pub fn active_index(&self) -> usize {
        self.active
    }

    /// The active trip, or `None` for an empty chain.
    pub fn active(&self) -> Option<&Trip> {
        self.trips.get(self.active)
    }

    /// Mutable access to the active trip.
    pub fn active_mut(&mut self) -> Option<&mut Trip> {
        self.trips.get_mut(self.active)
    }

    /// Moves activation to the next trip, preserving order.
    ///
    /// Returns the new active index, or `None` when no further trip
    /// exists. The cursor never walks past the last trip, so
    /// `active_index` stays a valid index for observers after the
    /// journey completes.
    pub fn advance(&mut self) -> Option<usize> {
        if self.active + 1 < self.trips.len() {
            self.active += 1;
            Some(self.active)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::straight_route;

    fn pt(lat: f64, lon: f64) -> Point {
        Point::new(lat, lon)
    }

    #[test]
    fn cooldown_ready_until_touched() {
        let mut bank = CooldownBank::new();
        let base = Instant::now();
        let period = Duration::from_secs(20);

        assert!(bank.ready(CooldownKind::Eco, base, period));
        bank.touch(CooldownKind::Eco, base);
        assert!(!bank.ready(CooldownKind::Eco, base + Duration::from_secs(5), period));
        assert!(bank.ready(CooldownKind::Eco, base + Duration::from_secs(20), period));
    }

    #[test]
    fn cooldown_kinds_independent() {
        let mut bank = CooldownBank::new();
        let base = Instant::now();
        let period = Duration::from_secs(20);

        bank.touch(CooldownKind::Eco, base);
        assert!(bank.ready(CooldownKind::StepReminder, base, period));
        assert!(bank.ready(CooldownKind::Reroute, base, period));
    }

    #[test]
    fn cooldown_reset_clears_all() {
        let mut bank = CooldownBank::new();
        let base = Instant::now();

        bank.touch(CooldownKind::Reroute, base);
        bank.touch(CooldownKind::SpeedWarning, base);
        bank.reset();
        assert!(bank.ready(CooldownKind::Reroute, base, Duration::from_secs(60)));
        assert!(bank.ready(CooldownKind::SpeedWarning, base, Duration::from_secs(60)));
    }

    #[test]
    fn token_bump_invalidates_older() {
        let mut trip = Trip::new(0, pt(48.0, 16.0), pt(48.1, 16.0), "work");
        let t1 = trip.bump_token();
        assert!(trip.token_is_current(t1));

        let t2 = trip.bump_token();
        assert!(t2 > t1);
        assert!(!trip.token_is_current(t1));
        assert!(trip.token_is_current(t2));
    }

    #[test]
    fn commit_route_resets_cursor_and_cooldowns() {
        let mut trip = Trip::new(0, pt(48.0, 16.0), pt(48.0, 16.02), "home");
        let now = Instant::now();
        trip.cooldowns.touch(CooldownKind::Reroute, now);

        trip.commit_route(straight_route(pt(48.0, 16.0), 3, 500.0));
        let progress = trip.progress.as_ref().unwrap();
        assert_eq!(progress.current_step_index(), 0);
        assert!(trip
            .cooldowns
            .ready(CooldownKind::Reroute, now, Duration::from_secs(6)));
    }

    #[test]
    fn chain_through_builds_ordered_legs() {
        let chain = TripChain::through(&[
            (pt(48.0, 16.0), "start".to_string()),
            (pt(48.1, 16.0), "b".to_string()),
            (pt(48.2, 16.0), "c".to_string()),
        ]);

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.active_index(), 0);
        let first = chain.active().unwrap();
        assert_eq!(first.label, "b");
        assert_eq!(first.destination, pt(48.1, 16.0));
    }

    #[test]
    fn chain_advances_in_order_until_exhausted() {
        let mut chain = TripChain::through(&[
            (pt(48.0, 16.0), "start".to_string()),
            (pt(48.1, 16.0), "b".to_string()),
            (pt(48.2, 16.0), "c".to_string()),
        ]);

        assert_eq!(chain.advance(), Some(1));
        assert_eq!(chain.active().unwrap().label, "c");
        assert_eq!(chain.advance(), None);
    }

    #[test]
    fn exhausted_chain_keeps_last_trip_index() {
        let mut chain = TripChain::through(&[
            (pt(48.0, 16.0), "start".to_string()),
            (pt(48.1, 16.0), "b".to_string()),
            (pt(48.2, 16.0), "c".to_string()),
        ]);

        chain.advance();
        assert_eq!(chain.advance(), None);
        // Observers still see a valid index for the completed journey.
        assert_eq!(chain.active_index(), 1);
        assert_eq!(chain.active().unwrap().label, "c");
        // Repeated advances past the end stay put.
        assert_eq!(chain.advance(), None);
        assert_eq!(chain.active_index(), 1);
    }

    #[test]
    fn chain_through_needs_two_stops() {
        let chain = TripChain::through(&[(pt(48.0, 16.0), "only".to_string())]);
        assert!(chain.is_empty());
    }
}
