//! Route and step model.
//!
//! A [`Route`] is the immutable product of one routing fetch: the
//! polyline geometry plus the ordered maneuver [`Step`]s. Progress
//! along it lives in [`RouteProgress`], a mutable cursor owned by the
//! navigation engine. Reroutes replace the route wholesale; nothing
//! carries over from the old step list.

use crate::geo::{self, Point};
use serde::{Deserialize, Serialize};

/// One maneuver instruction segment of a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Position of this step in the route's step list.
    pub index: usize,
    /// Coordinate at which the maneuver completes.
    pub end: Point,
    /// Human-readable instruction ("Turn left onto ...").
    pub instruction: String,
    /// Length of the step in meters.
    pub distance_m: f64,
    /// Expected duration of the step in seconds.
    pub duration_s: f64,
    /// Whether the rider has passed this step's end-point.
    pub completed: bool,
}

/// A planned route: geometry polyline plus ordered maneuver steps.
///
/// Immutable once fetched. Replaced wholesale on reroute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Ordered polyline of the route.
    pub geometry: Vec<Point>,
    /// Ordered maneuver steps. Step `i` has `index == i`.
    pub steps: Vec<Step>,
    /// Total route distance in meters.
    pub distance_m: f64,
    /// Total expected duration in seconds.
    pub duration_s: f64,
}

impl Route {
    /// Builds a route from geometry and steps, deriving the totals.
    pub fn new(geometry: Vec<Point>, steps: Vec<Step>) -> Self {
        let distance_m = steps.iter().map(|s| s.distance_m).sum();
        let duration_s = steps.iter().map(|s| s.duration_s).sum();
        Self {
            geometry,
            steps,
            distance_m,
            duration_s,
        }
    }

    /// Final destination coordinate, if the route has any steps.
    pub fn destination(&self) -> Option<Point> {
        self.steps.last().map(|s| s.end)
    }
}

/// Mutable progress cursor over a [`Route`].
///
/// Steps complete strictly in order. Completed steps are retained (the
/// remaining-distance figure needs them) but hidden from consumers
/// that ask for pending steps only.
#[derive(Debug, Clone)]
pub struct RouteProgress {
    route: Route,
    current_step: usize,
}

impl RouteProgress {
    /// Wraps a freshly fetched route with the cursor at step 0.
    pub fn new(route: Route) -> Self {
        Self {
            route,
            current_step: 0,
        }
    }

    /// Replaces the route and resets the cursor to step 0.
    ///
    /// The old route and its completion flags are discarded entirely.
    pub fn set_route(&mut self, route: Route) {
        self.route = route;
        self.current_step = 0;
    }

    /// The underlying route.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Index of the active (first uncompleted) step.
    pub fn current_step_index(&self) -> usize {
        self.current_step
    }

    /// The active step, or `None` once every step has completed.
    pub fn current_step(&self) -> Option<&Step> {
        self.route.steps.get(self.current_step)
    }

    /// Marks the step at `index` completed.
    ///
    /// Only the current step may complete; anything else is a no-op.
    /// Calling this twice for the same index has no additional effect.
    /// Returns true when the call actually completed the step.
    pub fn mark_step_completed(&mut self, index: usize) -> bool {
        if index != self.current_step {
            return false;
        }
        let Some(step) = self.route.steps.get_mut(index) else {
            return false;
        };
        if step.completed {
            return false;
        }
        step.completed = true;
        self.current_step += 1;
        true
    }

    /// Moves the cursor forward to `index`, completing every step
    /// before it. The cursor never regresses.
    pub fn advance_to_step(&mut self, index: usize) {
        while self.current_step < index && self.current_step < self.route.steps.len() {
            let i = self.current_step;
            self.mark_step_completed(i);
        }
    }

    /// True once every step has completed.
    pub fn is_finished(&self) -> bool {
        self.current_step >= self.route.steps.len()
    }

    /// Steps not yet completed, in order.
    pub fn pending_steps(&self) -> impl Iterator<Item = &Step> {
        self.route.steps.iter().filter(|s| !s.completed)
    }

    /// Sum of the pending steps' distances plus the distance from the
    /// rider to the current step's end-point.
    pub fn remaining_distance_m(&self, position: Point) -> f64 {
        let Some(current) = self.current_step() else {
            return 0.0;
        };
        let to_current_end = geo::haversine_distance(position, current.end);
        let after_current: f64 = self
            .route
            .steps
            .iter()
            .skip(self.current_step + 1)
            .map(|s| s.distance_m)
            .sum();
        to_current_end + after_current
    }
}

/// Builds a straight-line test route with evenly spaced steps.
///
/// Handy for simulations and tests: `step_count` steps along a single
/// meridian-parallel line starting at `origin`, each `step_length_m`
/// long heading due east.
pub fn straight_route(origin: Point, step_count: usize, step_length_m: f64) -> Route {
    // Degrees of longitude per meter at this latitude.
    let deg_per_m = 1.0 / (111_320.0 * origin.lat.to_radians().cos());

    let mut geometry = Vec::with_capacity(step_count + 1);
    let mut steps = Vec::with_capacity(step_count);
    geometry.push(origin);

    for i in 0..step_count {
        let end = Point::new(
            origin.lat,
            origin.lon + (i + 1) as f64 * step_length_m * deg_per_m,
        );
        geometry.push(end);
        steps.push(Step {
            index: i,
            end,
            instruction: if i + 1 == step_count {
                "Arrive at destination".to_string()
            } else {
                "Continue straight".to_string()
            },
            distance_m: step_length_m,
            duration_s: step_length_m / 14.0, // ~50 km/h
            completed: false,
        });
    }

    Route::new(geometry, steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_route() -> Route {
        straight_route(Point::new(48.0, 16.0), 3, 500.0)
    }

    #[test]
    fn route_totals_derived_from_steps() {
        let route = test_route();
        assert_eq!(route.steps.len(), 3);
        assert!((route.distance_m - 1500.0).abs() < 1e-9);
        assert!(route.destination().is_some());
    }

    #[test]
    fn steps_complete_in_order() {
        let mut progress = RouteProgress::new(test_route());
        assert_eq!(progress.current_step_index(), 0);

        assert!(progress.mark_step_completed(0));
        assert_eq!(progress.current_step_index(), 1);
        assert!(progress.mark_step_completed(1));
        assert!(progress.mark_step_completed(2));
        assert!(progress.is_finished());
        assert!(progress.current_step().is_none());
    }

    #[test]
    fn out_of_order_completion_rejected() {
        let mut progress = RouteProgress::new(test_route());
        assert!(!progress.mark_step_completed(2));
        assert_eq!(progress.current_step_index(), 0);
    }

    #[test]
    fn completion_is_idempotent() {
        let mut progress = RouteProgress::new(test_route());
        assert!(progress.mark_step_completed(0));
        assert!(!progress.mark_step_completed(0));
        assert_eq!(progress.current_step_index(), 1);
    }

    #[test]
    fn advance_to_step_completes_intermediates() {
        let mut progress = RouteProgress::new(test_route());
        progress.advance_to_step(2);
        assert_eq!(progress.current_step_index(), 2);
        assert_eq!(progress.pending_steps().count(), 1);
    }

    #[test]
    fn cursor_never_regresses() {
        let mut progress = RouteProgress::new(test_route());
        progress.advance_to_step(2);
        progress.advance_to_step(1);
        assert_eq!(progress.current_step_index(), 2);
    }

    #[test]
    fn set_route_resets_cursor() {
        let mut progress = RouteProgress::new(test_route());
        progress.advance_to_step(2);

        progress.set_route(test_route());
        assert_eq!(progress.current_step_index(), 0);
        assert_eq!(progress.pending_steps().count(), 3);
    }

    #[test]
    fn pending_steps_hide_completed() {
        let mut progress = RouteProgress::new(test_route());
        progress.mark_step_completed(0);

        let pending: Vec<usize> = progress.pending_steps().map(|s| s.index).collect();
        assert_eq!(pending, vec![1, 2]);
    }

    #[test]
    fn remaining_distance_shrinks_as_steps_complete() {
        let mut progress = RouteProgress::new(test_route());
        let origin = Point::new(48.0, 16.0);

        let at_start = progress.remaining_distance_m(origin);
        assert!((at_start - 1500.0).abs() < 20.0, "got {at_start}");

        progress.mark_step_completed(0);
        let first_end = progress.route().steps[0].end;
        let after_one = progress.remaining_distance_m(first_end);
        assert!((after_one - 1000.0).abs() < 20.0, "got {after_one}");

        progress.advance_to_step(3);
        assert_eq!(progress.remaining_distance_m(origin), 0.0);
    }
}
