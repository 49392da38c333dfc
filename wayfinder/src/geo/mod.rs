//! Geometry kernel for route matching and heading derivation.
//!
//! Pure great-circle and projection math over WGS84 lat/lon degrees,
//! plus the [`RouteMatcher`] that keeps a sliding segment window so
//! per-fix matching stays O(window) instead of O(route length).
//!
//! # Design
//!
//! - Haversine with a fixed mean Earth radius for all distances
//! - Segment projection uses a cosine-scaled planar approximation,
//!   accurate for the short segments routing backends emit (< 10 km)
//! - Heading is derived from a look-ahead point 20-30 m down the
//!   route rather than the next vertex, which suppresses jitter from
//!   noisy fixes

use serde::{Deserialize, Serialize};

/// Earth radius in meters (WGS84 mean).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Default look-ahead distance for heading smoothing, in meters.
pub const DEFAULT_LOOKAHEAD_M: f64 = 25.0;

/// Default sliding window half-width, in segments.
pub const DEFAULT_WINDOW_SEGMENTS: usize = 100;

/// Windowed match distances beyond this bound trigger a full-route
/// re-search. Guards against window drift after a reroute or a large
/// GPS jump.
pub const WINDOW_SANITY_BOUND_M: f64 = 500.0;

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl Point {
    /// Creates a point from latitude/longitude degrees.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Result of projecting a point onto a segment.
#[derive(Debug, Clone, Copy)]
pub struct SegmentProjection {
    /// Perpendicular distance from the point to the segment, in meters.
    pub distance_m: f64,
    /// Closest point on the segment.
    pub nearest: Point,
    /// Position of the closest point along the segment, clamped to [0, 1].
    pub fraction: f64,
}

/// Haversine great-circle distance between two points, in meters.
///
/// Symmetric within floating-point tolerance and zero for identical
/// points.
pub fn haversine_distance(a: Point, b: Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Forward azimuth from `a` to `b` in degrees, normalized to [0, 360).
///
/// 0 = North, 90 = East.
pub fn bearing(a: Point, b: Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    let deg = y.atan2(x).to_degrees();
    (deg + 360.0) % 360.0
}

/// Projects a point onto the segment `a`-`b`.
///
/// Uses a planar approximation scaled by the latitude cosine; the
/// fraction is clamped to [0, 1] so the nearest point always lies on
/// the segment. A degenerate (zero-length) segment projects onto its
/// start point with fraction 0.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> SegmentProjection {
    let cos_lat = ((a.lat + b.lat) / 2.0).to_radians().cos();

    let dx = (b.lon - a.lon) * cos_lat;
    let dy = b.lat - a.lat;
    let px = (p.lon - a.lon) * cos_lat;
    let py = p.lat - a.lat;

    let seg_len_sq = dx * dx + dy * dy;

    let fraction = if seg_len_sq < 1e-20 {
        0.0
    } else {
        ((px * dx + py * dy) / seg_len_sq).clamp(0.0, 1.0)
    };

    let nearest = Point {
        lat: a.lat + fraction * (b.lat - a.lat),
        lon: a.lon + fraction * (b.lon - a.lon),
    };

    SegmentProjection {
        distance_m: haversine_distance(p, nearest),
        nearest,
        fraction,
    }
}

/// Total polyline length in meters.
pub fn path_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| haversine_distance(w[0], w[1])).sum()
}

/// Heading along the route from the rider's current position.
///
/// Walks forward along the geometry from the nearest on-route point
/// until `lookahead_m` meters have accumulated, then returns the
/// bearing from `origin` to that look-ahead point. Returns `None` for
/// geometries with fewer than two points or when the origin coincides
/// with the look-ahead point.
pub fn path_bearing(origin: Point, geometry: &[Point], lookahead_m: f64) -> Option<f64> {
    if geometry.len() < 2 {
        return None;
    }

    // Nearest segment by brute force; callers on the hot path use
    // look_ahead_bearing with a RouteMatcher result instead.
    let (segment_index, projection) = geometry
        .windows(2)
        .enumerate()
        .map(|(i, w)| (i, distance_to_segment(origin, w[0], w[1])))
        .min_by(|a, b| a.1.distance_m.total_cmp(&b.1.distance_m))?;

    look_ahead_bearing(geometry, segment_index, projection.nearest, origin, lookahead_m)
}

/// Heading toward a look-ahead point `lookahead_m` down the route.
///
/// `segment_index` and `nearest` come from a prior route match; the
/// walk starts at `nearest` and accumulates distance across the
/// remaining vertices.
pub fn look_ahead_bearing(
    geometry: &[Point],
    segment_index: usize,
    nearest: Point,
    origin: Point,
    lookahead_m: f64,
) -> Option<f64> {
    if geometry.len() < 2 || segment_index + 1 >= geometry.len() {
        return None;
    }

    let mut accumulated = 0.0;
    let mut cursor = nearest;
    let mut target = *geometry.last()?;

    for next in &geometry[segment_index + 1..] {
        let leg = haversine_distance(cursor, *next);
        if accumulated + leg >= lookahead_m {
            let remaining = lookahead_m - accumulated;
            let f = if leg > 0.0 { remaining / leg } else { 0.0 };
            target = Point {
                lat: cursor.lat + f * (next.lat - cursor.lat),
                lon: cursor.lon + f * (next.lon - cursor.lon),
            };
            break;
        }
        accumulated += leg;
        cursor = *next;
        target = *next;
    }

    if haversine_distance(origin, target) < 0.5 {
        return None; // too close for a stable bearing
    }

    Some(bearing(origin, target))
}

/// A successful route match.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch {
    /// Perpendicular distance from the fix to the route, in meters.
    pub distance_m: f64,
    /// Index of the matched segment's start vertex.
    pub segment_index: usize,
    /// Closest point on the route.
    pub nearest: Point,
    /// Whether the windowed search had to fall back to a full scan.
    pub full_search: bool,
}

/// Sliding-window nearest-route matcher.
///
/// Restricts the segment search to ±`window_segments` around the last
/// matched segment, re-centering each call. When the windowed best
/// distance exceeds the sanity bound the matcher falls back to a
/// full-route search, which recovers from window drift after a
/// reroute or a large GPS jump.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    last_segment: Option<usize>,
    window_segments: usize,
    sanity_bound_m: f64,
}

impl Default for RouteMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SEGMENTS)
    }
}

impl RouteMatcher {
    /// Creates a matcher with the given window half-width.
    pub fn new(window_segments: usize) -> Self {
        Self {
            last_segment: None,
            window_segments,
            sanity_bound_m: WINDOW_SANITY_BOUND_M,
        }
    }

    /// Overrides the full-search fallback bound.
    pub fn with_sanity_bound(mut self, bound_m: f64) -> Self {
        self.sanity_bound_m = bound_m;
        self
    }

    /// Forgets the window center. Call after replacing the route.
    pub fn reset(&mut self) {
        self.last_segment = None;
    }

    /// Finds the nearest point on the route to `point`.
    ///
    /// Returns `None` for geometries with fewer than two points.
    pub fn nearest_route_distance(&mut self, point: Point, geometry: &[Point]) -> Option<RouteMatch> {
        if geometry.len() < 2 {
            return None;
        }

        let segment_count = geometry.len() - 1;
        let (start, end) = match self.last_segment {
            Some(center) => (
                center.saturating_sub(self.window_segments),
                (center + self.window_segments + 1).min(segment_count),
            ),
            None => (0, segment_count),
        };

        let mut best = Self::scan(point, geometry, start, end)?;
        let mut full_search = false;

        // Windowed result too far out to trust: re-search everything.
        if best.distance_m > self.sanity_bound_m && (start > 0 || end < segment_count) {
            best = Self::scan(point, geometry, 0, segment_count)?;
            full_search = true;
        }

        self.last_segment = Some(best.segment_index);
        Some(RouteMatch {
            full_search,
            ..best
        })
    }

    fn scan(point: Point, geometry: &[Point], start: usize, end: usize) -> Option<RouteMatch> {
        let mut best: Option<RouteMatch> = None;

        for i in start..end {
            let projection = distance_to_segment(point, geometry[i], geometry[i + 1]);
            let better = match &best {
                Some(b) => projection.distance_m < b.distance_m,
                None => true,
            };
            if better {
                best = Some(RouteMatch {
                    distance_m: projection.distance_m,
                    segment_index: i,
                    nearest: projection.nearest,
                    full_search: false,
                });
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> Point {
        Point::new(lat, lon)
    }

    #[test]
    fn haversine_zero_for_same_point() {
        let p = pt(48.2082, 16.3738);
        assert!(haversine_distance(p, p).abs() < 0.01);
    }

    #[test]
    fn haversine_known_distance() {
        // Vienna to Bratislava ~55 km
        let vienna = pt(48.2082, 16.3738);
        let bratislava = pt(48.1486, 17.1077);
        let dist = haversine_distance(vienna, bratislava);
        assert!(
            dist > 50_000.0 && dist < 60_000.0,
            "Expected ~55 km, got {:.0} m",
            dist
        );
    }

    #[test]
    fn haversine_symmetric() {
        let a = pt(52.52, 13.405);
        let b = pt(48.8566, 2.3522);
        let d1 = haversine_distance(a, b);
        let d2 = haversine_distance(b, a);
        assert!((d1 - d2).abs() < 1e-6);
    }

    #[test]
    fn bearing_cardinal_directions() {
        assert!((bearing(pt(0.0, 0.0), pt(1.0, 0.0)) - 0.0).abs() < 0.1);
        assert!((bearing(pt(0.0, 0.0), pt(0.0, 1.0)) - 90.0).abs() < 0.1);
        assert!((bearing(pt(0.0, 0.0), pt(-1.0, 0.0)) - 180.0).abs() < 0.1);
        assert!((bearing(pt(0.0, 0.0), pt(0.0, -1.0)) - 270.0).abs() < 0.1);
    }

    #[test]
    fn segment_projection_midpoint() {
        // West-east segment, point directly north of its midpoint
        let result = distance_to_segment(pt(48.1, 16.5), pt(48.0, 16.0), pt(48.0, 17.0));
        assert!((result.nearest.lat - 48.0).abs() < 0.01);
        assert!((result.nearest.lon - 16.5).abs() < 0.01);
        assert!((result.fraction - 0.5).abs() < 0.01);
        assert!(result.distance_m > 10_000.0); // ~11 km north
    }

    #[test]
    fn segment_projection_clamps_before_start() {
        let result = distance_to_segment(pt(48.0, 15.5), pt(48.0, 16.0), pt(48.0, 17.0));
        assert_eq!(result.fraction, 0.0);
        let expected = haversine_distance(pt(48.0, 15.5), pt(48.0, 16.0));
        assert!((result.distance_m - expected).abs() < 1.0);
    }

    #[test]
    fn segment_projection_clamps_after_end() {
        let result = distance_to_segment(pt(48.0, 17.5), pt(48.0, 16.0), pt(48.0, 17.0));
        assert_eq!(result.fraction, 1.0);
        let expected = haversine_distance(pt(48.0, 17.5), pt(48.0, 17.0));
        assert!((result.distance_m - expected).abs() < 1.0);
    }

    #[test]
    fn segment_projection_degenerate_segment() {
        let a = pt(48.0, 16.0);
        let result = distance_to_segment(pt(48.1, 16.0), a, a);
        assert_eq!(result.fraction, 0.0);
        assert!((result.nearest.lat - 48.0).abs() < 1e-9);
    }

    #[test]
    fn path_length_sums_segments() {
        let path = vec![pt(0.0, 0.0), pt(0.0, 1.0), pt(0.0, 2.0)];
        let len = path_length(&path);
        // Each degree of longitude at the equator is ~111 km
        assert!(
            len > 200_000.0 && len < 230_000.0,
            "Expected ~222 km, got {:.0} m",
            len
        );
    }

    #[test]
    fn path_bearing_straight_route() {
        // Route heading due east; rider at the start
        let geometry = vec![pt(48.0, 16.0), pt(48.0, 16.001), pt(48.0, 16.002)];
        let b = path_bearing(pt(48.0, 16.0), &geometry, 25.0).unwrap();
        assert!((b - 90.0).abs() < 1.0, "Expected ~90, got {b}");
    }

    #[test]
    fn path_bearing_smooths_over_near_vertex() {
        // Sharp kink 5 m ahead; the 25 m look-ahead points past it
        let geometry = vec![
            pt(48.0, 16.0),
            pt(48.0, 16.00007), // ~5 m east
            pt(48.001, 16.00007),
        ];
        let b = path_bearing(pt(48.0, 16.0), &geometry, 25.0).unwrap();
        // Mostly north after the kink, definitely not due east
        assert!(b < 45.0 || b > 315.0, "Expected northish, got {b}");
    }

    #[test]
    fn path_bearing_none_for_short_geometry() {
        assert!(path_bearing(pt(48.0, 16.0), &[pt(48.0, 16.0)], 25.0).is_none());
    }

    #[test]
    fn matcher_finds_nearest_segment() {
        let geometry = vec![pt(48.0, 16.0), pt(48.0, 17.0), pt(49.0, 17.0)];
        let mut matcher = RouteMatcher::default();

        let m = matcher
            .nearest_route_distance(pt(48.5, 17.1), &geometry)
            .unwrap();
        assert_eq!(m.segment_index, 1);
        assert!((m.nearest.lon - 17.0).abs() < 0.01);
    }

    #[test]
    fn matcher_window_stays_local() {
        // Long straight route east; window 2 segments wide
        let geometry: Vec<Point> = (0..200).map(|i| pt(48.0, 16.0 + i as f64 * 0.001)).collect();
        let mut matcher = RouteMatcher::new(2).with_sanity_bound(f64::MAX);

        // Prime the window near the start
        let m = matcher
            .nearest_route_distance(pt(48.0001, 16.0035), &geometry)
            .unwrap();
        assert_eq!(m.segment_index, 3);

        // A fix far down the route is outside the window; without the
        // sanity fallback the matcher stays near its old center.
        let m = matcher
            .nearest_route_distance(pt(48.0001, 16.150), &geometry)
            .unwrap();
        assert!(m.segment_index <= 6);
        assert!(!m.full_search);
    }

    #[test]
    fn matcher_falls_back_to_full_search() {
        let geometry: Vec<Point> = (0..200).map(|i| pt(48.0, 16.0 + i as f64 * 0.001)).collect();
        let mut matcher = RouteMatcher::new(2);

        matcher.nearest_route_distance(pt(48.0001, 16.0035), &geometry);

        // ~16 km down the route: the windowed distance blows past the
        // sanity bound and the full search recovers the true segment.
        let m = matcher
            .nearest_route_distance(pt(48.0001, 16.1505), &geometry)
            .unwrap();
        assert!(m.full_search);
        assert_eq!(m.segment_index, 150);
        assert!(m.distance_m < 50.0);
    }

    #[test]
    fn matcher_reset_forgets_window() {
        let geometry: Vec<Point> = (0..50).map(|i| pt(48.0, 16.0 + i as f64 * 0.001)).collect();
        let mut matcher = RouteMatcher::new(2);

        matcher.nearest_route_distance(pt(48.0, 16.001), &geometry);
        matcher.reset();

        // Post-reset search is full-route and lands correctly.
        let m = matcher
            .nearest_route_distance(pt(48.0, 16.0405), &geometry)
            .unwrap();
        assert_eq!(m.segment_index, 40);
        assert!(!m.full_search);
    }

    #[test]
    fn matcher_rejects_short_geometry() {
        let mut matcher = RouteMatcher::default();
        assert!(matcher
            .nearest_route_distance(pt(48.0, 16.0), &[pt(48.0, 16.0)])
            .is_none());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn haversine_symmetry(
                lat1 in -80.0..80.0_f64,
                lon1 in -179.0..179.0_f64,
                lat2 in -80.0..80.0_f64,
                lon2 in -179.0..179.0_f64,
            ) {
                let a = Point::new(lat1, lon1);
                let b = Point::new(lat2, lon2);
                let d1 = haversine_distance(a, b);
                let d2 = haversine_distance(b, a);
                prop_assert!((d1 - d2).abs() < 1e-6, "asymmetric: {} vs {}", d1, d2);
            }

            #[test]
            fn haversine_identity(
                lat in -80.0..80.0_f64,
                lon in -179.0..179.0_f64,
            ) {
                let p = Point::new(lat, lon);
                prop_assert!(haversine_distance(p, p) < 1e-6);
            }

            #[test]
            fn bearing_in_range(
                lat1 in -80.0..80.0_f64,
                lon1 in -179.0..179.0_f64,
                lat2 in -80.0..80.0_f64,
                lon2 in -179.0..179.0_f64,
            ) {
                let b = bearing(Point::new(lat1, lon1), Point::new(lat2, lon2));
                prop_assert!((0.0..360.0).contains(&b), "bearing {} out of range", b);
            }

            #[test]
            fn projection_fraction_clamped(
                plat in -80.0..80.0_f64,
                plon in -179.0..179.0_f64,
                alat in -80.0..80.0_f64,
                alon in -179.0..179.0_f64,
                blat in -80.0..80.0_f64,
                blon in -179.0..179.0_f64,
            ) {
                let r = distance_to_segment(
                    Point::new(plat, plon),
                    Point::new(alat, alon),
                    Point::new(blat, blon),
                );
                prop_assert!((0.0..=1.0).contains(&r.fraction));
            }

            #[test]
            fn projection_no_worse_than_endpoints(
                lat in 40.0..50.0_f64,
                lon in 10.0..20.0_f64,
                // Offsets stay within ~1 km, the regime the planar
                // approximation is valid for (route segments are
                // short).
                pdlat in -0.01..0.01_f64,
                pdlon in -0.01..0.01_f64,
                adlat in -0.01..0.01_f64,
                adlon in -0.01..0.01_f64,
                bdlat in -0.01..0.01_f64,
                bdlon in -0.01..0.01_f64,
            ) {
                let p = Point::new(lat + pdlat, lon + pdlon);
                let a = Point::new(lat + adlat, lon + adlon);
                let b = Point::new(lat + bdlat, lon + bdlon);
                let r = distance_to_segment(p, a, b);
                let to_a = haversine_distance(p, a);
                let to_b = haversine_distance(p, b);
                // Planar approximation: allow a small tolerance
                prop_assert!(r.distance_m <= to_a.min(to_b) + 1.0);
            }
        }
    }
}
