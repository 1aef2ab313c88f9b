//! Geographic and Geometry Module
//!
//! Rooftop polygons in (longitude, latitude) degrees and the small set of
//! planar measurements the irradiance pipeline needs: shoelace area, centroid,
//! perimeter, longest edge orientation, containment and distance.
//!
//! Rooftops span tens of metres, so every metric quantity uses a local
//! equirectangular projection anchored at the polygon rather than a geodesic.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::GeometryError;

// ===================== CONSTANTS =====================

/// Metres per degree of latitude (and of longitude at the equator)
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Coordinates closer than this (in degrees) count as the same vertex
const VERTEX_EPSILON_DEG: f64 = 1e-12;

// ===================== TYPES =====================

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    fn same_as(&self, other: &LonLat) -> bool {
        (self.lon - other.lon).abs() < VERTEX_EPSILON_DEG
            && (self.lat - other.lat).abs() < VERTEX_EPSILON_DEG
    }
}

impl From<(f64, f64)> for LonLat {
    fn from((lon, lat): (f64, f64)) -> Self {
        Self { lon, lat }
    }
}

/// Equirectangular projection around a reference latitude.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    origin: LonLat,
    m_per_deg_lon: f64,
}

impl LocalProjection {
    pub fn new(origin: LonLat) -> Self {
        Self { origin, m_per_deg_lon: METERS_PER_DEGREE * origin.lat.to_radians().cos() }
    }

    /// Project to metres east (x) and north (y) of the origin.
    pub fn to_xy(&self, p: LonLat) -> (f64, f64) {
        (
            (p.lon - self.origin.lon) * self.m_per_deg_lon,
            (p.lat - self.origin.lat) * METERS_PER_DEGREE,
        )
    }

    /// Degrees of longitude spanned by `meters` at the origin latitude.
    pub fn meters_to_deg_lon(&self, meters: f64) -> f64 {
        if self.m_per_deg_lon.abs() < 1e-9 { 360.0 } else { meters / self.m_per_deg_lon }
    }

    /// Degrees of latitude spanned by `meters`.
    pub fn meters_to_deg_lat(&self, meters: f64) -> f64 {
        meters / METERS_PER_DEGREE
    }
}

/// Length and compass bearing of a polygon edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// Index of the edge's starting vertex
    pub start: usize,
    /// Edge length in metres
    pub length_m: f64,
    /// Bearing from start to end vertex (0 = North, 90 = East)
    pub azimuth_deg: f64,
}

/// Rooftop outline stored as a closed ring of (lon, lat) vertices.
///
/// Construction never fails; degenerate input is kept and measured as zero
/// area so that downstream models can fall back to neutral values. Callers
/// that need strict input use [`Polygon::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct Polygon {
    ring: Vec<LonLat>,
}

impl Polygon {
    /// Build a polygon from (lon, lat) pairs, closing the ring if needed.
    pub fn new<I, P>(coords: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LonLat>,
    {
        let mut ring: Vec<LonLat> = coords.into_iter().map(Into::into).collect();
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied())
            && ring.len() > 1
            && !first.same_as(&last)
        {
            ring.push(first);
        }
        Self { ring }
    }

    /// The closed ring (first vertex repeated at the end).
    pub fn ring(&self) -> &[LonLat] {
        &self.ring
    }

    /// Vertices without the closing duplicate, in original order.
    pub fn vertices(&self) -> &[LonLat] {
        match self.ring.len() {
            0 | 1 => &self.ring,
            n => &self.ring[..n - 1],
        }
    }

    /// Number of vertices that are not repeats of an earlier vertex.
    pub fn distinct_vertex_count(&self) -> usize {
        let vertices = self.vertices();
        vertices
            .iter()
            .enumerate()
            .filter(|(i, v)| !vertices[..*i].iter().any(|u| u.same_as(v)))
            .count()
    }

    /// Strict validation for callers that must reject bad rooftops up front.
    pub fn validate(&self) -> Result<(), GeometryError> {
        for (index, v) in self.vertices().iter().enumerate() {
            if !v.lon.is_finite() || !v.lat.is_finite() {
                return Err(GeometryError::NonFinite { index, lon: v.lon, lat: v.lat });
            }
            if !(-180.0..=180.0).contains(&v.lon) || !(-90.0..=90.0).contains(&v.lat) {
                return Err(GeometryError::OutOfRange { index, lon: v.lon, lat: v.lat });
            }
        }
        let distinct = self.distinct_vertex_count();
        if distinct < 3 {
            return Err(GeometryError::TooFewVertices(distinct));
        }
        Ok(())
    }

    /// Zero-area or under-specified outline.
    pub fn is_degenerate(&self) -> bool {
        self.distinct_vertex_count() < 3
            || self.signed_area_deg2().abs() < VERTEX_EPSILON_DEG.powi(2)
    }

    /// Signed shoelace area in square degrees (positive = counter-clockwise).
    pub fn signed_area_deg2(&self) -> f64 {
        if self.ring.len() < 4 {
            return 0.0;
        }
        let o = self.ring[0];
        self.ring
            .windows(2)
            .map(|w| {
                (w[0].lon - o.lon) * (w[1].lat - o.lat) - (w[1].lon - o.lon) * (w[0].lat - o.lat)
            })
            .sum::<f64>()
            / 2.0
    }

    /// Planar area in square metres.
    ///
    /// Shoelace area in square degrees scaled by the metres-per-degree of both
    /// axes at the mean vertex latitude. Returns 0 for fewer than 3 vertices.
    pub fn area_m2(&self) -> f64 {
        if self.distinct_vertex_count() < 3 {
            return 0.0;
        }
        let lat = self.vertex_mean().lat;
        let m2_per_deg2 = METERS_PER_DEGREE * METERS_PER_DEGREE * lat.to_radians().cos();
        self.signed_area_deg2().abs() * m2_per_deg2
    }

    /// Arithmetic mean of the vertices.
    pub fn vertex_mean(&self) -> LonLat {
        let vertices = self.vertices();
        if vertices.is_empty() {
            return LonLat::new(0.0, 0.0);
        }
        let n = vertices.len() as f64;
        LonLat::new(
            vertices.iter().map(|v| v.lon).sum::<f64>() / n,
            vertices.iter().map(|v| v.lat).sum::<f64>() / n,
        )
    }

    /// Area-weighted centroid; the vertex mean for degenerate outlines.
    pub fn centroid(&self) -> LonLat {
        let a = self.signed_area_deg2();
        if self.distinct_vertex_count() < 3 || a.abs() < VERTEX_EPSILON_DEG.powi(2) {
            return self.vertex_mean();
        }
        // Shift to the first vertex to keep the cross products well conditioned.
        let o = self.ring[0];
        let (mut cx, mut cy) = (0.0, 0.0);
        for w in self.ring.windows(2) {
            let (x0, y0) = (w[0].lon - o.lon, w[0].lat - o.lat);
            let (x1, y1) = (w[1].lon - o.lon, w[1].lat - o.lat);
            let cross = x0 * y1 - x1 * y0;
            cx += (x0 + x1) * cross;
            cy += (y0 + y1) * cross;
        }
        LonLat::new(o.lon + cx / (6.0 * a), o.lat + cy / (6.0 * a))
    }

    /// Projection anchored at the centroid.
    pub fn projection(&self) -> LocalProjection {
        LocalProjection::new(self.centroid())
    }

    /// Edges in vertex order, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        let proj = self.projection();
        let vertices = self.vertices();
        let n = if vertices.len() < 2 { 0 } else { vertices.len() };
        (0..n).map(move |i| {
            let (x0, y0) = proj.to_xy(vertices[i]);
            let (x1, y1) = proj.to_xy(vertices[(i + 1) % n]);
            let (dx, dy) = (x1 - x0, y1 - y0);
            Edge {
                start: i,
                length_m: dx.hypot(dy),
                azimuth_deg: normalize_azimuth(dx.atan2(dy).to_degrees()),
            }
        })
    }

    /// Longest edge; the first one wins ties.
    pub fn longest_edge(&self) -> Option<Edge> {
        self.edges().fold(None, |best: Option<Edge>, edge| match best {
            Some(b) if edge.length_m <= b.length_m => Some(b),
            _ => Some(edge),
        })
    }

    /// Perimeter in metres.
    pub fn perimeter_m(&self) -> f64 {
        self.edges().map(|e| e.length_m).sum()
    }

    /// Even-odd point-in-polygon test in lon/lat space.
    pub fn contains(&self, p: LonLat) -> bool {
        let vertices = self.vertices();
        if vertices.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = vertices.len() - 1;
        for i in 0..vertices.len() {
            let (vi, vj) = (vertices[i], vertices[j]);
            if (vi.lat > p.lat) != (vj.lat > p.lat)
                && p.lon < (vj.lon - vi.lon) * (p.lat - vi.lat) / (vj.lat - vi.lat) + vi.lon
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Distance in metres from `p` to the outline; 0 inside the polygon.
    pub fn distance_m(&self, p: LonLat) -> f64 {
        if self.contains(p) {
            return 0.0;
        }
        let vertices = self.vertices();
        let proj = self.projection();
        let (px, py) = proj.to_xy(p);
        match vertices.len() {
            0 => f64::INFINITY,
            1 => {
                let (x, y) = proj.to_xy(vertices[0]);
                (px - x).hypot(py - y)
            }
            n => (0..n)
                .map(|i| {
                    let a = proj.to_xy(vertices[i]);
                    let b = proj.to_xy(vertices[(i + 1) % n]);
                    point_segment_distance((px, py), a, b)
                })
                .fold(f64::INFINITY, f64::min),
        }
    }

    /// (min_lon, min_lat, max_lon, max_lat), or None for an empty polygon.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let first = self.ring.first()?;
        Some(self.ring.iter().fold(
            (first.lon, first.lat, first.lon, first.lat),
            |(x0, y0, x1, y1), v| (x0.min(v.lon), y0.min(v.lat), x1.max(v.lon), y1.max(v.lat)),
        ))
    }
}

impl From<Vec<(f64, f64)>> for Polygon {
    fn from(coords: Vec<(f64, f64)>) -> Self {
        Polygon::new(coords)
    }
}

impl From<Polygon> for Vec<(f64, f64)> {
    fn from(polygon: Polygon) -> Self {
        polygon.ring.into_iter().map(|v| (v.lon, v.lat)).collect()
    }
}

// ===================== GEOMETRY FUNCTIONS =====================

/// Wrap an angle into [0, 360).
pub fn normalize_azimuth(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Smallest angle between two bearings, in [0, 180].
pub fn angular_difference(a_deg: f64, b_deg: f64) -> f64 {
    let diff = (a_deg - b_deg).rem_euclid(360.0);
    if diff > 180.0 { 360.0 - diff } else { diff }
}

/// Area of a polygon grown outward by `radius_m`.
///
/// Steiner's formula, exact for convex outlines and a close estimate for
/// typical rooftops: A + P·r + π·r².
pub fn buffered_area_m2(area_m2: f64, perimeter_m: f64, radius_m: f64) -> f64 {
    let r = radius_m.max(0.0);
    area_m2 + perimeter_m * r + PI * r * r
}

fn point_segment_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0)
    };
    (p.0 - (a.0 + t * dx)).hypot(p.1 - (a.1 + t * dy))
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;

    /// Axis-aligned square of `side_m` metres with its south-west corner at (lon, lat).
    fn square(lon: f64, lat: f64, side_m: f64) -> Polygon {
        let d_lat = side_m / METERS_PER_DEGREE;
        let d_lon = side_m / (METERS_PER_DEGREE * (lat + d_lat / 2.0).to_radians().cos());
        Polygon::new([
            (lon, lat),
            (lon + d_lon, lat),
            (lon + d_lon, lat + d_lat),
            (lon, lat + d_lat),
        ])
    }

    #[test]
    fn test_ring_is_closed_once() {
        let open = Polygon::new([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]);
        assert_eq!(open.ring().len(), 4);
        assert_eq!(open.vertices().len(), 3);

        let closed = Polygon::new([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        assert_eq!(closed.ring().len(), 4, "Already-closed ring must not gain a vertex");
        assert_eq!(open, closed);
    }

    #[test]
    fn test_square_area_matches_analytic() {
        for (lat, side) in [(0.0, 10.0), (13.67, 30.0), (45.0, 100.0), (60.0, 20.0)] {
            let area = square(100.0, lat, side).area_m2();
            let expected = side * side;
            assert!(
                (area - expected).abs() / expected < 1e-3,
                "Square {}m at lat {}: area {} != {}",
                side,
                lat,
                area,
                expected
            );
        }
    }

    #[test]
    fn test_signed_area_orientation() {
        let ccw = Polygon::new([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let cw = Polygon::new([(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]);
        assert!((ccw.signed_area_deg2() - 1.0).abs() < 1e-12);
        assert!((cw.signed_area_deg2() + 1.0).abs() < 1e-12);
        assert!((ccw.area_m2() - cw.area_m2()).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_polygons_measure_zero() {
        let two = Polygon::new([(0.0, 0.0), (1.0, 1.0)]);
        assert_eq!(two.area_m2(), 0.0);
        assert!(two.is_degenerate());
        assert_eq!(two.validate(), Err(GeometryError::TooFewVertices(2)));

        let collinear = Polygon::new([(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert!(collinear.area_m2().abs() < 1e-6);
        assert!(collinear.is_degenerate());
        assert!(collinear.validate().is_ok(), "Collinear outline is detectable, not invalid");

        let repeated = Polygon::new([(0.0, 0.0), (0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        assert_eq!(repeated.distinct_vertex_count(), 2);

        assert_eq!(Polygon::new(Vec::<(f64, f64)>::new()).area_m2(), 0.0);
    }

    #[test]
    fn test_validate_rejects_bad_coordinates() {
        let nan = Polygon::new([(0.0, 0.0), (f64::NAN, 0.0), (1.0, 1.0)]);
        assert!(matches!(nan.validate(), Err(GeometryError::NonFinite { index: 1, .. })));

        let out = Polygon::new([(0.0, 0.0), (1.0, 95.0), (1.0, 1.0)]);
        assert!(matches!(out.validate(), Err(GeometryError::OutOfRange { index: 1, .. })));
    }

    #[test]
    fn test_centroid_is_area_weighted() {
        let sq = Polygon::new([(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]);
        let c = sq.centroid();
        assert!((c.lon - 1.0).abs() < 1e-12 && (c.lat - 1.0).abs() < 1e-12);

        // Area-weighted centroid differs from the vertex mean for uneven vertex spacing
        let rect = Polygon::new([(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (2.0, 1.0), (0.0, 1.0)]);
        let c = rect.centroid();
        assert!((c.lon - 1.0).abs() < 1e-12, "centroid lon {}", c.lon);
        assert!((rect.vertex_mean().lon - 1.0).abs() < 1e-12);
        assert!((c.lat - 0.5).abs() < 1e-12, "centroid lat {}", c.lat);
        assert!((rect.vertex_mean().lat - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_longest_edge_orientation() {
        // 40 m east-west by 10 m north-south rectangle
        let lat: f64 = 13.67;
        let d_lat = 10.0 / METERS_PER_DEGREE;
        let d_lon = 40.0 / (METERS_PER_DEGREE * lat.to_radians().cos());
        let rect = Polygon::new([
            (100.0, lat),
            (100.0 + d_lon, lat),
            (100.0 + d_lon, lat + d_lat),
            (100.0, lat + d_lat),
        ]);

        let edge = rect.longest_edge().unwrap();
        assert_eq!(edge.start, 0, "First of the two equal long edges wins");
        assert!((edge.length_m - 40.0).abs() < 0.1, "length {}", edge.length_m);
        assert!((edge.azimuth_deg - 90.0).abs() < 0.1, "azimuth {}", edge.azimuth_deg);
        assert!((rect.perimeter_m() - 100.0).abs() < 0.2);
    }

    #[test]
    fn test_projection_origin_is_centroid() {
        let rect = Polygon::new([(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (2.0, 1.0), (0.0, 1.0)]);
        let (x, y) = rect.projection().to_xy(rect.centroid());
        assert!(x.abs() < 1e-9 && y.abs() < 1e-9, "centroid projects to ({}, {})", x, y);

        let (_, y) = rect.projection().to_xy(rect.vertex_mean());
        assert!(y < -1_000.0, "vertex mean sits south of the origin, y = {}", y);
    }

    #[test]
    fn test_contains_and_distance() {
        let sq = square(100.0, 13.0, 100.0);
        let c = sq.centroid();
        assert!(sq.contains(c));
        assert_eq!(sq.distance_m(c), 0.0);

        // 50 m east of the east edge
        let (_, _, max_lon, _) = sq.bounds().unwrap();
        let outside = LonLat::new(max_lon + sq.projection().meters_to_deg_lon(50.0), c.lat);
        assert!(!sq.contains(outside));
        let d = sq.distance_m(outside);
        assert!((d - 50.0).abs() < 0.5, "distance {}", d);
    }

    #[test]
    fn test_angle_helpers() {
        assert_eq!(normalize_azimuth(-90.0), 270.0);
        assert_eq!(normalize_azimuth(360.0), 0.0);
        assert_eq!(angular_difference(350.0, 10.0), 20.0);
        assert_eq!(angular_difference(0.0, 180.0), 180.0);
        assert_eq!(angular_difference(90.0, 90.0), 0.0);
    }

    #[test]
    fn test_buffered_area_grows_with_radius() {
        assert_eq!(buffered_area_m2(100.0, 40.0, 0.0), 100.0);
        let a = buffered_area_m2(100.0, 40.0, 10.0);
        assert!((a - (100.0 + 400.0 + PI * 100.0)).abs() < 1e-9);
        assert_eq!(buffered_area_m2(100.0, 40.0, -5.0), 100.0);
    }

    #[test]
    fn test_polygon_serde_as_coordinate_pairs() {
        let p: Polygon = serde_json::from_str("[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]").unwrap();
        assert_eq!(p.ring().len(), 4);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,0.0]]");
    }
}
