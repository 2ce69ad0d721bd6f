//! Campus geofence evaluation. Regions are loaded once from a JSON config
//! file and checked in declaration order; the first region containing a
//! point wins.

use std::fs;
use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A WGS84 coordinate pair, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Circle,
    Polygon,
}

impl Default for RegionKind {
    fn default() -> Self {
        RegionKind::Circle
    }
}

/// One configured region. Circle regions need the three center/radius
/// fields; polygon regions need at least three coordinate pairs. Entries
/// missing their required fields are skipped at evaluation time rather
/// than failing the whole config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceRegion {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: RegionKind,
    #[serde(default)]
    pub center_lat: Option<f64>,
    #[serde(default)]
    pub center_lon: Option<f64>,
    #[serde(default)]
    pub radius_meters: Option<f64>,
    #[serde(default)]
    pub coordinates: Vec<(f64, f64)>,
}

/// Identifies the region that matched a point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeofenceReport {
    pub within: bool,
    pub matched: Option<RegionRef>,
}

static REGIONS: OnceCell<Vec<GeofenceRegion>> = OnceCell::new();

/// Loads regions from the JSON file at `path`. A missing or malformed file
/// yields an empty region set (every point then evaluates as outside) and a
/// warning in the log.
pub fn load_regions(path: &Path) -> Vec<GeofenceRegion> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!(
                "geofence config {} unreadable ({e}); no regions active",
                path.display()
            );
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<GeofenceRegion>>(&raw) {
        Ok(regions) => {
            log::info!("loaded {} geofence region(s) from {}", regions.len(), path.display());
            regions
        }
        Err(e) => {
            log::warn!(
                "geofence config {} invalid ({e}); no regions active",
                path.display()
            );
            Vec::new()
        }
    }
}

/// Process-wide region set, loaded on first use from the configured path.
pub fn active_regions() -> &'static [GeofenceRegion] {
    REGIONS.get_or_init(|| load_regions(Path::new(&common::Config::get().geofence_config_path)))
}

/// Great-circle distance between two points, in meters.
pub fn haversine_meters(a: Point, b: Point) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

fn circle_contains(region: &GeofenceRegion, point: Point) -> Option<bool> {
    let (lat, lon, radius) = match (region.center_lat, region.center_lon, region.radius_meters) {
        (Some(lat), Some(lon), Some(radius)) => (lat, lon, radius),
        _ => return None,
    };
    Some(haversine_meters(point, Point { lat, lon }) <= radius)
}

/// Ray casting with an inclusive boundary: points on a vertex or edge count
/// as inside.
fn polygon_contains(vertices: &[(f64, f64)], point: Point) -> bool {
    const EPS: f64 = 1e-9;
    let (px, py) = (point.lat, point.lon);
    let n = vertices.len();
    let mut inside = false;
    for i in 0..n {
        let (x1, y1) = vertices[i];
        let (x2, y2) = vertices[(i + 1) % n];
        if on_segment((x1, y1), (x2, y2), (px, py), EPS) {
            return true;
        }
        if (y1 > py) != (y2 > py) {
            let x_cross = x1 + (py - y1) / (y2 - y1) * (x2 - x1);
            if px < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64), eps: f64) -> bool {
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    if cross.abs() > eps {
        return false;
    }
    let dot = (p.0 - a.0) * (b.0 - a.0) + (p.1 - a.1) * (b.1 - a.1);
    let len_sq = (b.0 - a.0).powi(2) + (b.1 - a.1).powi(2);
    dot >= -eps && dot <= len_sq + eps
}

/// True if the point falls in this region; `None` if the region is
/// malformed for its kind and must be skipped.
fn region_contains(region: &GeofenceRegion, point: Point) -> Option<bool> {
    match region.kind {
        RegionKind::Circle => circle_contains(region, point),
        RegionKind::Polygon => {
            if region.coordinates.len() < 3 {
                None
            } else {
                Some(polygon_contains(&region.coordinates, point))
            }
        }
    }
}

/// Checks regions in order and stops at the first match. Malformed regions
/// are skipped with a warning.
pub fn evaluate(point: Point, regions: &[GeofenceRegion]) -> GeofenceReport {
    for region in regions {
        match region_contains(region, point) {
            Some(true) => {
                return GeofenceReport {
                    within: true,
                    matched: Some(RegionRef {
                        id: region.id.clone(),
                        name: region.name.clone(),
                    }),
                };
            }
            Some(false) => {}
            None => {
                log::warn!("skipping malformed geofence region '{}'", region.id);
            }
        }
    }
    GeofenceReport {
        within: false,
        matched: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(id: &str, lat: f64, lon: f64, radius: f64) -> GeofenceRegion {
        GeofenceRegion {
            id: id.to_string(),
            name: format!("{id} region"),
            kind: RegionKind::Circle,
            center_lat: Some(lat),
            center_lon: Some(lon),
            radius_meters: Some(radius),
            coordinates: Vec::new(),
        }
    }

    fn square(id: &str) -> GeofenceRegion {
        GeofenceRegion {
            id: id.to_string(),
            name: format!("{id} region"),
            kind: RegionKind::Polygon,
            center_lat: None,
            center_lon: None,
            radius_meters: None,
            coordinates: vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)],
        }
    }

    #[test]
    fn haversine_zero_for_identical_points() {
        let p = Point { lat: -25.75, lon: 28.23 };
        assert_eq!(haversine_meters(p, p), 0.0);
    }

    #[test]
    fn haversine_one_degree_longitude_at_equator() {
        let a = Point { lat: 0.0, lon: 0.0 };
        let b = Point { lat: 0.0, lon: 1.0 };
        let d = haversine_meters(a, b);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn circle_containment_respects_radius() {
        let regions = vec![circle("campus", 0.0, 0.0, 150.0)];
        let near = Point { lat: 0.001, lon: 0.0 };
        let far = Point { lat: 0.01, lon: 0.0 };
        assert!(evaluate(near, &regions).within);
        assert!(!evaluate(far, &regions).within);
    }

    #[test]
    fn first_matching_region_wins() {
        let regions = vec![
            circle("outer", 0.0, 0.0, 10_000.0),
            circle("inner", 0.0, 0.0, 100_000.0),
        ];
        let report = evaluate(Point { lat: 0.01, lon: 0.0 }, &regions);
        assert_eq!(report.matched.unwrap().id, "outer");

        let reordered: Vec<_> = vec![regions[1].clone(), regions[0].clone()];
        let report = evaluate(Point { lat: 0.01, lon: 0.0 }, &reordered);
        assert_eq!(report.matched.unwrap().id, "inner");
    }

    #[test]
    fn polygon_boundary_is_inclusive() {
        let regions = vec![square("quad")];
        assert!(evaluate(Point { lat: 0.5, lon: 0.5 }, &regions).within);
        assert!(evaluate(Point { lat: 0.0, lon: 0.5 }, &regions).within);
        assert!(evaluate(Point { lat: 0.0, lon: 0.0 }, &regions).within);
        assert!(!evaluate(Point { lat: 1.5, lon: 0.5 }, &regions).within);
    }

    #[test]
    fn malformed_regions_are_skipped_not_fatal() {
        let mut broken = circle("broken", 0.0, 0.0, 100.0);
        broken.radius_meters = None;
        let mut degenerate = square("degenerate");
        degenerate.coordinates.truncate(2);
        let regions = vec![broken, degenerate, circle("ok", 0.0, 0.0, 1_000.0)];
        let report = evaluate(Point { lat: 0.0, lon: 0.0 }, &regions);
        assert!(report.within);
        assert_eq!(report.matched.unwrap().id, "ok");
    }

    #[test]
    fn zero_valued_center_is_still_valid() {
        let regions = vec![circle("origin", 0.0, 0.0, 500.0)];
        assert!(evaluate(Point { lat: 0.0, lon: 0.0 }, &regions).within);
    }

    #[test]
    fn empty_region_set_means_outside() {
        let report = evaluate(Point { lat: 1.0, lon: 1.0 }, &[]);
        assert!(!report.within);
        assert!(report.matched.is_none());
    }

    #[test]
    fn region_json_accepts_type_field_and_defaults() {
        let raw = r#"[
            {"id": "a", "name": "A", "type": "polygon",
             "coordinates": [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0]]},
            {"id": "b", "name": "B",
             "center_lat": 1.0, "center_lon": 2.0, "radius_meters": 30.0}
        ]"#;
        let regions: Vec<GeofenceRegion> = serde_json::from_str(raw).unwrap();
        assert_eq!(regions[0].kind, RegionKind::Polygon);
        assert_eq!(regions[1].kind, RegionKind::Circle);
        assert_eq!(regions[1].radius_meters, Some(30.0));
    }
}
