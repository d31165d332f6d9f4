// Facility spatial index
// Static k-d tree over facility coordinates for nearest-neighbour and radius queries

// Two distance models are supported:
//   Planar      - locally linearized degrees, 1° ≈ 111 km in both axes (catalog screening default)
//   GreatCircle - points embedded on the unit sphere; chord length is monotonic in
//                 great-circle distance, so the same tree answers haversine queries
//
// Ties in distance resolve to the lowest facility id.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::climate_state::{FacilityId, GeoPoint};

pub const EARTH_RADIUS_KM: f64 = 6371.0088;  // Mean Earth radius (IUGG 2015)
pub const KM_PER_DEGREE: f64 = 111.0;        // Linearized degree length used for screening

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Planar,
    GreatCircle,
}

/// Haversine distance between two points (km)
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = (b.lat() - a.lat()).to_radians();
    let dlon = (b.lon() - a.lon()).to_radians();
    let lat1 = a.lat().to_radians();
    let lat2 = b.lat().to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Euclidean distance in degree space scaled to km
pub fn planar_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = b.lat() - a.lat();
    let dlon = b.lon() - a.lon();
    (dlat * dlat + dlon * dlon).sqrt() * KM_PER_DEGREE
}

impl DistanceMetric {
    pub fn distance_km(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        match self {
            Self::Planar => planar_km(a, b),
            Self::GreatCircle => haversine_km(a, b),
        }
    }

    fn dims(&self) -> usize {
        match self {
            Self::Planar => 2,
            Self::GreatCircle => 3,
        }
    }

    fn embed(&self, p: GeoPoint) -> [f64; 3] {
        match self {
            Self::Planar => [p.lon(), p.lat(), 0.0],
            Self::GreatCircle => {
                let (lat, lon) = (p.lat().to_radians(), p.lon().to_radians());
                [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
            }
        }
    }

    /// Squared embedded distance -> km
    fn to_km(&self, dist2: f64) -> f64 {
        match self {
            Self::Planar => dist2.sqrt() * KM_PER_DEGREE,
            Self::GreatCircle => {
                let half_chord = (dist2.sqrt() / 2.0).min(1.0);
                2.0 * EARTH_RADIUS_KM * half_chord.asin()
            }
        }
    }

    /// km -> squared embedded distance
    fn to_dist2(&self, km: f64) -> f64 {
        match self {
            Self::Planar => (km / KM_PER_DEGREE).powi(2),
            Self::GreatCircle => {
                let angle = km / EARTH_RADIUS_KM;
                if angle >= std::f64::consts::PI {
                    4.0
                } else {
                    (2.0 * (angle / 2.0).sin()).powi(2)
                }
            }
        }
    }
}

/// Inclusive lat/lon rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Build from the `(lon_min, lat_min, lon_max, lat_max)` order used by catalog tools
    pub fn from_lon_lat(lon_min: f64, lat_min: f64, lon_max: f64, lat_max: f64) -> Self {
        Self {
            min_lat: lat_min.min(lat_max),
            max_lat: lat_min.max(lat_max),
            min_lon: lon_min.min(lon_max),
            max_lon: lon_min.max(lon_max),
        }
    }

    pub fn contains(&self, p: GeoPoint) -> bool {
        let (lat, lon) = (p.lat(), p.lon());
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub facility_id: FacilityId,
    /// Position of the facility in the slice the index was built from
    pub slot: usize,
    pub distance_km: f64,
}

#[derive(Debug, Clone)]
struct IndexedPoint {
    coords: [f64; 3],
    facility_id: FacilityId,
    slot: usize,
}

/// Read-only after construction; safe to share between worker threads.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    metric: DistanceMetric,
    // Implicit balanced tree: node of [lo, hi) sits at the midpoint
    nodes: Vec<IndexedPoint>,
}

#[derive(Debug, Clone, Copy)]
struct Best {
    dist2: f64,
    facility_id: FacilityId,
    slot: usize,
}

impl Best {
    fn beaten_by(&self, dist2: f64, facility_id: FacilityId) -> bool {
        dist2 < self.dist2 || (dist2 == self.dist2 && facility_id < self.facility_id)
    }
}

impl SpatialIndex {
    pub fn build<I>(points: I, metric: DistanceMetric) -> Self
    where
        I: IntoIterator<Item = (FacilityId, GeoPoint)>,
    {
        let mut nodes: Vec<IndexedPoint> = points
            .into_iter()
            .enumerate()
            .map(|(slot, (facility_id, p))| IndexedPoint {
                coords: metric.embed(p),
                facility_id,
                slot,
            })
            .collect();

        Self::arrange(&mut nodes, 0, metric.dims());
        Self { metric, nodes }
    }

    fn arrange(nodes: &mut [IndexedPoint], depth: usize, dims: usize) {
        if nodes.len() <= 1 {
            return;
        }
        let axis = depth % dims;
        nodes.sort_by(|a, b| {
            a.coords[axis]
                .total_cmp(&b.coords[axis])
                .then(a.facility_id.cmp(&b.facility_id))
        });
        let mid = nodes.len() / 2;
        let (left, rest) = nodes.split_at_mut(mid);
        Self::arrange(left, depth + 1, dims);
        Self::arrange(&mut rest[1..], depth + 1, dims);
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nearest indexed facility, or `None` for an empty index
    pub fn nearest(&self, point: GeoPoint) -> Option<Neighbor> {
        let target = self.metric.embed(point);
        let mut best: Option<Best> = None;
        self.search_nearest(&target, 0, self.nodes.len(), 0, &mut best);

        best.map(|b| Neighbor {
            facility_id: b.facility_id,
            slot: b.slot,
            distance_km: self.metric.to_km(b.dist2),
        })
    }

    fn search_nearest(&self, target: &[f64; 3], lo: usize, hi: usize, depth: usize, best: &mut Option<Best>) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let node = &self.nodes[mid];
        let dist2 = squared_distance(&node.coords, target);

        let improves = match best {
            Some(b) => b.beaten_by(dist2, node.facility_id),
            None => true,
        };
        if improves {
            *best = Some(Best {
                dist2,
                facility_id: node.facility_id,
                slot: node.slot,
            });
        }

        let axis = depth % self.metric.dims();
        let diff = target[axis] - node.coords[axis];
        let (near, far) = if diff < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };

        self.search_nearest(target, near.0, near.1, depth + 1, best);
        // `<=` keeps equidistant candidates on the far side reachable for the id tie-break
        if best.map_or(true, |b| diff * diff <= b.dist2) {
            self.search_nearest(target, far.0, far.1, depth + 1, best);
        }
    }

    /// All facilities within `radius_km`, nearest first, ties by facility id
    pub fn within_radius(&self, point: GeoPoint, radius_km: f64) -> Vec<Neighbor> {
        if radius_km < 0.0 || !radius_km.is_finite() {
            return Vec::new();
        }
        let target = self.metric.embed(point);
        let limit = self.metric.to_dist2(radius_km);
        let mut found = Vec::new();
        self.search_radius(&target, limit, 0, self.nodes.len(), 0, &mut found);

        let mut neighbors: Vec<Neighbor> = found
            .into_iter()
            .map(|(dist2, idx)| {
                let node = &self.nodes[idx];
                Neighbor {
                    facility_id: node.facility_id,
                    slot: node.slot,
                    distance_km: self.metric.to_km(dist2),
                }
            })
            // the embedded bound is exact up to rounding; recheck in km
            .filter(|n| n.distance_km <= radius_km)
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(Ordering::Equal)
                .then(a.facility_id.cmp(&b.facility_id))
        });
        neighbors
    }

    fn search_radius(
        &self,
        target: &[f64; 3],
        limit: f64,
        lo: usize,
        hi: usize,
        depth: usize,
        found: &mut Vec<(f64, usize)>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let node = &self.nodes[mid];
        let dist2 = squared_distance(&node.coords, target);
        // small slack so boundary points survive to the km recheck
        if dist2 <= limit * (1.0 + 1e-9) {
            found.push((dist2, mid));
        }

        let axis = depth % self.metric.dims();
        let diff = target[axis] - node.coords[axis];
        if diff <= 0.0 || diff * diff <= limit {
            self.search_radius(target, limit, lo, mid, depth + 1, found);
        }
        if diff >= 0.0 || diff * diff <= limit {
            self.search_radius(target, limit, mid + 1, hi, depth + 1, found);
        }
    }
}

fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn grid_index(metric: DistanceMetric) -> (Vec<(FacilityId, GeoPoint)>, SpatialIndex) {
        let mut points = Vec::new();
        let mut id = 0;
        for i in 0..12 {
            for j in 0..9 {
                id += 1;
                points.push((FacilityId(id), point(20.0 + i as f64 * 0.37, 68.0 + j as f64 * 0.53)));
            }
        }
        let index = SpatialIndex::build(points.clone(), metric);
        (points, index)
    }

    #[test]
    fn test_haversine_known_distance() {
        // New York -> London
        let d = haversine_km(point(40.7128, -74.0060), point(51.5074, -0.1278));
        assert!((d - 5570.0).abs() < 10.0);
        assert_eq!(haversine_km(point(0.0, 0.0), point(0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_planar_degree_scaling() {
        assert_relative_eq!(planar_km(point(10.0, 10.0), point(11.0, 10.0)), 111.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        for metric in [DistanceMetric::Planar, DistanceMetric::GreatCircle] {
            let (points, index) = grid_index(metric);
            for k in 0..50 {
                let query = point(19.5 + k as f64 * 0.11, 67.7 + k as f64 * 0.097);
                let found = index.nearest(query).unwrap();

                let expected = points
                    .iter()
                    .map(|(id, p)| (metric.distance_km(query, *p), *id))
                    .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)))
                    .unwrap();

                assert_relative_eq!(found.distance_km, expected.0, epsilon = 1e-6);
                assert_eq!(found.facility_id, expected.1);
                assert_eq!(points[found.slot].0, found.facility_id);
            }
        }
    }

    #[test]
    fn test_tie_breaks_on_lowest_id() {
        // Two facilities equidistant from the query, inserted highest id first
        let points = vec![
            (FacilityId(9), point(10.0, 10.1)),
            (FacilityId(3), point(10.0, 9.9)),
        ];
        let index = SpatialIndex::build(points, DistanceMetric::Planar);
        let found = index.nearest(point(10.0, 10.0)).unwrap();
        assert_eq!(found.facility_id, FacilityId(3));
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::build(Vec::new(), DistanceMetric::Planar);
        assert!(index.is_empty());
        assert!(index.nearest(point(0.0, 0.0)).is_none());
        assert!(index.within_radius(point(0.0, 0.0), 100.0).is_empty());
    }

    #[test]
    fn test_within_radius_sorted() {
        let (points, index) = grid_index(DistanceMetric::GreatCircle);
        let query = point(21.0, 69.0);
        let found = index.within_radius(query, 60.0);

        let expected = points
            .iter()
            .filter(|(_, p)| haversine_km(query, *p) <= 60.0)
            .count();
        assert_eq!(found.len(), expected);
        assert!(found.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::from_lon_lat(68.0, 20.0, 72.0, 24.0);
        assert!(bbox.contains(point(22.0, 70.0)));
        assert!(bbox.contains(point(20.0, 72.0)));
        assert!(!bbox.contains(point(25.0, 70.0)));
    }
}
