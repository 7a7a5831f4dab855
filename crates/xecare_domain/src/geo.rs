//! Distance annotation and ranking of service providers around the user.

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl UserLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
        }
    }
}

/// Anything that may sit at a point on the map.
pub trait Located {
    fn coordinates(&self) -> Option<(f64, f64)>;
}

impl Located for UserLocation {
    fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude, self.longitude))
    }
}

/// Great-circle distance in kilometres, unrounded.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;
    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push `a` just past 1 near the antipode.
    let a = a.clamp(0.0, 1.0);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingOptions {
    pub max_distance_km: f64,
    pub sort_by_distance: bool,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            sort_by_distance: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GarageWithDistance<T> {
    #[serde(flatten)]
    pub garage: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_from_user: Option<f64>,
}

impl<T> GarageWithDistance<T> {
    fn unannotated(garage: T) -> Self {
        Self {
            garage,
            distance_from_user: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoRanking<T> {
    pub sorted_garages: Vec<GarageWithDistance<T>>,
    pub nearby_garages: Vec<GarageWithDistance<T>>,
    pub average_distance: f64,
}

/// Annotates every garage with its distance from `location`, then filters
/// and orders the result. The input slice is only read.
pub fn rank_garages<T>(
    garages: &[T],
    location: Option<&UserLocation>,
    options: RankingOptions,
) -> GeoRanking<T>
where
    T: Located + Clone,
{
    let Some(origin) = location.filter(|_| !garages.is_empty()) else {
        let untouched: Vec<_> = garages
            .iter()
            .cloned()
            .map(GarageWithDistance::unannotated)
            .collect();
        return GeoRanking {
            nearby_garages: untouched.clone(),
            sorted_garages: untouched,
            average_distance: 0.0,
        };
    };

    let origin = (origin.latitude, origin.longitude);
    let mut annotated: Vec<GarageWithDistance<T>> = garages
        .iter()
        .map(|garage| GarageWithDistance {
            distance_from_user: garage
                .coordinates()
                .filter(|(lat, lon)| lat.is_finite() && lon.is_finite())
                .map(|point| round2(haversine_km(origin, point))),
            garage: garage.clone(),
        })
        .collect();

    let distances: Vec<f64> = annotated
        .iter()
        .filter_map(|entry| entry.distance_from_user)
        .collect();
    let average_distance = if distances.is_empty() {
        0.0
    } else {
        round2(distances.iter().sum::<f64>() / distances.len() as f64)
    };

    if options.sort_by_distance {
        // `sort_by` is stable, equal distances keep their input order.
        annotated.sort_by(|a, b| compare_distance(a.distance_from_user, b.distance_from_user));
    }

    let nearby_garages = annotated
        .iter()
        .filter(|entry| {
            entry
                .distance_from_user
                .is_some_and(|distance| distance <= options.max_distance_km)
        })
        .cloned()
        .collect();

    GeoRanking {
        sorted_garages: annotated,
        nearby_garages,
        average_distance,
    }
}

fn compare_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

struct Memo<T> {
    garages: Arc<[T]>,
    location: Option<UserLocation>,
    options: RankingOptions,
    ranking: Arc<GeoRanking<T>>,
}

/// Caches the last ranking and recomputes only when the list (by identity),
/// the location or the options change.
pub struct GeoRanker<T> {
    memo: Mutex<Option<Memo<T>>>,
}

impl<T> Default for GeoRanker<T> {
    fn default() -> Self {
        Self {
            memo: Mutex::new(None),
        }
    }
}

impl<T: Located + Clone> GeoRanker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rank(
        &self,
        garages: &Arc<[T]>,
        location: Option<&UserLocation>,
        options: RankingOptions,
    ) -> Arc<GeoRanking<T>> {
        let mut memo = self.memo.lock();
        if let Some(cached) = memo.as_ref() {
            if Arc::ptr_eq(&cached.garages, garages)
                && cached.location.as_ref() == location
                && cached.options == options
            {
                return cached.ranking.clone();
            }
        }
        let ranking = Arc::new(rank_garages(garages, location, options));
        *memo = Some(Memo {
            garages: garages.clone(),
            location: location.copied(),
            options,
            ranking: ranking.clone(),
        });
        ranking
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Spot {
        name: &'static str,
        at: Option<(f64, f64)>,
    }

    impl Located for Spot {
        fn coordinates(&self) -> Option<(f64, f64)> {
            self.at
        }
    }

    fn spot(name: &'static str, lat: f64, lon: f64) -> Spot {
        Spot {
            name,
            at: Some((lat, lon)),
        }
    }

    #[test]
    fn haversine_is_symmetric_and_zero_on_self() {
        let a = (10.7769, 106.7009);
        let b = (21.0285, 105.8542);
        assert_eq!(haversine_km(a, a), 0.0);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
        // Ho Chi Minh City to Hanoi is a little over 1100 km.
        assert!((1130.0..1150.0).contains(&haversine_km(a, b)));
    }

    #[test]
    fn antipodal_points_stay_finite() {
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_KM;
        let user = (-88.91278, -178.93973);
        for (lat, lon) in [user, (0.0, 0.0), (45.0, 90.0), (-33.8688, 151.2093)] {
            let antipode = (-lat, if lon > 0.0 { lon - 180.0 } else { lon + 180.0 });
            let distance = haversine_km((lat, lon), antipode);
            assert!(distance.is_finite(), "({lat}, {lon})");
            assert!((distance - half_circumference).abs() < 1.0, "({lat}, {lon}) -> {distance}");
        }

        let garages = vec![spot("far", 88.91278, 1.06027), spot("near", -88.91278, -178.94)];
        let here = UserLocation::new(user.0, user.1);
        let ranking = rank_garages(&garages, Some(&here), RankingOptions::default());
        assert!(ranking.average_distance.is_finite());
        assert!(ranking
            .sorted_garages
            .iter()
            .all(|entry| entry.distance_from_user.is_some_and(f64::is_finite)));
    }

    #[test]
    fn no_location_returns_input_untouched() {
        let garages = vec![spot("a", 10.0, 106.0), spot("b", 11.0, 107.0)];
        let ranking = rank_garages(&garages, None, RankingOptions::default());
        let names: Vec<_> = ranking.sorted_garages.iter().map(|g| g.garage.name).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(ranking
            .sorted_garages
            .iter()
            .all(|g| g.distance_from_user.is_none()));
        assert_eq!(ranking.nearby_garages.len(), 2);
        assert_eq!(ranking.average_distance, 0.0);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let garages: Vec<Spot> = Vec::new();
        let here = UserLocation::new(10.0, 106.0);
        let ranking = rank_garages(&garages, Some(&here), RankingOptions::default());
        assert!(ranking.sorted_garages.is_empty());
        assert_eq!(ranking.average_distance, 0.0);
    }

    #[test]
    fn sorts_stably_and_puts_unknown_last() {
        let here = UserLocation::new(10.0, 106.0);
        let garages = vec![
            Spot { name: "nowhere", at: None },
            spot("far", 10.5, 106.0),
            spot("twin-1", 10.1, 106.0),
            spot("twin-2", 10.1, 106.0),
        ];
        let ranking = rank_garages(&garages, Some(&here), RankingOptions::default());
        let names: Vec<_> = ranking.sorted_garages.iter().map(|g| g.garage.name).collect();
        assert_eq!(names, ["twin-1", "twin-2", "far", "nowhere"]);
    }

    #[test]
    fn unsorted_mode_keeps_input_order() {
        let here = UserLocation::new(10.0, 106.0);
        let garages = vec![spot("far", 10.5, 106.0), spot("near", 10.1, 106.0)];
        let options = RankingOptions {
            sort_by_distance: false,
            ..RankingOptions::default()
        };
        let ranking = rank_garages(&garages, Some(&here), options);
        let names: Vec<_> = ranking.sorted_garages.iter().map(|g| g.garage.name).collect();
        assert_eq!(names, ["far", "near"]);
        assert!(ranking.sorted_garages[0].distance_from_user.is_some());
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let here = UserLocation::new(10.0, 106.0);
        let garages = vec![spot("edge", 10.1, 106.0), spot("out", 10.5, 106.0)];
        let edge = round2(haversine_km((10.0, 106.0), (10.1, 106.0)));
        let options = RankingOptions {
            max_distance_km: edge,
            ..RankingOptions::default()
        };
        let ranking = rank_garages(&garages, Some(&here), options);
        assert_eq!(ranking.nearby_garages.len(), 1);
        assert_eq!(ranking.nearby_garages[0].garage.name, "edge");
        assert!(ranking
            .nearby_garages
            .iter()
            .all(|g| g.distance_from_user.is_some_and(|d| d <= options.max_distance_km)));
    }

    #[test]
    fn average_covers_all_annotated_not_only_nearby() {
        let here = UserLocation::new(0.0, 0.0);
        let garages = vec![spot("a", 0.0, 0.1), spot("b", 0.0, 1.0)];
        let options = RankingOptions {
            max_distance_km: 20.0,
            ..RankingOptions::default()
        };
        let ranking = rank_garages(&garages, Some(&here), options);
        let expected = round2(
            (round2(haversine_km((0.0, 0.0), (0.0, 0.1)))
                + round2(haversine_km((0.0, 0.0), (0.0, 1.0))))
                / 2.0,
        );
        assert_eq!(ranking.nearby_garages.len(), 1);
        assert_eq!(ranking.average_distance, expected);
    }

    #[test]
    fn ranker_reuses_result_for_same_inputs() {
        let ranker = GeoRanker::new();
        let garages: Arc<[Spot]> = Arc::from(vec![spot("a", 10.1, 106.0)]);
        let here = UserLocation::new(10.0, 106.0);
        let first = ranker.rank(&garages, Some(&here), RankingOptions::default());
        let second = ranker.rank(&garages, Some(&here), RankingOptions::default());
        assert!(Arc::ptr_eq(&first, &second));

        let moved = UserLocation::new(10.05, 106.0);
        let third = ranker.rank(&garages, Some(&moved), RankingOptions::default());
        assert!(!Arc::ptr_eq(&first, &third));

        let copy: Arc<[Spot]> = Arc::from(garages.to_vec());
        let fourth = ranker.rank(&copy, Some(&moved), RankingOptions::default());
        assert!(!Arc::ptr_eq(&third, &fourth));
        assert_eq!(*third, *fourth);
    }
}
