use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geo::Located;

/// A garage as returned by the provider endpoints. Only the fields the client
/// acts on are typed; everything else rides along in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Garage {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Located for Garage {
    fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GarageSearch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl GarageSearch {
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("service", self.service.as_deref()),
            ("vehicleType", self.vehicle_type.as_deref()),
            ("status", self.status.as_deref()),
            ("name", self.name.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| Some((key, value.filter(|v| !v.trim().is_empty())?)))
        .collect()
    }
}

/// Body of the address duplicate check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddressValidation {
    #[serde(alias = "exists", alias = "duplicate")]
    pub is_duplicate: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_unknown_fields_and_reads_coordinates() {
        let raw = r#"{
            "id": 3, "name": "Gara Minh Phát", "address": "12 Nguyễn Trãi",
            "latitude": 10.8231, "longitude": 106.6297,
            "rating": 4.5, "services": ["OIL_CHANGE"]
        }"#;
        let garage: Garage = serde_json::from_str(raw).unwrap();
        assert_eq!(garage.coordinates(), Some((10.8231, 106.6297)));
        assert!(garage.extra.contains_key("rating"));
        let back = serde_json::to_value(&garage).unwrap();
        assert_eq!(back["services"][0], "OIL_CHANGE");
    }

    #[test]
    fn missing_longitude_means_no_coordinates() {
        let garage: Garage = serde_json::from_str(r#"{"id": 1, "latitude": 10.0}"#).unwrap();
        assert_eq!(garage.coordinates(), None);
    }

    #[test]
    fn search_skips_blank_filters() {
        let search = GarageSearch {
            service: Some("TIRE".into()),
            name: Some("  ".into()),
            ..GarageSearch::default()
        };
        assert_eq!(search.query_pairs(), vec![("service", "TIRE")]);
    }

    #[test]
    fn validation_accepts_exists_alias() {
        let parsed: AddressValidation = serde_json::from_str(r#"{"exists": true}"#).unwrap();
        assert!(parsed.is_duplicate);
        assert!(parsed.message.is_none());
    }
}
