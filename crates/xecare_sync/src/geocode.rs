//! Forward and reverse geocoding against a Nominatim instance.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, instrument, warn};

use xecare_domain::geo::Located;
use xecare_domain::UserLocation;

use crate::error::GeocodeError;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = "xecare-client/0.1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeConfig {
    pub base_url: String,
    pub user_agent: String,
    pub country_codes: Option<String>,
    pub limit: u8,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_NOMINATIM_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            country_codes: Some("vn".to_string()),
            limit: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
}

impl Located for Place {
    fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude, self.longitude))
    }
}

// Nominatim sends coordinates as strings.
#[derive(Debug, Deserialize)]
struct RawPlace {
    lat: String,
    lon: String,
    display_name: String,
}

impl RawPlace {
    fn parse(self) -> Option<Place> {
        Some(Place {
            latitude: self.lat.trim().parse().ok()?,
            longitude: self.lon.trim().parse().ok()?,
            display_name: self.display_name,
        })
    }
}

pub struct Geocoder {
    http: reqwest::Client,
    config: GeocodeConfig,
}

impl Geocoder {
    pub fn new(config: GeocodeConfig) -> Result<Self, GeocodeError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(GeocodeError::Service)?;
        Ok(Self { http, config })
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<Place>, GeocodeError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(GeocodeError::Unresolved);
        }
        let mut params = vec![
            ("q", query.to_string()),
            ("format", "json".to_string()),
            ("addressdetails", "1".to_string()),
            ("limit", self.config.limit.to_string()),
        ];
        if let Some(codes) = &self.config.country_codes {
            params.push(("countrycodes", codes.clone()));
        }
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let body = self.get(&url, &params).await?;
        let places = parse_search(&body)?;
        debug!(hits = places.len(), "forward geocoding finished");
        Ok(places)
    }

    /// First hit of [`search`](Self::search).
    pub async fn resolve(&self, query: &str) -> Result<Place, GeocodeError> {
        self.search(query)
            .await?
            .into_iter()
            .next()
            .ok_or(GeocodeError::Unresolved)
    }

    #[instrument(skip(self))]
    pub async fn reverse(&self, location: &UserLocation) -> Result<Place, GeocodeError> {
        let params = [
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
            ("format", "json".to_string()),
        ];
        let url = format!("{}/reverse", self.config.base_url.trim_end_matches('/'));
        let body = self.get(&url, &params).await?;
        parse_reverse(&body)
    }

    async fn get(&self, url: &str, params: &[(&str, String)]) -> Result<Vec<u8>, GeocodeError> {
        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "geocoding request failed");
                return Err(GeocodeError::Service(err));
            }
        };
        match response.bytes().await {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(err) => {
                warn!(%err, "geocoding response unreadable");
                Err(GeocodeError::Service(err))
            }
        }
    }
}

fn parse_search(body: &[u8]) -> Result<Vec<Place>, GeocodeError> {
    let raw: Vec<RawPlace> = serde_json::from_slice(body).map_err(|err| {
        warn!(%err, "unexpected geocoding payload");
        GeocodeError::Unresolved
    })?;
    let places: Vec<Place> = raw.into_iter().filter_map(RawPlace::parse).collect();
    if places.is_empty() {
        return Err(GeocodeError::Unresolved);
    }
    Ok(places)
}

fn parse_reverse(body: &[u8]) -> Result<Place, GeocodeError> {
    serde_json::from_slice::<RawPlace>(body)
        .map_err(|err| {
            warn!(%err, "reverse geocoding found nothing");
            GeocodeError::Unresolved
        })?
        .parse()
        .ok_or(GeocodeError::Unresolved)
}
