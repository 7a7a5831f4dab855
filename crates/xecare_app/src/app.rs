use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use xecare_domain::bell::BellView;
use xecare_domain::garage::Garage;
use xecare_domain::session::SessionStore;
use xecare_domain::{GeoRanker, RankingOptions, UserLocation};
use xecare_sync::geocode::{GeocodeConfig, Geocoder};
use xecare_sync::location::{LocationService, StaticLocationProvider};
use xecare_sync::session::refresh_profile;
use xecare_sync::{ApiClient, GarageApi, NotificationBus, NotificationSync, SessionError, SyncConfig};

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_SESSION_FILE: &str = ".xecare/session.json";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) api_base_url: String,
    pub(crate) session_file: PathBuf,
    pub(crate) sync: SyncConfig,
    pub(crate) location: Option<UserLocation>,
    pub(crate) ranking: RankingOptions,
    pub(crate) geocode: GeocodeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            sync: SyncConfig::default(),
            location: None,
            ranking: RankingOptions::default(),
            geocode: GeocodeConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Unparseable values are ignored and leave the default in place.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("XECARE_API_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.api_base_url = url.trim().to_string();
        }
        if let Some(path) = lookup("XECARE_SESSION_FILE").filter(|v| !v.trim().is_empty()) {
            config.session_file = PathBuf::from(path);
        }
        if let Some(secs) = lookup("XECARE_POLL_INTERVAL_SECS") {
            if let Ok(value) = secs.trim().parse::<u64>() {
                if value > 0 {
                    config.sync.poll_interval = Duration::from_secs(value);
                }
            }
        }
        if let Some(hold) = lookup("XECARE_BELL_HOLD_MS") {
            if let Ok(value) = hold.trim().parse::<u64>() {
                config.sync.bell_hold = Duration::from_millis(value);
            }
        }
        let latitude = lookup("XECARE_LATITUDE").and_then(|v| v.trim().parse::<f64>().ok());
        let longitude = lookup("XECARE_LONGITUDE").and_then(|v| v.trim().parse::<f64>().ok());
        if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
            if latitude.is_finite() && longitude.is_finite() {
                config.location = Some(UserLocation::new(latitude, longitude));
            }
        }
        if let Some(radius) = lookup("XECARE_MAX_DISTANCE_KM") {
            if let Ok(value) = radius.trim().parse::<f64>() {
                if value.is_finite() && value > 0.0 {
                    config.ranking.max_distance_km = value;
                }
            }
        }
        if let Some(url) = lookup("XECARE_NOMINATIM_URL").filter(|v| !v.trim().is_empty()) {
            config.geocode.base_url = url.trim().to_string();
        }
        if let Some(agent) = lookup("XECARE_USER_AGENT").filter(|v| !v.trim().is_empty()) {
            config.geocode.user_agent = agent.trim().to_string();
        }
        config
    }
}

pub fn run(config: AppConfig) -> Result<()> {
    info!(api = %config.api_base_url, "starting notification watcher");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(watch_notifications(config))
}

async fn watch_notifications(config: AppConfig) -> Result<()> {
    let store = SessionStore::new(&config.session_file);
    let Some(stored) = store.load()? else {
        bail!(
            "no session stored at {}, log in first",
            config.session_file.display()
        );
    };
    let api = Arc::new(ApiClient::new(config.api_base_url.clone())?.with_token(stored.token.clone()));

    let session = match refresh_profile(api.as_ref(), &store).await {
        Ok(session) => session,
        Err(SessionError::Expired) => bail!("session expired, please log in again"),
        Err(err) => {
            warn!(%err, "profile refresh failed, using stored profile");
            stored
        }
    };
    let identity = session.user.identity();
    info!(
        user_id = session.user.id,
        recipient = ?identity.recipient_type,
        "signed in"
    );

    if let Some(position) = config.location {
        if let Err(err) = report_nearby(api.as_ref(), &config, position).await {
            warn!(%err, "nearby garage lookup failed");
        }
    }

    let notifications =
        NotificationSync::new(api, identity, NotificationBus::new()).start(&config.sync);
    let mut bell = notifications.bell().subscribe();
    loop {
        tokio::select! {
            changed = bell.changed() => {
                if changed.is_err() {
                    break;
                }
                log_bell(&bell.borrow_and_update());
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(%err, "failed to listen for ctrl-c");
                }
                break;
            }
        }
    }
    notifications.shutdown().await;
    Ok(())
}

fn log_bell(view: &BellView) {
    info!(
        badge = view.badge.as_deref().unwrap_or("none"),
        ringing = view.ringing,
        "bell updated"
    );
}

async fn report_nearby<G: GarageApi>(
    api: &G,
    config: &AppConfig,
    position: UserLocation,
) -> Result<()> {
    let locator = LocationService::new(StaticLocationProvider::new(Some(position)));
    let here = locator.request_location(false).await?;

    match Geocoder::new(config.geocode.clone()) {
        Ok(geocoder) => match geocoder.reverse(&here).await {
            Ok(place) => info!(place = %place.display_name, "resolved current position"),
            Err(err) => debug!(%err, "reverse geocoding skipped"),
        },
        Err(err) => debug!(%err, "geocoder unavailable"),
    }

    let garages: Arc<[Garage]> = api
        .nearby(here.latitude, here.longitude, config.ranking.max_distance_km)
        .await?
        .into();
    let ranker = GeoRanker::new();
    let ranking = ranker.rank(&garages, Some(&here), config.ranking);
    info!(
        total = ranking.sorted_garages.len(),
        nearby = ranking.nearby_garages.len(),
        average_km = ranking.average_distance,
        "ranked garages"
    );
    for entry in &ranking.nearby_garages {
        info!(
            id = entry.garage.id,
            name = %entry.garage.name,
            distance_km = entry.distance_from_user,
            "nearby garage"
        );
    }
    Ok(())
}
