use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{info, instrument, warn};

use xecare_domain::location::{LocationError, LocationErrorCode, LocationState, PositionOptions};
use xecare_domain::UserLocation;

/// The permission-gated platform API that knows where the device is.
pub trait LocationProvider: Send + Sync + 'static {
    fn current_position(
        &self,
        options: PositionOptions,
    ) -> impl Future<Output = Result<UserLocation, LocationErrorCode>> + Send;
}

/// Provider for hosts without positioning hardware: answers with a configured
/// position, or reports the platform as unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticLocationProvider {
    position: Option<UserLocation>,
}

impl StaticLocationProvider {
    pub fn new(position: Option<UserLocation>) -> Self {
        Self { position }
    }
}

impl LocationProvider for StaticLocationProvider {
    async fn current_position(
        &self,
        _options: PositionOptions,
    ) -> Result<UserLocation, LocationErrorCode> {
        self.position.ok_or(LocationErrorCode::Unsupported)
    }
}

type Outcome = Result<UserLocation, LocationError>;

/// Location acquisition with a single in-flight platform request.
pub struct LocationService<P> {
    provider: P,
    state: RwLock<LocationState>,
    /// Holds the outcome of the last completed platform request.
    in_flight: tokio::sync::Mutex<Option<Outcome>>,
    completed: AtomicU64,
}

impl<P: LocationProvider> LocationService<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            state: RwLock::new(LocationState::default()),
            in_flight: tokio::sync::Mutex::new(None),
            completed: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> LocationState {
        self.state.read().clone()
    }

    pub fn location(&self) -> Option<UserLocation> {
        self.state.read().location
    }

    /// Asks the platform for the current position. Callers that overlap an
    /// in-flight request receive that request's outcome. Never retries.
    #[instrument(skip(self))]
    pub async fn request_location(&self, fresh: bool) -> Outcome {
        let seen = self.completed.load(Ordering::SeqCst);
        let mut last = self.in_flight.lock().await;
        if self.completed.load(Ordering::SeqCst) != seen {
            if let Some(outcome) = last.as_ref() {
                return outcome.clone();
            }
        }

        self.state.write().loading = true;
        let options = PositionOptions::for_request(fresh);
        let result =
            match tokio::time::timeout(options.timeout, self.provider.current_position(options))
                .await
            {
                Ok(Ok(location)) => Ok(location),
                Ok(Err(code)) => Err(LocationError::from(code)),
                Err(_) => Err(LocationError::from(LocationErrorCode::Timeout)),
            };

        {
            let mut state = self.state.write();
            state.loading = false;
            match &result {
                Ok(location) => {
                    info!(
                        latitude = location.latitude,
                        longitude = location.longitude,
                        "location acquired"
                    );
                    state.location = Some(*location);
                    state.error = None;
                }
                Err(error) => {
                    warn!(code = error.code.code(), "location request failed");
                    state.error = Some(error.clone());
                }
            }
        }
        *last = Some(result.clone());
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    pub fn clear_location(&self) {
        let mut state = self.state.write();
        state.location = None;
        state.error = None;
    }
}
