//! HTTP collaborators of the client core.
//!
//! The traits are what the rest of the crate depends on; [`ApiClient`] is the
//! `reqwest` implementation talking to the XeCare backend.

use std::future::Future;
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use xecare_domain::garage::{AddressValidation, Garage, GarageSearch};
use xecare_domain::session::StoredUser;
use xecare_domain::NotificationRecord;

use crate::error::ApiError;

pub const DEFAULT_PROFILE_PATH: &str = "/apis/auth/me";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub trait NotificationApi: Send + Sync + 'static {
    fn my_notifications(
        &self,
    ) -> impl Future<Output = Result<Vec<NotificationRecord>, ApiError>> + Send;

    fn unread_count(&self) -> impl Future<Output = Result<u32, ApiError>> + Send;

    fn mark_as_read(&self, id: i64) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn mark_all_as_read(&self) -> impl Future<Output = Result<(), ApiError>> + Send;
}

pub trait GarageApi: Send + Sync + 'static {
    fn nearby(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    ) -> impl Future<Output = Result<Vec<Garage>, ApiError>> + Send;

    fn search(
        &self,
        filters: &GarageSearch,
    ) -> impl Future<Output = Result<Vec<Garage>, ApiError>> + Send;

    /// Duplicate-address check; `garage_id` switches to edit mode so a garage
    /// is not reported as a duplicate of itself.
    fn check_address(
        &self,
        address: &str,
        garage_id: Option<i64>,
    ) -> impl Future<Output = Result<AddressValidation, ApiError>> + Send;
}

pub trait ProfileApi: Send + Sync + 'static {
    fn profile(&self) -> impl Future<Output = Result<StoredUser, ApiError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    profile_path: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            profile_path: DEFAULT_PROFILE_PATH.to_string(),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_profile_path(mut self, path: impl Into<String>) -> Self {
        self.profile_path = path.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.token.as_deref().ok_or(ApiError::MissingToken)?;
        Ok(request.bearer_auth(token))
    }

    async fn fetch<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
        let body = Self::execute(request).await?;
        decode(&body)
    }

    async fn execute(request: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized(status));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

impl NotificationApi for ApiClient {
    #[instrument(skip(self))]
    async fn my_notifications(&self) -> Result<Vec<NotificationRecord>, ApiError> {
        let request = self.authorized(self.http.get(self.url("/apis/notifications/me")))?;
        let records: Vec<NotificationRecord> = Self::fetch(request).await?;
        debug!(count = records.len(), "notifications fetched");
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn unread_count(&self) -> Result<u32, ApiError> {
        let request =
            self.authorized(self.http.get(self.url("/apis/notifications/me/unread-count")))?;
        let body: UnreadCountBody = Self::fetch(request).await?;
        Ok(body.count())
    }

    #[instrument(skip(self))]
    async fn mark_as_read(&self, id: i64) -> Result<(), ApiError> {
        let path = format!("/apis/notifications/{id}/read");
        let request = self.authorized(self.http.post(self.url(&path)))?;
        Self::execute(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_all_as_read(&self) -> Result<(), ApiError> {
        let request =
            self.authorized(self.http.post(self.url("/apis/notifications/mark-all-read")))?;
        Self::execute(request).await?;
        Ok(())
    }
}

impl GarageApi for ApiClient {
    #[instrument(skip(self))]
    async fn nearby(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    ) -> Result<Vec<Garage>, ApiError> {
        let request = self.http.get(self.url("/apis/garage/nearby")).query(&[
            ("latitude", latitude),
            ("longitude", longitude),
            ("radius", radius_km),
        ]);
        Self::fetch(request).await
    }

    #[instrument(skip(self))]
    async fn search(&self, filters: &GarageSearch) -> Result<Vec<Garage>, ApiError> {
        let request = self
            .http
            .get(self.url("/apis/garage/search/advanced"))
            .query(&filters.query_pairs());
        Self::fetch(request).await
    }

    #[instrument(skip(self))]
    async fn check_address(
        &self,
        address: &str,
        garage_id: Option<i64>,
    ) -> Result<AddressValidation, ApiError> {
        let request = match garage_id {
            Some(garage_id) => self
                .http
                .get(self.url("/apis/garage/validation/address/edit"))
                .query(&[("address", address.to_string()), ("garageId", garage_id.to_string())]),
            None => self
                .http
                .get(self.url("/apis/garage/validation/address"))
                .query(&[("address", address)]),
        };
        Self::fetch(request).await
    }
}

impl ProfileApi for ApiClient {
    #[instrument(skip(self))]
    async fn profile(&self) -> Result<StoredUser, ApiError> {
        let request = self.authorized(self.http.get(self.url(&self.profile_path)))?;
        Self::fetch(request).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UnreadCountBody {
    Bare(u32),
    Count { count: u32 },
    Unread {
        #[serde(rename = "unreadCount")]
        unread_count: u32,
    },
}

impl UnreadCountBody {
    fn count(&self) -> u32 {
        match *self {
            Self::Bare(count) | Self::Count { count } => count,
            Self::Unread { unread_count } => unread_count,
        }
    }
}

/// Reads a body that is either the payload itself or `{ "data": payload }`.
fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let value: Value = serde_json::from_slice(body)?;
    match serde_json::from_value::<T>(value.clone()) {
        Ok(parsed) => Ok(parsed),
        Err(err) => match value.get("data") {
            Some(inner) => Ok(serde_json::from_value(inner.clone())?),
            None => Err(err.into()),
        },
    }
}
