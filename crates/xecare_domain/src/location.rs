use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::UserLocation;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const FRESH_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
pub const MAXIMUM_AGE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum LocationErrorCode {
    Unsupported,
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

impl LocationErrorCode {
    pub fn code(self) -> u8 {
        match self {
            Self::Unsupported => 0,
            Self::PermissionDenied => 1,
            Self::PositionUnavailable => 2,
            Self::Timeout => 3,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Unsupported => "Location is not supported on this device.",
            Self::PermissionDenied => {
                "Location permission was denied. Allow location access to find nearby garages."
            }
            Self::PositionUnavailable => "Your current position is unavailable. Try again later.",
            Self::Timeout => "Locating you took too long. Please try again.",
        }
    }
}

impl From<LocationErrorCode> for u8 {
    fn from(code: LocationErrorCode) -> Self {
        code.code()
    }
}

impl TryFrom<u8> for LocationErrorCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unsupported),
            1 => Ok(Self::PermissionDenied),
            2 => Ok(Self::PositionUnavailable),
            3 => Ok(Self::Timeout),
            other => Err(format!("unknown location error code {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LocationError {
    pub code: LocationErrorCode,
    pub message: String,
}

impl From<LocationErrorCode> for LocationError {
    fn from(code: LocationErrorCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
        }
    }
}

/// Hints handed to the platform provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl PositionOptions {
    pub fn for_request(fresh: bool) -> Self {
        if fresh {
            Self {
                high_accuracy: true,
                timeout: FRESH_REQUEST_TIMEOUT,
                maximum_age: Duration::ZERO,
            }
        } else {
            Self {
                high_accuracy: true,
                timeout: REQUEST_TIMEOUT,
                maximum_age: MAXIMUM_AGE,
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationState {
    pub location: Option<UserLocation>,
    pub error: Option<LocationError>,
    pub loading: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_platform_numbers() {
        for raw in 0u8..=3 {
            let code = LocationErrorCode::try_from(raw).unwrap();
            assert_eq!(code.code(), raw);
        }
        assert!(LocationErrorCode::try_from(4).is_err());
    }

    #[test]
    fn error_carries_fixed_message() {
        let error = LocationError::from(LocationErrorCode::PermissionDenied);
        assert_eq!(error.to_string(), LocationErrorCode::PermissionDenied.message());
        assert_eq!(serde_json::to_value(&error).unwrap()["code"], 1);
    }

    #[test]
    fn fresh_requests_wait_longer_and_skip_cache() {
        let fresh = PositionOptions::for_request(true);
        assert_eq!(fresh.timeout, Duration::from_secs(20));
        assert_eq!(fresh.maximum_age, Duration::ZERO);
        assert_eq!(PositionOptions::for_request(false).timeout, Duration::from_secs(15));
    }
}
