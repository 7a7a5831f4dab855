pub mod address;
pub mod api;
pub mod bell;
pub mod bus;
pub mod debounce;
pub mod error;
pub mod geocode;
pub mod location;
pub mod notifications;
pub mod session;
pub mod store;

pub use crate::api::{ApiClient, GarageApi, NotificationApi, ProfileApi};
pub use crate::bus::{NotificationBus, NotificationEvent};
pub use crate::error::{ApiError, GeocodeError, SessionError};
pub use crate::notifications::{NotificationSession, NotificationSync, SyncConfig};
