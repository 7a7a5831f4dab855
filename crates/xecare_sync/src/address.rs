use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::GarageApi;
use crate::debounce::Debouncer;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(600);
pub const MIN_ADDRESS_LEN: usize = 5;
const DUPLICATE_MESSAGE: &str = "Another garage is already registered at this address.";
const CHECK_FAILED_MESSAGE: &str = "Could not verify the address right now.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AddressCheck {
    #[default]
    Idle,
    Checking,
    Available,
    Duplicate(String),
    Failed(String),
}

/// Debounced duplicate-address check for the garage registration and edit
/// forms.
pub struct AddressValidator<G> {
    api: Arc<G>,
    garage_id: Option<i64>,
    debouncer: Debouncer,
    status: Arc<watch::Sender<AddressCheck>>,
}

impl<G: GarageApi> AddressValidator<G> {
    pub fn new(api: Arc<G>, delay: Duration) -> Self {
        let (status, _) = watch::channel(AddressCheck::Idle);
        Self {
            api,
            garage_id: None,
            debouncer: Debouncer::new(delay),
            status: Arc::new(status),
        }
    }

    /// Edit mode: the garage being edited is not a duplicate of itself.
    pub fn for_garage(mut self, garage_id: i64) -> Self {
        self.garage_id = Some(garage_id);
        self
    }

    pub fn status(&self) -> AddressCheck {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AddressCheck> {
        self.status.subscribe()
    }

    pub fn input(&self, address: &str) {
        let address = address.trim().to_string();
        if address.chars().count() < MIN_ADDRESS_LEN {
            self.debouncer.cancel();
            self.status.send_replace(AddressCheck::Idle);
            return;
        }

        let api = self.api.clone();
        let status = self.status.clone();
        let garage_id = self.garage_id;
        self.debouncer.schedule(move |ticket| async move {
            status.send_replace(AddressCheck::Checking);
            let outcome = match api.check_address(&address, garage_id).await {
                Ok(result) if result.is_duplicate => AddressCheck::Duplicate(
                    result
                        .message
                        .unwrap_or_else(|| DUPLICATE_MESSAGE.to_string()),
                ),
                Ok(_) => AddressCheck::Available,
                Err(err) => {
                    warn!(%err, "address validation failed");
                    AddressCheck::Failed(CHECK_FAILED_MESSAGE.to_string())
                }
            };
            if ticket.is_current() {
                debug!(?outcome, "address check finished");
                status.send_replace(outcome);
            }
        });
    }
}
