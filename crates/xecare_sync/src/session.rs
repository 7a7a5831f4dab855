use tracing::{info, instrument, warn};

use xecare_domain::session::{SessionStore, StoredSession};

use crate::api::ProfileApi;
use crate::error::SessionError;

/// Re-validates the stored credentials against the backend. A rejected token
/// ends the session: the store is cleared and [`SessionError::Expired`] is
/// returned so the caller can force a new login.
#[instrument(skip(api, store), fields(path = %store.path().display()))]
pub async fn refresh_profile<P: ProfileApi>(
    api: &P,
    store: &SessionStore,
) -> Result<StoredSession, SessionError> {
    let Some(mut session) = store.load()? else {
        return Err(SessionError::Expired);
    };
    match api.profile().await {
        Ok(user) => {
            session.user = user;
            store.save(&session)?;
            info!(user_id = session.user.id, "profile refreshed");
            Ok(session)
        }
        Err(err) if err.is_unauthorized() => {
            warn!(%err, "stored credentials rejected, clearing session");
            store.clear()?;
            Err(SessionError::Expired)
        }
        Err(err) => Err(err.into()),
    }
}

pub fn logout(store: &SessionStore) -> Result<(), SessionError> {
    store.clear()?;
    Ok(())
}
