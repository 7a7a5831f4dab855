use parking_lot::Mutex;
use reqwest::StatusCode;

use xecare_domain::session::{SessionStore, StoredSession, StoredUser};
use xecare_sync::session::{logout, refresh_profile};
use xecare_sync::{ApiError, ProfileApi, SessionError};

struct FakeProfile {
    answer: Mutex<Option<Result<StoredUser, ApiError>>>,
}

impl FakeProfile {
    fn answering(answer: Result<StoredUser, ApiError>) -> Self {
        Self {
            answer: Mutex::new(Some(answer)),
        }
    }
}

impl ProfileApi for FakeProfile {
    async fn profile(&self) -> Result<StoredUser, ApiError> {
        self.answer
            .lock()
            .take()
            .unwrap_or(Err(ApiError::MissingToken))
    }
}

fn owner(full_name: &str) -> StoredUser {
    StoredUser {
        id: 12,
        email: "owner@xecare.vn".into(),
        full_name: Some(full_name.into()),
        role: "GARAGE".into(),
        garage_id: Some(4),
    }
}

fn seeded_store(dir: &tempfile::TempDir) -> SessionStore {
    let store = SessionStore::new(dir.path().join("session.json"));
    store
        .save(&StoredSession {
            token: "jwt-token".into(),
            user: owner("Trần Văn A"),
        })
        .unwrap();
    store
}

#[tokio::test]
async fn refresh_updates_the_stored_user() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    let api = FakeProfile::answering(Ok(owner("Trần Văn B")));

    let session = refresh_profile(&api, &store).await.unwrap();

    assert_eq!(session.token, "jwt-token");
    assert_eq!(session.user.full_name.as_deref(), Some("Trần Văn B"));
    assert_eq!(store.load().unwrap(), Some(session));
}

#[tokio::test]
async fn rejected_token_clears_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    let api = FakeProfile::answering(Err(ApiError::Unauthorized(StatusCode::UNAUTHORIZED)));

    let err = refresh_profile(&api, &store).await.unwrap_err();

    assert!(matches!(err, SessionError::Expired));
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test]
async fn server_errors_keep_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    let api = FakeProfile::answering(Err(ApiError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "maintenance".into(),
    }));

    let err = refresh_profile(&api, &store).await.unwrap_err();

    assert!(matches!(err, SessionError::Api(_)));
    assert!(store.load().unwrap().is_some());
}

#[tokio::test]
async fn missing_session_is_expired() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    let api = FakeProfile::answering(Ok(owner("unused")));

    let err = refresh_profile(&api, &store).await.unwrap_err();

    assert!(matches!(err, SessionError::Expired));
}

#[test]
fn logout_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);

    logout(&store).unwrap();
    logout(&store).unwrap();

    assert_eq!(store.load().unwrap(), None);
}
