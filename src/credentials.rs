use crate::models::Credential;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared holder for the current credential.
///
/// The whole credential is swapped as one `Arc` so a reader never sees a new
/// access token paired with a stale refresh token. The refresher is the only
/// writer; the poller and the CLI only read.
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: RwLock<Option<Arc<Credential>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(credential))),
        }
    }

    /// Current snapshot, or None if the store was never populated.
    pub async fn get(&self) -> Option<Arc<Credential>> {
        self.current.read().await.clone()
    }

    pub async fn set(&self, credential: Credential) {
        *self.current.write().await = Some(Arc::new(credential));
    }

    /// Access token for an outbound call, if one is usable.
    pub async fn access_token(&self) -> Option<String> {
        self.get()
            .await
            .filter(|c| c.is_usable())
            .map(|c| c.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(access: &str, refresh: &str) -> Credential {
        Credential {
            access_token: access.into(),
            refresh_token: refresh.into(),
            expires_in_seconds: 3600,
        }
    }

    #[tokio::test]
    async fn empty_store_has_no_token() {
        let store = CredentialStore::new();
        assert!(store.get().await.is_none());
        assert!(store.access_token().await.is_none());
    }

    #[tokio::test]
    async fn set_replaces_whole_credential() {
        let store = CredentialStore::with_credential(cred("a1", "r1"));
        store.set(cred("a2", "r2")).await;
        let c = store.get().await.unwrap();
        assert_eq!(c.access_token, "a2");
        assert_eq!(c.refresh_token, "r2");
    }

    #[tokio::test]
    async fn empty_access_token_is_not_usable() {
        let store = CredentialStore::with_credential(cred("", "r1"));
        assert!(store.get().await.is_some());
        assert!(store.access_token().await.is_none());
    }

    #[tokio::test]
    async fn old_snapshot_survives_replacement() {
        let store = CredentialStore::with_credential(cred("a1", "r1"));
        let before = store.get().await.unwrap();
        store.set(cred("a2", "r2")).await;
        assert_eq!(before.access_token, "a1");
        assert_eq!(before.refresh_token, "r1");
    }
}
