//! Session continuity around the external payment redirect.
//!
//! The redirect can clear the volatile (tab-scoped) vault while the
//! durable (cross-tab) vault survives. Immediately before redirecting we
//! copy the auth token pair into the durable vault; on return the backup
//! is consumed read-once and presented to the auth provider directly,
//! because the normal rehydration path is unreliable right after a
//! cross-origin round trip.

pub mod auth;
pub mod vault;

use std::{sync::Arc, time::Duration};

use crate::models::SessionTokens;

pub use auth::{AuthError, AuthProvider, HttpAuthProvider};
pub use vault::{MemoryVault, RedisVault, SessionVault, VaultError};

/// Fixed key prefix of the single-use backup record.
pub const SESSION_BACKUP_KEY: &str = "session_backup";

const SESSION_KEY: &str = "auth_session";

/// How often `wait_for_session` re-reads the volatile vault.
const SETTLE_POLL: Duration = Duration::from_millis(200);

fn backup_key(client_id: &str) -> String {
    format!("{SESSION_BACKUP_KEY}:{client_id}")
}

fn session_key(client_id: &str) -> String {
    format!("{SESSION_KEY}:{client_id}")
}

pub struct SessionContinuity {
    volatile: Arc<dyn SessionVault>,
    durable: Arc<dyn SessionVault>,
    provider: Arc<dyn AuthProvider>,
    provider_timeout: Duration,
}

impl SessionContinuity {
    pub fn new(
        volatile: Arc<dyn SessionVault>,
        durable: Arc<dyn SessionVault>,
        provider: Arc<dyn AuthProvider>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            volatile,
            durable,
            provider,
            provider_timeout,
        }
    }

    /// Records the authenticated session in the volatile vault. Called
    /// when the auth callback settles.
    pub async fn record_session(
        &self,
        client_id: &str,
        tokens: &SessionTokens,
    ) -> Result<(), VaultError> {
        let value = serde_json::to_string(tokens).unwrap_or_default();
        self.volatile.store(&session_key(client_id), &value).await
    }

    /// The current session, if one is recorded and structurally valid.
    pub async fn current_session(
        &self,
        client_id: &str,
    ) -> Result<Option<SessionTokens>, VaultError> {
        let raw = self.volatile.load(&session_key(client_id)).await?;
        Ok(raw.and_then(|v| serde_json::from_str(&v).ok()))
    }

    /// Copies the current auth token pair into the durable vault. Called
    /// immediately before the outbound payment redirect. Returns whether
    /// there was anything to back up.
    pub async fn backup_session(&self, client_id: &str) -> Result<bool, VaultError> {
        let Some(tokens) = self.current_session(client_id).await? else {
            tracing::warn!(client_id, "no auth session to back up before redirect");
            return Ok(false);
        };
        let value = serde_json::to_string(&tokens).unwrap_or_default();
        self.durable.store(&backup_key(client_id), &value).await?;
        tracing::debug!(client_id, "session backed up for external redirect");
        Ok(true)
    }

    /// Read-once accessor for the backup. The record is deleted whether
    /// or not it parses, so a stale pair can never be replayed.
    pub async fn take_backed_up_tokens(
        &self,
        client_id: &str,
    ) -> Result<Option<SessionTokens>, VaultError> {
        let key = backup_key(client_id);
        let raw = self.durable.load(&key).await?;
        if raw.is_some() {
            self.durable.delete(&key).await?;
        }
        match raw {
            None => Ok(None),
            Some(value) => match serde_json::from_str(&value) {
                Ok(tokens) => Ok(Some(tokens)),
                Err(e) => {
                    tracing::warn!(error = %e, client_id, "discarding corrupted session backup");
                    Ok(None)
                }
            },
        }
    }

    /// Restores the session from a backup, if any, by presenting the
    /// pair to the auth provider directly. Failures degrade to the normal
    /// (possibly logged-out) rehydration path; this never hard-fails, and
    /// the provider call is bounded by a hard timeout.
    pub async fn restore_session(&self, client_id: &str) -> bool {
        let backed_up = match self.take_backed_up_tokens(client_id).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, client_id, "failed to read session backup");
                return false;
            }
        };
        let Some(tokens) = backed_up else {
            return false;
        };

        let restored =
            tokio::time::timeout(self.provider_timeout, self.provider.set_session(&tokens)).await;
        match restored {
            Ok(Ok(fresh)) => {
                if let Err(e) = self.record_session(client_id, &fresh).await {
                    tracing::warn!(error = %e, client_id, "failed to re-record restored session");
                }
                tracing::info!(client_id, "session restored after external redirect");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, client_id, "session restore rejected, falling back to normal rehydration");
                false
            }
            Err(_) => {
                tracing::warn!(client_id, "session restore timed out, falling back to normal rehydration");
                false
            }
        }
    }

    /// Bounded wait for the auth callback to settle. Polls the volatile
    /// vault until a session appears; on timeout falls back to one direct
    /// check instead of hanging.
    pub async fn wait_for_session(
        &self,
        client_id: &str,
        budget: Duration,
    ) -> Option<SessionTokens> {
        let settled = tokio::time::timeout(budget, async {
            loop {
                if let Ok(Some(tokens)) = self.current_session(client_id).await {
                    return tokens;
                }
                tokio::time::sleep(SETTLE_POLL).await;
            }
        })
        .await;
        match settled {
            Ok(tokens) => Some(tokens),
            Err(_) => self.current_session(client_id).await.ok().flatten(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn ok() -> Self {
            Self {
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AuthProvider for FakeProvider {
        async fn send_sign_in_link(&self, _email: &str, _redirect_to: &str) -> Result<(), AuthError> {
            Ok(())
        }

        async fn identity_for(&self, access_token: &str) -> Result<Option<String>, AuthError> {
            Ok(Some(format!("user-of-{access_token}")))
        }

        async fn set_session(&self, tokens: &SessionTokens) -> Result<SessionTokens, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AuthError::Rejected("refresh token revoked".to_string()));
            }
            Ok(SessionTokens {
                access_token: format!("fresh-{}", tokens.access_token),
                refresh_token: format!("fresh-{}", tokens.refresh_token),
            })
        }
    }

    fn continuity(provider: FakeProvider) -> SessionContinuity {
        SessionContinuity::new(
            Arc::new(MemoryVault::default()),
            Arc::new(MemoryVault::default()),
            Arc::new(provider),
            Duration::from_secs(1),
        )
    }

    fn tokens() -> SessionTokens {
        SessionTokens {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
        }
    }

    #[tokio::test]
    async fn backup_then_take_returns_the_pair_once() {
        let continuity = continuity(FakeProvider::ok());
        continuity.record_session("c1", &tokens()).await.unwrap();

        assert!(continuity.backup_session("c1").await.unwrap());
        let taken = continuity.take_backed_up_tokens("c1").await.unwrap();
        assert_eq!(taken, Some(tokens()));

        // Read-once: the second take finds nothing.
        let again = continuity.take_backed_up_tokens("c1").await.unwrap();
        assert_eq!(again, None);
    }

    #[tokio::test]
    async fn corrupted_backup_is_discarded() {
        let durable = Arc::new(MemoryVault::default());
        let continuity = SessionContinuity::new(
            Arc::new(MemoryVault::default()),
            Arc::clone(&durable) as Arc<dyn SessionVault>,
            Arc::new(FakeProvider::ok()),
            Duration::from_secs(1),
        );
        durable
            .store("session_backup:c1", "{not json")
            .await
            .unwrap();

        assert_eq!(continuity.take_backed_up_tokens("c1").await.unwrap(), None);
        // Deleted despite being unreadable.
        assert_eq!(durable.load("session_backup:c1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn backup_without_a_session_is_a_noop() {
        let continuity = continuity(FakeProvider::ok());
        assert!(!continuity.backup_session("c1").await.unwrap());
        assert_eq!(continuity.take_backed_up_tokens("c1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn restore_presents_the_pair_and_records_the_fresh_session() {
        let continuity = continuity(FakeProvider::ok());
        continuity.record_session("c1", &tokens()).await.unwrap();
        continuity.backup_session("c1").await.unwrap();

        assert!(continuity.restore_session("c1").await);
        let current = continuity.current_session("c1").await.unwrap().unwrap();
        assert_eq!(current.access_token, "fresh-access-1");
    }

    #[tokio::test]
    async fn failed_restore_degrades_instead_of_erroring() {
        let continuity = continuity(FakeProvider::failing());
        continuity.record_session("c1", &tokens()).await.unwrap();
        continuity.backup_session("c1").await.unwrap();

        assert!(!continuity.restore_session("c1").await);
        // The backup was still consumed.
        assert_eq!(continuity.take_backed_up_tokens("c1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn wait_for_session_picks_up_a_late_callback() {
        let continuity = Arc::new(continuity(FakeProvider::ok()));

        let writer = Arc::clone(&continuity);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.record_session("c1", &tokens()).await.unwrap();
        });

        let settled = continuity
            .wait_for_session("c1", Duration::from_secs(2))
            .await;
        assert_eq!(settled, Some(tokens()));
    }

    #[tokio::test]
    async fn wait_for_session_times_out_to_a_direct_check() {
        let continuity = continuity(FakeProvider::ok());
        let settled = continuity
            .wait_for_session("c1", Duration::from_millis(50))
            .await;
        assert_eq!(settled, None);
    }
}
