use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use uuid::Uuid;

use crate::database::repository::TokenStore;

/// Reconciliation poll for a batch whose assets are rendering.
///
/// Counts the batch tokens still lacking an asset path on a fixed
/// interval and stops once none remain. The task is cancelled when the
/// handle is dropped, so a poller never outlives its owner.
pub struct BatchPoller {
    handle: JoinHandle<()>,
}

impl BatchPoller {
    pub fn spawn(tokens: Arc<dyn TokenStore>, batch_id: Uuid, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match tokens.count_missing_assets(batch_id).await {
                    Ok(0) => {
                        tracing::info!(%batch_id, "all batch assets rendered, stopping reconciliation");
                        break;
                    }
                    Ok(outstanding) => {
                        tracing::debug!(%batch_id, outstanding, "batch assets still outstanding");
                    }
                    Err(e) => {
                        tracing::warn!(error = ?e, %batch_id, "asset reconciliation poll failed");
                    }
                }
            }
        });
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for BatchPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::queries::MockStore;
    use crate::tokens::new_sign_token;

    #[tokio::test]
    async fn poller_runs_until_no_assets_are_outstanding() {
        let store = MockStore::default();
        let batch_id = Uuid::new_v4();
        let token = new_sign_token(batch_id);
        let token_id = token.id;
        TokenStore::insert_many(&store, vec![token]).await.unwrap();

        let poller = BatchPoller::spawn(
            Arc::new(store.clone()),
            batch_id,
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!poller.is_finished(), "one asset is still outstanding");

        TokenStore::set_rendered_asset_path(&store, token_id, "b/t.png")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(poller.is_finished(), "poller stops once nothing is outstanding");
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels_the_task() {
        let store = MockStore::default();
        let batch_id = Uuid::new_v4();
        TokenStore::insert_many(&store, vec![new_sign_token(batch_id)])
            .await
            .unwrap();

        let poller = BatchPoller::spawn(
            Arc::new(store.clone()),
            batch_id,
            Duration::from_millis(10),
        );
        let handle_probe = poller.handle.abort_handle();
        drop(poller);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle_probe.is_finished());
    }
}
