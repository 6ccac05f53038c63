use super::unlock::{UnlockState, VaultUnlock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Poll a locked vault until the local clock says it is ready.
///
/// The unlock machine itself never runs timers; this is the scheduler a
/// countdown view hangs off. The task finishes with the first state other
/// than `locked`.
pub fn spawn_unlock_watch(unlock: Arc<VaultUnlock>, poll: Duration) -> JoinHandle<UnlockState> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let state = unlock.refresh();
            if state != UnlockState::Locked {
                debug!(state = state.as_str(), "Unlock watch finished");
                return state;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::store::MemoryVaultStore;
    use crate::timelock::{LocalTimeLockNetwork, TimeLockClient};
    use crate::vault::{DraftRequest, VaultCommitment};

    #[tokio::test(start_paused = true)]
    async fn test_watch_reports_ready() {
        let clock = Arc::new(ManualClock::starting_now());
        let network = Arc::new(LocalTimeLockNetwork::new(clock.clone()));
        let timelock = Arc::new(TimeLockClient::new(network, clock.clone()));
        let store = Arc::new(MemoryVaultStore::new());

        let commit = VaultCommitment::new(timelock.clone(), store.clone());
        commit
            .create_draft(DraftRequest::new(
                "later",
                clock.now() + chrono::Duration::minutes(5),
            ))
            .await
            .unwrap();
        let vault = commit.arm().await.unwrap();

        let unlock = Arc::new(VaultUnlock::new(timelock, store));
        assert_eq!(unlock.load(&vault.id, None).await.unwrap(), UnlockState::Locked);

        let watch = spawn_unlock_watch(unlock.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!watch.is_finished());

        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(watch.await.unwrap(), UnlockState::Ready);
        assert_eq!(unlock.state(), UnlockState::Ready);
    }
}
