use std::{
    sync::{
        Arc,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
    time::Duration,
};

use color_eyre::eyre::{
    Result,
    eyre,
};
use tokio::{
    sync::mpsc,
    time,
};
use tracing::warn;

use crate::{
    backend::{
        DEFAULT_LOG_PAGE_SIZE,
        ScoringBackend,
    },
    contract::ContractClient,
    model::{
        GameState,
        GuessLogEntry,
    },
};

/// Lower bound on the polling interval. Display-only reads gain nothing from
/// sub-second polling, and earlier drafts of the game shipped a sub-millisecond
/// interval by mistake.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub fn sane_poll_interval(requested: Duration) -> Duration {
    requested.max(MIN_POLL_INTERVAL)
}

/// Monotonic tag for fetches. Each fetch takes its number before the request
/// goes out, so a response can be ordered by issue time instead of arrival
/// time.
#[derive(Clone, Default)]
pub struct FetchSequence(Arc<AtomicU64>);

impl FetchSequence {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

pub enum SyncCommand {
    FetchNow,
    Shutdown,
}

/// One fetched snapshot, tagged with the sequence number taken when the
/// fetch was issued.
#[derive(Clone, Debug)]
pub struct SyncEvent {
    pub seq: u64,
    pub kind: SyncEventKind,
}

#[derive(Clone, Debug)]
pub enum SyncEventKind {
    GameState(GameState),
    Logs(Vec<GuessLogEntry>),
}

/// Background sync loop: re-fetches game state and logs on a timer and on
/// demand, independently of any in-flight submission. Fetch failures are
/// logged and the loop keeps going; the session simply stays on its previous
/// values.
pub async fn sync_worker<C, B>(
    poll_interval: Duration,
    sequence: FetchSequence,
    contract: C,
    backend: B,
    mut cmd_rx: mpsc::UnboundedReceiver<SyncCommand>,
    event_tx: mpsc::UnboundedSender<SyncEvent>,
) -> Result<()>
where
    C: ContractClient,
    B: ScoringBackend,
{
    async fn fetch_once<C, B>(
        sequence: &FetchSequence,
        contract: &C,
        backend: &B,
        event_tx: &mpsc::UnboundedSender<SyncEvent>,
    ) -> Result<()>
    where
        C: ContractClient,
        B: ScoringBackend,
    {
        let seq = sequence.next();
        match contract.game_state().await {
            Ok(state) => {
                event_tx
                    .send(SyncEvent {
                        seq,
                        kind: SyncEventKind::GameState(state),
                    })
                    .map_err(|_| eyre!("sync event receiver dropped"))?;
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "game state fetch failed");
            }
        }
        match backend.fetch_logs(None, DEFAULT_LOG_PAGE_SIZE).await {
            Ok(entries) => {
                event_tx
                    .send(SyncEvent {
                        seq,
                        kind: SyncEventKind::Logs(entries),
                    })
                    .map_err(|_| eyre!("sync event receiver dropped"))?;
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "log fetch failed");
            }
        }
        Ok(())
    }

    let poll_interval = sane_poll_interval(poll_interval);
    // First tick after one full interval; the initial fetch is the driver's
    // call, via `FetchNow`.
    let mut ticker =
        time::interval_at(time::Instant::now() + poll_interval, poll_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                fetch_once(&sequence, &contract, &backend, &event_tx).await?;
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                match cmd {
                    SyncCommand::FetchNow => {
                        fetch_once(&sequence, &contract, &backend, &event_tx).await?;
                    }
                    SyncCommand::Shutdown => break,
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_second_intervals_are_clamped() {
        assert_eq!(
            sane_poll_interval(Duration::from_millis(1)),
            MIN_POLL_INTERVAL
        );
        assert_eq!(
            sane_poll_interval(Duration::from_micros(500)),
            MIN_POLL_INTERVAL
        );
    }

    #[test]
    fn sane_intervals_pass_through() {
        let requested = Duration::from_secs(7);
        assert_eq!(sane_poll_interval(requested), requested);
    }

    #[test]
    fn fetch_sequence_is_strictly_increasing_across_clones() {
        let sequence = FetchSequence::default();
        let clone = sequence.clone();
        let a = sequence.next();
        let b = clone.next();
        let c = sequence.next();
        assert!(a < b && b < c);
    }
}
