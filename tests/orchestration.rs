//! End-to-end submission flow against fake collaborators: submit a wagered
//! guess, let the sync worker pull state and logs, and check that the
//! optimistic entry reconciles once the backend indexes it.

#![allow(non_snake_case)]

use std::{
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

use chrono::Utc;
use color_eyre::eyre::Result;
use tokio::{
    sync::mpsc,
    time::timeout,
};
use wordpot_client::{
    ContractClient,
    GameState,
    GuessLogEntry,
    GuessScore,
    InMemoryLogStorage,
    Proximity,
    ScoringBackend,
    Session,
    SessionConfig,
    SubmissionError,
    SyncCommand,
    SyncEvent,
    SyncEventKind,
    TxReceipt,
    sync_worker,
};

#[derive(Clone)]
struct FakeContract {
    prize_pool: Arc<Mutex<u64>>,
}

impl FakeContract {
    fn new() -> Self {
        Self {
            prize_pool: Arc::new(Mutex::new(0)),
        }
    }
}

impl ContractClient for FakeContract {
    async fn guess_word(
        &self,
        _word: &str,
        _from: &str,
        stake: u64,
    ) -> Result<TxReceipt> {
        *self.prize_pool.lock().unwrap() += stake;
        Ok(TxReceipt {
            tx_hash: "0xabc123".to_string(),
        })
    }

    async fn game_state(&self) -> Result<GameState> {
        Ok(GameState {
            prize_pool: *self.prize_pool.lock().unwrap(),
            ended: false,
        })
    }

    async fn owner(&self) -> Result<String> {
        Ok("0xOWNER".to_string())
    }
}

/// Backend whose log endpoint lags: entries appear only after the test
/// "indexes" them.
#[derive(Clone)]
struct LaggingBackend {
    indexed: Arc<Mutex<Vec<GuessLogEntry>>>,
}

impl LaggingBackend {
    fn new() -> Self {
        Self {
            indexed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn index(&self, entry: GuessLogEntry) {
        self.indexed.lock().unwrap().insert(0, entry);
    }
}

impl ScoringBackend for LaggingBackend {
    async fn submit_guess(
        &self,
        _word: &str,
        _wallet_address: &str,
    ) -> Result<GuessScore> {
        Ok(GuessScore {
            similarity: 0.42,
            proximity: Proximity::Rank(120),
        })
    }

    async fn fetch_logs(
        &self,
        _cursor: Option<u64>,
        _page_size: usize,
    ) -> Result<Vec<GuessLogEntry>> {
        Ok(self.indexed.lock().unwrap().clone())
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> SyncEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for sync event")
        .expect("sync worker channel closed")
}

#[tokio::test]
async fn full_flow__submit_then_poll__reconciles_optimistic_entry() {
    // given
    let contract = FakeContract::new();
    let backend = LaggingBackend::new();
    let mut session = Session::new(
        contract.clone(),
        backend.clone(),
        InMemoryLogStorage::new(),
        SessionConfig::default(),
    )
    .unwrap();
    session.connect("0xABC");

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(sync_worker(
        Duration::from_secs(3600),
        session.sequence(),
        contract.clone(),
        backend.clone(),
        cmd_rx,
        event_tx,
    ));

    // when: a guess goes through and the backend has not indexed it yet
    let recorded = session.submit_guess("apple").await.unwrap();
    cmd_tx.send(SyncCommand::FetchNow).unwrap();
    for _ in 0..2 {
        let event = next_event(&mut event_rx).await;
        match event.kind {
            SyncEventKind::GameState(state) => {
                session.ingest_game_state(event.seq, state);
            }
            SyncEventKind::Logs(entries) => {
                session.ingest_log_snapshot(event.seq, entries);
            }
        }
    }

    // then: the prize pool reflects the wager and the optimistic entry
    // survives the empty backend snapshot
    assert_eq!(session.game_state().prize_pool, 1_000_000);
    assert_eq!(session.logs(), vec![recorded.clone()]);

    // when: the backend catches up
    backend.index(GuessLogEntry {
        player: "0xABC".to_string(),
        guess: "apple".to_string(),
        similarity: 0.42,
        proximity: Proximity::Rank(120),
        submitted_at: Utc::now(),
    });
    cmd_tx.send(SyncCommand::FetchNow).unwrap();
    for _ in 0..2 {
        let event = next_event(&mut event_rx).await;
        match event.kind {
            SyncEventKind::GameState(state) => {
                session.ingest_game_state(event.seq, state);
            }
            SyncEventKind::Logs(entries) => {
                session.ingest_log_snapshot(event.seq, entries);
            }
        }
    }

    // then: exactly one entry, now owned by the backend copy
    assert_eq!(session.logs().len(), 1);
    assert_eq!(session.logs()[0].guess, "apple");

    // and: a duplicate of the reconciled word is still rejected
    assert!(matches!(
        session.submit_guess("apple").await,
        Err(SubmissionError::DuplicateGuess { .. })
    ));

    cmd_tx.send(SyncCommand::Shutdown).unwrap();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn sync_worker__tags_fetches_with_increasing_sequence_numbers() {
    // given
    let contract = FakeContract::new();
    let backend = LaggingBackend::new();
    let session = Session::new(
        contract.clone(),
        backend.clone(),
        InMemoryLogStorage::new(),
        SessionConfig::default(),
    )
    .unwrap();

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(sync_worker(
        Duration::from_secs(3600),
        session.sequence(),
        contract,
        backend,
        cmd_rx,
        event_tx,
    ));

    // when: two explicit fetch cycles
    cmd_tx.send(SyncCommand::FetchNow).unwrap();
    cmd_tx.send(SyncCommand::FetchNow).unwrap();

    let mut seqs = Vec::new();
    for _ in 0..4 {
        seqs.push(next_event(&mut event_rx).await.seq);
    }

    // then: sequence numbers never decrease, and distinct cycles differ
    assert!(seqs.windows(2).all(|w| w[0] <= w[1]));
    assert!(seqs.first().unwrap() < seqs.last().unwrap());

    cmd_tx.send(SyncCommand::Shutdown).unwrap();
    worker.await.unwrap().unwrap();
}
