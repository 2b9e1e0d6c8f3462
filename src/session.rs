use std::time::{
    Duration,
    Instant,
};

use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use itertools::Itertools;
use tracing::{
    debug,
    warn,
};

use crate::{
    backend::{
        DEFAULT_LOG_PAGE_SIZE,
        ScoringBackend,
    },
    contract::ContractClient,
    error::SubmissionError,
    model::{
        DEFAULT_STAKE,
        GameState,
        GuessLogEntry,
    },
    poller::FetchSequence,
    storage::LogStorage,
};

/// Lifecycle of a single guess submission.
///
/// `RecordedOnChainOnly` is the terminal partial-failure state: the wager was
/// mined but scoring never completed, so the guess has no log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuessPhase {
    Idle,
    Validating,
    AwaitingContract,
    AwaitingBackend,
    Recorded,
    RecordedOnChainOnly,
}

#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Wager sent with each guess, in smallest units.
    pub stake: u64,
    /// How long a locally recorded entry outlives backend refetches that do
    /// not yet contain it.
    pub optimistic_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stake: DEFAULT_STAKE,
            optimistic_grace: Duration::from_secs(30),
        }
    }
}

/// A locally recorded entry not yet confirmed by the backend's log endpoint.
#[derive(Clone, Debug)]
struct OptimisticEntry {
    entry: GuessLogEntry,
    recorded_at: Instant,
}

/// Guess submission orchestrator.
///
/// Owns the whole session state (wallet identity, guess log, game state,
/// submission phase) and coordinates the contract client, the scoring
/// backend, and the persisted log slot. All mutation goes through it.
pub struct Session<C, B, S> {
    contract: C,
    backend: B,
    storage: S,
    config: SessionConfig,
    sequence: FetchSequence,
    wallet_address: Option<String>,
    logs: Vec<GuessLogEntry>,
    optimistic: Vec<OptimisticEntry>,
    game_state: GameState,
    owner: Option<String>,
    phase: GuessPhase,
    in_flight: bool,
    last_logs_seq: u64,
    last_state_seq: u64,
    status: String,
}

impl<C, B, S> Session<C, B, S>
where
    C: ContractClient,
    B: ScoringBackend,
    S: LogStorage,
{
    /// Builds a session, rehydrating the guess log from the persisted slot.
    pub fn new(
        contract: C,
        backend: B,
        storage: S,
        config: SessionConfig,
    ) -> Result<Self> {
        let logs = storage
            .load_logs()
            .wrap_err("rehydrating session logs failed")?;
        Ok(Self {
            contract,
            backend,
            storage,
            config,
            sequence: FetchSequence::default(),
            wallet_address: None,
            logs,
            optimistic: Vec::new(),
            game_state: GameState::default(),
            owner: None,
            phase: GuessPhase::Idle,
            in_flight: false,
            last_logs_seq: 0,
            last_state_seq: 0,
            status: String::from("Ready"),
        })
    }

    pub fn logs(&self) -> &[GuessLogEntry] {
        &self.logs
    }

    pub fn game_state(&self) -> GameState {
        self.game_state
    }

    pub fn phase(&self) -> GuessPhase {
        self.phase
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn wallet_address(&self) -> Option<&str> {
        self.wallet_address.as_deref()
    }

    /// Shared sequence source; the sync worker takes a clone so that its
    /// fetches and direct refreshes order against each other.
    pub fn sequence(&self) -> FetchSequence {
        self.sequence.clone()
    }

    pub fn connect(&mut self, address: impl Into<String>) {
        let address = address.into();
        self.status = format!("Connected to wallet: {address}");
        self.wallet_address = Some(address);
    }

    pub fn disconnect(&mut self) {
        self.wallet_address = None;
        self.status = String::from("Disconnected from wallet");
    }

    /// Applies an account-change notification from the wallet connector.
    pub fn handle_account_change(&mut self, account: Option<String>) {
        match account {
            Some(address) => {
                self.status = format!("Switched to wallet: {address}");
                self.wallet_address = Some(address);
            }
            None => self.disconnect(),
        }
    }

    /// Clears a stuck in-flight marker, e.g. after the driving task dropped
    /// a submission future mid-await. The on-chain side may still settle.
    pub fn reset_submission(&mut self) {
        self.in_flight = false;
        self.phase = GuessPhase::Idle;
    }

    /// Submits a wagered guess.
    ///
    /// Validation short-circuits before any side effect, in order: in-flight
    /// guard, connected wallet, non-empty word, no duplicate in the session
    /// log. The contract call completes only once the transaction is mined;
    /// only then is the scoring backend invoked. A backend failure after the
    /// mined wager surfaces as `BackendSubmissionFailed` and leaves the log
    /// untouched -- the wager is spent regardless.
    pub async fn submit_guess(
        &mut self,
        word: &str,
    ) -> Result<GuessLogEntry, SubmissionError> {
        if self.in_flight {
            return Err(SubmissionError::SubmissionInFlight);
        }
        self.phase = GuessPhase::Validating;
        let Some(player) = self.wallet_address.clone() else {
            self.phase = GuessPhase::Idle;
            return Err(SubmissionError::NotConnected);
        };
        let word = word.trim();
        if word.is_empty() {
            self.phase = GuessPhase::Idle;
            return Err(SubmissionError::EmptyInput);
        }
        if self
            .logs
            .iter()
            .any(|entry| entry.guess.trim().eq_ignore_ascii_case(word))
        {
            self.phase = GuessPhase::Idle;
            return Err(SubmissionError::DuplicateGuess {
                word: word.to_string(),
            });
        }

        self.in_flight = true;
        self.phase = GuessPhase::AwaitingContract;
        let receipt = match self
            .contract
            .guess_word(word, &player, self.config.stake)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                self.in_flight = false;
                self.phase = GuessPhase::Idle;
                return Err(SubmissionError::ContractSubmissionFailed {
                    reason: format!("{err:#}"),
                });
            }
        };

        self.phase = GuessPhase::AwaitingBackend;
        let score = match self.backend.submit_guess(word, &player).await {
            Ok(score) => score,
            Err(err) => {
                self.in_flight = false;
                self.phase = GuessPhase::RecordedOnChainOnly;
                warn!(
                    tx_hash = %receipt.tx_hash,
                    word,
                    "wager mined but scoring failed; guess is unrecorded"
                );
                return Err(SubmissionError::BackendSubmissionFailed {
                    tx_hash: receipt.tx_hash,
                    reason: format!("{err:#}"),
                });
            }
        };

        let entry = GuessLogEntry {
            player,
            guess: word.to_string(),
            similarity: score.similarity,
            proximity: score.proximity,
            submitted_at: Utc::now(),
        };
        self.logs.insert(0, entry.clone());
        self.optimistic.push(OptimisticEntry {
            entry: entry.clone(),
            recorded_at: Instant::now(),
        });
        self.persist_logs();
        self.in_flight = false;
        self.phase = GuessPhase::Recorded;
        self.status = format!("Your guess \"{word}\" has been submitted");
        Ok(entry)
    }

    /// Applies a sequence-tagged log snapshot from the backend.
    ///
    /// Snapshots older than the last applied one are dropped, so overlapping
    /// polls settle on the most recently issued fetch rather than whichever
    /// response happens to land last. The backend list is authoritative;
    /// optimistic entries it does not yet contain are kept in front until the
    /// grace period runs out.
    pub fn ingest_log_snapshot(
        &mut self,
        seq: u64,
        entries: Vec<GuessLogEntry>,
    ) -> bool {
        if seq <= self.last_logs_seq {
            debug!(seq, last = self.last_logs_seq, "dropping stale log snapshot");
            return false;
        }
        self.last_logs_seq = seq;

        let now = Instant::now();
        let grace = self.config.optimistic_grace;
        self.optimistic.retain(|opt| {
            let confirmed = entries.iter().any(|e| e.same_key(&opt.entry));
            if confirmed {
                return false;
            }
            let fresh = now.duration_since(opt.recorded_at) < grace;
            if !fresh {
                warn!(
                    player = %opt.entry.player,
                    guess = %opt.entry.guess,
                    "optimistic entry never appeared in backend logs; dropping"
                );
            }
            fresh
        });

        self.logs = self
            .optimistic
            .iter()
            .rev()
            .map(|opt| opt.entry.clone())
            .chain(entries)
            .unique_by(|entry| {
                (
                    entry.player.trim().to_ascii_lowercase(),
                    entry.guess.trim().to_ascii_lowercase(),
                )
            })
            .collect();
        self.persist_logs();
        true
    }

    /// Applies a sequence-tagged game-state snapshot.
    pub fn ingest_game_state(&mut self, seq: u64, state: GameState) -> bool {
        if seq <= self.last_state_seq {
            debug!(seq, last = self.last_state_seq, "dropping stale game state");
            return false;
        }
        self.last_state_seq = seq;
        self.game_state = state;
        true
    }

    /// Re-reads the prize pool and ended flag. Fetch failures are logged and
    /// swallowed, leaving the previous value in place: a stale display value
    /// beats a crashed session.
    pub async fn refresh_game_state(&mut self) {
        let seq = self.sequence.next();
        match self.contract.game_state().await {
            Ok(state) => {
                self.ingest_game_state(seq, state);
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "game state fetch failed; keeping previous value");
            }
        }
    }

    /// Pulls the authoritative log history from the backend and reconciles it
    /// with local optimistic entries.
    pub async fn refresh_game_logs(&mut self) -> Result<()> {
        let seq = self.sequence.next();
        let entries = self
            .backend
            .fetch_logs(None, DEFAULT_LOG_PAGE_SIZE)
            .await
            .wrap_err("fetching game logs failed")?;
        self.ingest_log_snapshot(seq, entries);
        Ok(())
    }

    /// Caches the contract owner for the privileged-UI check.
    pub async fn refresh_owner(&mut self) {
        match self.contract.owner().await {
            Ok(owner) => self.owner = Some(owner),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "owner fetch failed");
            }
        }
    }

    pub fn is_owner(&self) -> bool {
        match (&self.wallet_address, &self.owner) {
            (Some(address), Some(owner)) => address.eq_ignore_ascii_case(owner),
            _ => false,
        }
    }

    fn persist_logs(&mut self) {
        if let Err(err) = self.storage.store_logs(&self.logs) {
            warn!(
                error = %format!("{err:#}"),
                "persisting session logs failed; in-memory list is ahead of the slot"
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn force_in_flight(&mut self) {
        self.in_flight = true;
    }
}
