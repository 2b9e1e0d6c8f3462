use thiserror::Error;

/// Failure kinds for a guess submission.
///
/// The first four variants fire before any side effect and are fully
/// recoverable. `ContractSubmissionFailed` means the wager never left the
/// wallet. `BackendSubmissionFailed` is different in kind: the wager is
/// already spent on-chain and only the scoring step failed, so callers must
/// surface it distinctly ("wager accepted, scoring pending") rather than as a
/// generic failure.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("no wallet connected")]
    NotConnected,

    #[error("guess must not be empty")]
    EmptyInput,

    #[error("\"{word}\" was already guessed this session")]
    DuplicateGuess { word: String },

    #[error("a submission is already in flight")]
    SubmissionInFlight,

    #[error("wagered guess was not accepted on-chain: {reason}")]
    ContractSubmissionFailed { reason: String },

    #[error(
        "wager accepted on-chain (tx {tx_hash}) but scoring failed: {reason}"
    )]
    BackendSubmissionFailed { tx_hash: String, reason: String },
}

impl SubmissionError {
    /// True when the wager has already been committed on-chain, i.e. the
    /// error must not be presented as "nothing happened".
    pub fn wager_spent(&self) -> bool {
        matches!(self, SubmissionError::BackendSubmissionFailed { .. })
    }
}
