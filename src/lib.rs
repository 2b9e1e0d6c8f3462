pub mod backend;
pub mod contract;
pub mod error;
pub mod model;
pub mod poller;
pub mod session;
pub mod storage;
pub mod wallet;

pub use backend::{
    GuessScore,
    HttpScoringClient,
    ScoringBackend,
};
pub use contract::{
    ContractClient,
    RpcContractClient,
    TxReceipt,
};
pub use error::SubmissionError;
pub use model::{
    GameState,
    GuessLogEntry,
    Proximity,
};
pub use poller::{
    FetchSequence,
    SyncCommand,
    SyncEvent,
    SyncEventKind,
    sync_worker,
};
pub use session::{
    GuessPhase,
    Session,
    SessionConfig,
};
pub use storage::{
    InMemoryLogStorage,
    LogStorage,
    SledLogStorage,
};
pub use wallet::{
    KeystoreWallet,
    WalletConnector,
};
