use std::{
    path::Path,
    sync::{
        Arc,
        Mutex,
    },
};

use color_eyre::eyre::{
    Result,
    WrapErr,
};
use sled::{
    Db,
    Tree,
};

use crate::model::GuessLogEntry;

const SESSION_LOGS_KEY: &[u8] = b"session_logs";

/// Persisted slot for the session's guess log. The whole ordered list is
/// read once at startup and rewritten after every mutation.
pub trait LogStorage {
    fn load_logs(&self) -> Result<Vec<GuessLogEntry>>;

    fn store_logs(&mut self, logs: &[GuessLogEntry]) -> Result<()>;
}

/// Sled-backed slot: one tree, one key, serde_json payload.
#[derive(Clone)]
pub struct SledLogStorage {
    tree: Tree,
}

impl SledLogStorage {
    pub fn new(db: &Db) -> Result<Self> {
        let tree = db.open_tree("guess_logs").wrap_err("open guess_logs tree")?;
        Ok(Self { tree })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref()).wrap_err_with(|| {
            format!("open log database at {}", path.as_ref().display())
        })?;
        Self::new(&db)
    }
}

impl LogStorage for SledLogStorage {
    fn load_logs(&self) -> Result<Vec<GuessLogEntry>> {
        let Some(raw) = self
            .tree
            .get(SESSION_LOGS_KEY)
            .wrap_err("read session logs")?
        else {
            return Ok(Vec::new());
        };
        serde_json::from_slice(&raw).wrap_err("decode session logs")
    }

    fn store_logs(&mut self, logs: &[GuessLogEntry]) -> Result<()> {
        let raw = serde_json::to_vec(logs).wrap_err("encode session logs")?;
        self.tree
            .insert(SESSION_LOGS_KEY, raw)
            .wrap_err("write session logs")?;
        self.tree.flush().wrap_err("flush session logs")?;
        Ok(())
    }
}

/// In-memory slot, used by tests and as a fallback when no data directory is
/// configured.
#[derive(Clone, Default)]
pub struct InMemoryLogStorage {
    logs: Arc<Mutex<Vec<GuessLogEntry>>>,
}

impl InMemoryLogStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_logs(logs: Vec<GuessLogEntry>) -> Self {
        Self {
            logs: Arc::new(Mutex::new(logs)),
        }
    }

    /// Shared handle onto the stored list, for asserting on writes.
    pub fn logs(&self) -> Arc<Mutex<Vec<GuessLogEntry>>> {
        self.logs.clone()
    }
}

impl LogStorage for InMemoryLogStorage {
    fn load_logs(&self) -> Result<Vec<GuessLogEntry>> {
        Ok(self.logs.lock().unwrap().clone())
    }

    fn store_logs(&mut self, logs: &[GuessLogEntry]) -> Result<()> {
        *self.logs.lock().unwrap() = logs.to_vec();
        Ok(())
    }
}
