//! Ledger state gateway.
//!
//! Contracts see the ledger only through [`LedgerStub`]: world state plus
//! named private collections. [`MemoryLedger`] is the in-process
//! implementation used by the mock chain and by tests. Each invocation runs
//! against a [`LedgerTx`], which buffers writes and commits them atomically
//! after checking that nothing it read has changed underneath it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::LedgerError;

/// State access available to a contract invocation.
pub trait LedgerStub: Send {
    fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), LedgerError>;

    fn get_private_data(
        &mut self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, LedgerError>;

    fn put_private_data(
        &mut self,
        collection: &str,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), LedgerError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum StoreKey {
    World(String),
    Private { collection: String, key: String },
}

impl StoreKey {
    fn private(collection: &str, key: &str) -> Self {
        Self::Private {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::World(key) => write!(f, "{}", key),
            Self::Private { collection, key } => write!(f, "{}/{}", collection, key),
        }
    }
}

#[derive(Debug)]
struct Versioned {
    value: Vec<u8>,
    version: u64,
}

#[derive(Debug, Default)]
struct LedgerInner {
    entries: HashMap<StoreKey, Versioned>,
    height: u64,
}

/// In-memory versioned key-value store.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: RwLock<LedgerInner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transaction for one invocation.
    pub fn begin(&self) -> LedgerTx<'_> {
        LedgerTx {
            ledger: self,
            reads: HashMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Number of committed transactions.
    pub fn height(&self) -> u64 {
        self.inner.read().height
    }

    /// Committed world-state value.
    pub fn state(&self, key: &str) -> Option<Vec<u8>> {
        self.read(&StoreKey::World(key.to_string())).map(|(v, _)| v)
    }

    /// Committed private-collection value.
    pub fn private_data(&self, collection: &str, key: &str) -> Option<Vec<u8>> {
        self.read(&StoreKey::private(collection, key)).map(|(v, _)| v)
    }

    fn read(&self, key: &StoreKey) -> Option<(Vec<u8>, u64)> {
        self.inner
            .read()
            .entries
            .get(key)
            .map(|entry| (entry.value.clone(), entry.version))
    }
}

/// Buffered view of the ledger for one invocation.
///
/// Dropping a transaction without committing discards its writes.
pub struct LedgerTx<'a> {
    ledger: &'a MemoryLedger,
    /// Version observed at first read; 0 means absent.
    reads: HashMap<StoreKey, u64>,
    writes: BTreeMap<StoreKey, Vec<u8>>,
}

impl<'a> LedgerTx<'a> {
    fn get(&mut self, key: StoreKey) -> Option<Vec<u8>> {
        if let Some(value) = self.writes.get(&key) {
            return Some(value.clone());
        }
        let current = self.ledger.read(&key);
        let version = current.as_ref().map_or(0, |(_, v)| *v);
        self.reads.entry(key).or_insert(version);
        current.map(|(value, _)| value)
    }

    fn put(&mut self, key: StoreKey, value: Vec<u8>) {
        self.writes.insert(key, value);
    }

    /// Number of buffered writes.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Validate the read set and apply all writes at a new height.
    ///
    /// A read-only transaction is validated but does not advance the height.
    pub fn commit(self) -> Result<u64, LedgerError> {
        let mut inner = self.ledger.inner.write();

        for (key, seen) in &self.reads {
            let current = inner.entries.get(key).map_or(0, |entry| entry.version);
            if current != *seen {
                warn!(key = %key, seen, current, "Commit rejected on stale read");
                return Err(LedgerError::Conflict(key.to_string()));
            }
        }

        if self.writes.is_empty() {
            return Ok(inner.height);
        }

        inner.height += 1;
        let height = inner.height;
        let writes = self.writes.len();
        for (key, value) in self.writes {
            inner.entries.insert(
                key,
                Versioned {
                    value,
                    version: height,
                },
            );
        }

        debug!(height, writes, "Transaction committed");
        Ok(height)
    }
}

impl LedgerStub for LedgerTx<'_> {
    fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.get(StoreKey::World(key.to_string())))
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        self.put(StoreKey::World(key.to_string()), value);
        Ok(())
    }

    fn get_private_data(
        &mut self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.get(StoreKey::private(collection, key)))
    }

    fn put_private_data(
        &mut self,
        collection: &str,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), LedgerError> {
        self.put(StoreKey::private(collection, key), value);
        Ok(())
    }
}
