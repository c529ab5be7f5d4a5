//! Shared plumbing for contract handlers: call context, result type and
//! typed record access over a [`LedgerStub`].

use tee_types::Schema;

use crate::error::{ContractError, LedgerError};
use crate::ledger::LedgerStub;

/// Context provided by the runtime for each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// Transaction timestamp, Unix seconds
    pub timestamp: u64,
}

/// Result type for handlers.
pub type HandlerResult<T> = Result<T, ContractError>;

/// Load and decode a world-state record that must exist.
pub(crate) fn load_state<T: Schema>(
    stub: &mut impl LedgerStub,
    operation: &'static str,
    key: &str,
) -> HandlerResult<T> {
    let bytes = stub
        .get_state(key)
        .map_err(ContractError::ledger(operation, key))?
        .ok_or_else(|| ContractError::ledger(operation, key)(LedgerError::NotFound(key.into())))?;
    decode_stored(&bytes, operation, key)
}

/// Load and decode a private record that must exist.
pub(crate) fn load_private<T: Schema>(
    stub: &mut impl LedgerStub,
    collection: &str,
    operation: &'static str,
    key: &str,
) -> HandlerResult<T> {
    let bytes = stub
        .get_private_data(collection, key)
        .map_err(ContractError::ledger(operation, key))?
        .ok_or_else(|| {
            ContractError::ledger(operation, key)(LedgerError::NotFound(format!(
                "{}/{}",
                collection, key
            )))
        })?;
    decode_stored(&bytes, operation, key)
}

pub(crate) fn store_state<T: Schema>(
    stub: &mut impl LedgerStub,
    operation: &'static str,
    key: &str,
    record: &T,
) -> HandlerResult<()> {
    let bytes = encode_record(record, operation, key)?;
    stub.put_state(key, bytes)
        .map_err(ContractError::ledger(operation, key))
}

pub(crate) fn store_private<T: Schema>(
    stub: &mut impl LedgerStub,
    collection: &str,
    operation: &'static str,
    key: &str,
    record: &T,
) -> HandlerResult<()> {
    let bytes = encode_record(record, operation, key)?;
    stub.put_private_data(collection, key, bytes)
        .map_err(ContractError::ledger(operation, key))
}

fn decode_stored<T: Schema>(bytes: &[u8], operation: &'static str, key: &str) -> HandlerResult<T> {
    T::decode(bytes).map_err(|e| {
        ContractError::ledger(operation, key)(LedgerError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    })
}

fn encode_record<T: Schema>(
    record: &T,
    operation: &'static str,
    key: &str,
) -> HandlerResult<Vec<u8>> {
    record.encode().map_err(|e| {
        ContractError::ledger(operation, key)(LedgerError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    })
}

/// Random 12-byte identifier, hex encoded.
pub(crate) fn random_id() -> String {
    hex::encode(rand::random::<[u8; 12]>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use tee_types::{Account, Ciphertext};

    #[test]
    fn test_missing_record_names_key() {
        let ledger = MemoryLedger::new();
        let mut tx = ledger.begin();
        let err = load_private::<Account>(&mut tx, "coll", "query account", "alice").unwrap_err();
        assert!(err.to_string().contains("coll/alice"));
        assert_eq!(err.kind(), crate::error::ErrorKind::Gateway);
    }

    #[test]
    fn test_corrupt_record_is_gateway_error() {
        let ledger = MemoryLedger::new();
        let mut tx = ledger.begin();
        tx.put_state("a", b"not json".to_vec()).unwrap();
        let err = load_state::<Account>(&mut tx, "get", "a").unwrap_err();
        assert!(matches!(
            err,
            ContractError::Ledger {
                source: LedgerError::Corrupt { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_store_then_load() {
        let ledger = MemoryLedger::new();
        let mut tx = ledger.begin();
        let account = Account {
            balance: Ciphertext::new(vec![1, 2], [3u8; 12]),
        };
        store_private(&mut tx, "coll", "create", "bob", &account).unwrap();
        let loaded: Account = load_private(&mut tx, "coll", "query", "bob").unwrap();
        assert_eq!(loaded, account);
    }

    #[test]
    fn test_random_ids_are_distinct() {
        let a = random_id();
        let b = random_id();
        assert_eq!(a.len(), 24);
        assert_ne!(a, b);
    }
}
