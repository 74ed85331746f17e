use std::sync::Arc;

use crate::error::PersistenceError;
use crate::models::{Block, TokenContract, Transaction};

/// Write side of the persistence layer.
///
/// Every write is an upsert: storing the same record twice leaves one row.
pub trait TransactionStore: Send + Sync {
    fn write_transaction(&self, tx: &Transaction) -> Result<(), PersistenceError>;

    fn write_token_contract(&self, token: &TokenContract) -> Result<(), PersistenceError>;

    /// Write `tx` together with the token contracts it created. Token rows are
    /// only written once the transaction itself is stored.
    fn write_transaction_with_tokens(
        &self,
        tx: &Transaction,
        tokens: &[TokenContract],
    ) -> Result<(), PersistenceError> {
        self.write_transaction(tx)?;
        tokens.iter().try_for_each(|token| self.write_token_contract(token))
    }

    fn write_block(&self, block: &Block) -> Result<(), PersistenceError>;

    fn set_last_persisted_block(&self, block_number: u64) -> Result<(), PersistenceError>;
}

impl<S: TransactionStore + ?Sized> TransactionStore for Arc<S> {
    fn write_transaction(&self, tx: &Transaction) -> Result<(), PersistenceError> {
        (**self).write_transaction(tx)
    }

    fn write_token_contract(&self, token: &TokenContract) -> Result<(), PersistenceError> {
        (**self).write_token_contract(token)
    }

    fn write_transaction_with_tokens(
        &self,
        tx: &Transaction,
        tokens: &[TokenContract],
    ) -> Result<(), PersistenceError> {
        (**self).write_transaction_with_tokens(tx, tokens)
    }

    fn write_block(&self, block: &Block) -> Result<(), PersistenceError> {
        (**self).write_block(block)
    }

    fn set_last_persisted_block(&self, block_number: u64) -> Result<(), PersistenceError> {
        (**self).set_last_persisted_block(block_number)
    }
}
