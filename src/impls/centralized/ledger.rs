use crate::generic::ledger::{AnyRecord, Ledger, LedgerError, Query, Record, Table};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A ledger held in memory, one append only table per record family.
///
/// Rows keep their insertion order, which is what unordered queries return.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    tables: RwLock<HashMap<Table, Vec<AnyRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert<R: Record>(&self, record: R) {
        self.tables
            .write()
            .await
            .entry(R::TABLE)
            .or_default()
            .push(record.into_any());
    }

    /// Number of rows in a table.
    pub async fn len(&self, table: Table) -> usize {
        self.tables
            .read()
            .await
            .get(&table)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Ledger for MemoryLedger {
    async fn find_one<R: Record>(&self, query: &Query) -> Result<Option<R>, LedgerError> {
        Ok(self.find_many::<R>(query).await?.into_iter().next())
    }

    async fn find_many<R: Record>(&self, query: &Query) -> Result<Vec<R>, LedgerError> {
        let tables = self.tables.read().await;
        match tables.get(&R::TABLE) {
            Some(rows) => query.apply(rows.iter().filter_map(R::from_any)),
            None => Ok(Vec::new()),
        }
    }
}
