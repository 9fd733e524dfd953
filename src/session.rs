//! Session: accumulates pending statements for the current transaction,
//! drives commit, and exposes the eight DDL/DML operations to callers (the
//! CLI, primarily).

use crate::builder;
use crate::config::Config;
use crate::ols::ObjectLogStore;
use crate::replication::ReplicationEngine;
use crate::segment::StatementRecord;
use crate::store::LocalStore;
use crate::value::{self, Params};
use crate::Result;

pub struct Session {
    store: LocalStore,
    replication: ReplicationEngine,
    txns: Vec<StatementRecord>,
}

impl Session {
    /// Opens the Local Store and Replication Engine for `db`, then runs
    /// `sync` once so the session starts from converged state.
    pub async fn open(db: &str, config: &Config) -> Result<Self> {
        let store = LocalStore::open(db)?;
        let ols = ObjectLogStore::open(config)?;
        let replication = ReplicationEngine::new(db, ols);
        replication.sync(&store).await?;

        Ok(Self { store, replication, txns: Vec::new() })
    }

    fn record(&mut self, record: StatementRecord) -> Result<()> {
        self.store.apply(&record.sql, &record.params)?;
        self.txns.push(record);
        Ok(())
    }

    pub fn create_table(&mut self, table: &str, primary_key: &[String]) -> Result<()> {
        self.record(builder::create_table(table, primary_key)?)
    }

    pub fn drop_table(&mut self, table: &str) -> Result<()> {
        self.record(builder::drop_table(table)?)
    }

    pub fn add_column(&mut self, table: &str, column: &str) -> Result<()> {
        self.record(builder::add_column(table, column)?)
    }

    pub fn rename_column(&mut self, table: &str, src: &str, dst: &str) -> Result<()> {
        self.record(builder::rename_column(table, src, dst)?)
    }

    pub fn drop_column(&mut self, table: &str, column: &str) -> Result<()> {
        self.record(builder::drop_column(table, column)?)
    }

    pub fn insert(&mut self, table: &str, row: Params) -> Result<()> {
        let row = value::validate(row)?;
        self.record(builder::insert(table, row)?)
    }

    pub fn update(&mut self, table: &str, set: Params, r#where: Params) -> Result<()> {
        let set = value::validate(set)?;
        let r#where = value::validate(r#where)?;
        self.record(builder::update(table, set, r#where)?)
    }

    pub fn delete(&mut self, table: &str, r#where: Params) -> Result<()> {
        let r#where = value::validate(r#where)?;
        self.record(builder::delete(table, r#where)?)
    }

    /// Publishes and locally applies every pending statement as one segment.
    /// On success, clears the pending list; on `WriterRaced`, the pending
    /// list is already gone (the engine transaction was rolled back) and
    /// the caller must retry its operations from scratch.
    pub async fn commit(&mut self) -> Result<u64> {
        let result = self.replication.commit(&self.store, &self.txns).await;
        self.txns.clear();
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.txns.is_empty() {
            let _ = self.store.rollback();
        }
    }
}
