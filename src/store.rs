//! Local Store: the embedded relational engine plus the private `_kv`
//! bookkeeping table that records the last LSN applied locally.
//!
//! Following this crate family's convention for SQLite-backed stores
//! (`dbutil::open`/`commit_and_begin`), the connection spends almost all of
//! its life inside a single open `BEGIN EXCLUSIVE` transaction. `apply`
//! executes statements in that transaction without committing; `apply_commit`
//! commits it and immediately reopens a fresh one, so the connection is
//! always ready to accept the next transaction's statements.

use crate::segment::StatementRecord;
use crate::value::Value;
use crate::{Error, Result};
use rusqlite::Connection;

pub struct LocalStore {
    conn: Connection,
}

const BOOTSTRAP: &str = r#"
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;

    CREATE TABLE IF NOT EXISTS _kv(
        key   text primary key,
        value text
    );
    INSERT OR IGNORE INTO _kv(key, value) VALUES('lsn', '0');
    "#;

impl LocalStore {
    /// Opens (creating if absent) `{db}.sqlite3` in the current directory,
    /// sets WAL journaling with relaxed sync durability, bootstraps `_kv`,
    /// and leaves the connection inside an open exclusive transaction ready
    /// for `apply`.
    pub fn open(db: &str) -> Result<Self> {
        let conn = Connection::open(format!("{db}.sqlite3"))?;
        conn.execute_batch(BOOTSTRAP)?;
        conn.execute_batch("BEGIN EXCLUSIVE")?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS _kv(key text primary key, value text);
            INSERT OR IGNORE INTO _kv(key, value) VALUES('lsn', '0');
            "#,
        )?;
        conn.execute_batch("BEGIN EXCLUSIVE")?;
        Ok(Self { conn })
    }

    /// Executes `sql`/`params` within the currently open transaction.
    /// Does not commit. Returns the number of rows affected.
    pub fn apply(&self, sql: &str, params: &crate::value::Params) -> Result<usize> {
        let bound = bind(params);
        let bound_refs: Vec<(&str, &dyn rusqlite::ToSql)> =
            bound.iter().map(|(k, v)| (k.as_str(), v as &dyn rusqlite::ToSql)).collect();

        let count = self.conn.execute(sql, bound_refs.as_slice())?;
        tracing::debug!(count, sql, "applied statement");
        Ok(count)
    }

    /// Advances `_kv.lsn` to `lsn` and commits the transaction containing
    /// every statement applied since the last `apply_commit`, then reopens a
    /// fresh exclusive transaction. `lsn` and the buffered statements commit
    /// atomically: both happen, or neither does.
    pub fn apply_commit(&self, lsn: u64) -> Result<()> {
        self.conn.execute(
            "update _kv set value=?1 where key='lsn'",
            [lsn.to_string()],
        )?;
        self.conn.execute_batch("COMMIT; BEGIN EXCLUSIVE")?;
        tracing::info!(lsn, "advanced local lsn");
        Ok(())
    }

    /// Reads the last locally-applied LSN from `_kv`.
    pub fn read_lsn(&self) -> Result<u64> {
        let value: String =
            self.conn
                .query_row("select value from _kv where key='lsn'", [], |row| row.get(0))?;
        value
            .parse()
            .map_err(|_| Error::Other(format!("_kv.lsn holds a non-integer value: {value}")))
    }

    /// Discards every statement applied since the last `apply_commit` and
    /// reopens a fresh exclusive transaction so the store remains usable.
    pub fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK; BEGIN EXCLUSIVE")?;
        Ok(())
    }

    /// Applies every statement of a decoded segment and advances the LSN in
    /// one engine transaction, as `sync` requires.
    pub fn apply_segment(&self, lsn: u64, statements: &[StatementRecord]) -> Result<()> {
        for record in statements {
            self.apply(&record.sql, &record.params)?;
        }
        self.apply_commit(lsn)
    }
}

impl Drop for LocalStore {
    fn drop(&mut self) {
        // Best-effort: discard any statements left pending at teardown.
        let _ = self.conn.execute_batch("ROLLBACK");
    }
}

fn bind(params: &crate::value::Params) -> Vec<(String, Box<dyn rusqlite::ToSql>)> {
    params
        .iter()
        .map(|(k, v)| {
            let name = format!(":{k}");
            let boxed: Box<dyn rusqlite::ToSql> = match v {
                Value::Int(i) => Box::new(*i),
                Value::Float(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.clone()),
                Value::Bytes(b) => Box::new(b.clone()),
                Value::Null => Box::new(rusqlite::types::Null),
            };
            (name, boxed)
        })
        .collect()
}
