//! Statement lifecycle wrapper
//!
//! Every statement the directory runs goes through [`SqlTemplate`]: it applies
//! the query timeout, prepares (cached) the statement, runs it and wraps any
//! driver error together with the statement text. Statements and row cursors
//! are released by their destructors on every exit path.

use crate::context::TxContext;
use crate::error::{DirectoryError, Result};
use rusqlite::{Params, Row};
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlTemplate {
    query_timeout: Duration,
}

impl SqlTemplate {
    pub fn new(query_timeout: Duration) -> Self {
        SqlTemplate { query_timeout }
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    fn wrap(sql: &str) -> impl FnOnce(rusqlite::Error) -> DirectoryError + '_ {
        move |e| {
            trace!("Failed to execute sql [{}]: {}", sql, e);
            DirectoryError::store(sql, e)
        }
    }

    fn prepare_connection(&self, ctx: &TxContext<'_>, sql: &str) -> Result<()> {
        trace!("{}: {}", ctx.id(), sql);
        ctx.connection()
            .busy_timeout(self.query_timeout)
            .map_err(Self::wrap(sql))
    }

    /// Run a query expected to return at most one row
    pub fn query_optional<T, P, F>(
        &self,
        ctx: &TxContext<'_>,
        sql: &str,
        params: P,
        map_row: F,
    ) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.prepare_connection(ctx, sql)?;
        let mut stmt = ctx
            .connection()
            .prepare_cached(sql)
            .map_err(Self::wrap(sql))?;
        let mut rows = stmt.query(params).map_err(Self::wrap(sql))?;
        match rows.next().map_err(Self::wrap(sql))? {
            Some(row) => map_row(row).map(Some).map_err(Self::wrap(sql)),
            None => Ok(None),
        }
    }

    /// Run a query and map every row
    pub fn query_all<T, P, F>(
        &self,
        ctx: &TxContext<'_>,
        sql: &str,
        params: P,
        mut map_row: F,
    ) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.prepare_connection(ctx, sql)?;
        let mut stmt = ctx
            .connection()
            .prepare_cached(sql)
            .map_err(Self::wrap(sql))?;
        let mut rows = stmt.query(params).map_err(Self::wrap(sql))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(Self::wrap(sql))? {
            out.push(map_row(row).map_err(Self::wrap(sql))?);
        }
        Ok(out)
    }

    /// Run an insert/update/delete, returning the number of affected rows
    pub fn execute<P: Params>(&self, ctx: &TxContext<'_>, sql: &str, params: P) -> Result<usize> {
        self.prepare_connection(ctx, sql)?;
        let mut stmt = ctx
            .connection()
            .prepare_cached(sql)
            .map_err(Self::wrap(sql))?;
        stmt.execute(params).map_err(Self::wrap(sql))
    }

    /// Run one or more unparameterized statements (DDL, savepoints)
    pub fn execute_batch(&self, ctx: &TxContext<'_>, sql: &str) -> Result<()> {
        self.prepare_connection(ctx, sql)?;
        ctx.connection()
            .execute_batch(sql)
            .map_err(Self::wrap(sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{params, Connection};

    fn template() -> SqlTemplate {
        SqlTemplate::new(Duration::from_secs(1))
    }

    #[test]
    fn test_execute_and_query() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let t = template();

        t.execute_batch(&ctx, "create table kv (k text primary key, v integer)")
            .unwrap();
        assert_eq!(t.execute(&ctx, "insert into kv values (?1, ?2)", params!["a", 1]).unwrap(), 1);
        assert_eq!(t.execute(&ctx, "insert into kv values (?1, ?2)", params!["b", 2]).unwrap(), 1);

        let v: Option<i64> = t
            .query_optional(&ctx, "select v from kv where k = ?1", ["b"], |r| r.get(0))
            .unwrap();
        assert_eq!(v, Some(2));

        let missing: Option<i64> = t
            .query_optional(&ctx, "select v from kv where k = ?1", ["zz"], |r| r.get(0))
            .unwrap();
        assert_eq!(missing, None);

        let keys: Vec<String> = t
            .query_all(&ctx, "select k from kv order by k", [], |r| r.get(0))
            .unwrap();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_errors_carry_statement() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let err = template()
            .execute(&ctx, "insert into nowhere values (1)", [])
            .unwrap_err();
        match err {
            DirectoryError::Store { sql, .. } => assert_eq!(sql, "insert into nowhere values (1)"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_row_mapping_error_is_wrapped() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = TxContext::new(&conn);
        let err = template()
            .query_optional(&ctx, "select 'text'", [], |r| r.get::<_, i64>(0))
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Store { .. }));
    }
}
