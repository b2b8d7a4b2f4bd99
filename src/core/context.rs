//! Transaction context
//!
//! Every directory call runs against a [`TxContext`]: the caller's connection,
//! a process-unique identity for it, and the cache of blob handles opened by
//! fetch-per-transaction readers. The directory never commits or rolls back;
//! the caller ends the transaction through the context, which releases the
//! cached handles first so none outlive the transaction.

use crate::error::{DirectoryError, Result};
use parking_lot::Mutex;
use rusqlite::blob::Blob;
use rusqlite::Connection;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of the connection a context wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Cache key: connection identity, table, file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobKey {
    pub connection: ConnectionId,
    pub table: String,
    pub name: String,
}

/// Open blob handles bound to one transaction
///
/// Readers inside the same transaction may race to populate or consult the
/// cache, so all access goes through one coarse lock.
pub struct BlobCache<'c> {
    connection: ConnectionId,
    entries: Mutex<HashMap<BlobKey, Blob<'c>>>,
}

impl<'c> BlobCache<'c> {
    fn new(connection: ConnectionId) -> Self {
        BlobCache {
            connection,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn key(&self, table: &str, name: &str) -> BlobKey {
        BlobKey {
            connection: self.connection,
            table: table.to_string(),
            name: name.to_string(),
        }
    }

    /// Read `buf.len()` bytes at `offset` from the cached handle for
    /// `table`/`name`, opening and caching it with `open` on first use
    pub fn read_at<F>(
        &self,
        table: &str,
        name: &str,
        offset: u64,
        buf: &mut [u8],
        open: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<Blob<'c>>,
    {
        let mut entries = self.entries.lock();
        let blob = match entries.entry(self.key(table, name)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!("{}: binding blob handle for {}/{}", self.connection, table, name);
                entry.insert(open()?)
            }
        };

        let end = offset + buf.len() as u64;
        if end > blob.len() as u64 {
            return Err(DirectoryError::CorruptionOrEof(format!(
                "{}/{}: read of {} bytes at {} exceeds blob length {}",
                table,
                name,
                buf.len(),
                offset,
                blob.len()
            )));
        }

        trace!("{}: blob read {}/{} @{} +{}", self.connection, table, name, offset, buf.len());
        blob.read_at_exact(buf, offset as usize).map_err(|e| {
            DirectoryError::store(format!("blob read [{}/{}]", table, name), e)
        })
    }

    /// Whether a handle is cached for `table`/`name`
    pub fn contains(&self, table: &str, name: &str) -> bool {
        self.entries.lock().contains_key(&self.key(table, name))
    }

    /// Drop the handle for one file. Returns true if one was cached.
    pub fn release(&self, table: &str, name: &str) -> bool {
        let released = self.entries.lock().remove(&self.key(table, name)).is_some();
        if released {
            debug!("{}: released blob handle for {}/{}", self.connection, table, name);
        }
        released
    }

    /// Drop every cached handle, returning how many were held
    pub fn release_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        if count > 0 {
            debug!("{}: released {} blob handles", self.connection, count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// A connection plus the resources bound to its current transaction
///
/// Create one per unit of work with [`TxContext::begin`] (explicit
/// transaction) or [`TxContext::new`] (join whatever state the connection is
/// in, e.g. autocommit). End it with [`TxContext::commit`],
/// [`TxContext::rollback`] or by dropping it; each path flushes the blob cache.
pub struct TxContext<'c> {
    conn: &'c Connection,
    id: ConnectionId,
    blobs: BlobCache<'c>,
}

impl<'c> TxContext<'c> {
    /// Wrap a connection without starting a transaction
    pub fn new(conn: &'c Connection) -> Self {
        let id = ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        TxContext {
            conn,
            id,
            blobs: BlobCache::new(id),
        }
    }

    /// Wrap a connection and start a transaction on it
    pub fn begin(conn: &'c Connection) -> Result<Self> {
        conn.execute_batch("begin")
            .map_err(|e| DirectoryError::store("begin", e))?;
        let ctx = Self::new(conn);
        debug!("{}: transaction started", ctx.id);
        Ok(ctx)
    }

    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn blob_cache(&self) -> &BlobCache<'c> {
        &self.blobs
    }

    /// Whether a transaction is open on the connection
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Release cached blobs and commit the open transaction, if any
    pub fn commit(self) -> Result<()> {
        self.blobs.release_all();
        if self.in_transaction() {
            self.conn
                .execute_batch("commit")
                .map_err(|e| DirectoryError::store("commit", e))?;
            debug!("{}: committed", self.id);
        }
        Ok(())
    }

    /// Release cached blobs and roll back the open transaction, if any
    pub fn rollback(self) -> Result<()> {
        self.blobs.release_all();
        if self.in_transaction() {
            self.conn
                .execute_batch("rollback")
                .map_err(|e| DirectoryError::store("rollback", e))?;
            debug!("{}: rolled back", self.id);
        }
        Ok(())
    }
}

impl Drop for TxContext<'_> {
    fn drop(&mut self) {
        self.blobs.release_all();
    }
}

impl fmt::Debug for TxContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxContext")
            .field("id", &self.id)
            .field("cached_blobs", &self.blobs.len())
            .finish()
    }
}
