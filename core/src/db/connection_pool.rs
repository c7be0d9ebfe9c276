// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{
    fmt::{Debug, Formatter},
    time::Duration,
};

use diesel::{
    connection::SimpleConnection,
    r2d2::{ConnectionManager, Pool, PooledConnection},
    Connection, SqliteConnection,
};

use crate::{async_runtime as rt, config, db::schema_migrations, Error};

/// A Sqlite connection pool shared by every collector of the process.
#[derive(Clone)]
pub struct ConnectionPool {
    pool: Pool<ConnectionManager<SqliteConnection>>,
    db_path: String,
}

type PooledSqliteConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

impl ConnectionPool {
    pub fn new(db_path: &str) -> Result<Self, Error> {
        let manager = ConnectionManager::new(db_path);
        let pool = Pool::builder()
            .max_size(config::DB_CONNECTION_POOL_SIZE)
            .connection_customizer(Box::new(ConnectionOptions {
                // Needed to allow concurrent transactions from many collectors
                busy_timeout: config::DB_BUSY_TIMEOUT,
            }))
            .build(manager)?;
        Ok(Self {
            pool,
            db_path: db_path.into(),
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Get a Sqlite connection.
    pub fn connection(&self) -> Result<PooledSqliteConnection, Error> {
        let conn = self.pool.get()?;
        Ok(conn)
    }

    /// Apply pending schema migrations in an exclusive transaction.
    pub fn run_migrations(&self) -> Result<(), Error> {
        self.exclusive_transaction(|mut tx_conn| {
            schema_migrations::run_migrations(&mut tx_conn)
        })
    }

    /// Start a deferred transaction.
    pub fn deferred_transaction<T, F>(&self, callback: F) -> Result<T, Error>
    where
        F: FnOnce(DeferredTxConnection) -> Result<T, Error>,
    {
        let mut conn = self.connection()?;
        conn.transaction::<T, Error, _>(|conn| {
            let tx_conn = DeferredTxConnection(conn);
            callback(tx_conn)
        })
    }

    /// Run a deferred transaction on the blocking thread pool so that async collectors don't
    /// block the executor while Sqlite waits for the write lock.
    /// The closure must not perform network requests: transactions are never held across a
    /// fetch.
    pub async fn deferred_transaction_async<T, F>(&self, callback: F) -> Result<T, Error>
    where
        F: FnOnce(DeferredTxConnection) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        rt::spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction::<T, Error, _>(|conn| {
                let tx_conn = DeferredTxConnection(conn);
                callback(tx_conn)
            })
        })
        .await?
    }

    /// Start an exclusive transaction.
    pub fn exclusive_transaction<T, F>(&self, callback: F) -> Result<T, Error>
    where
        F: FnOnce(ExclusiveTxConnection) -> Result<T, Error>,
    {
        let mut connection = self.connection()?;
        connection.exclusive_transaction::<T, Error, _>(|conn| {
            let tx_conn = ExclusiveTxConnection(conn);
            callback(tx_conn)
        })
    }

    /// Flush the WAL into the main database file. Called at the end of a collection run.
    pub fn checkpoint(&self) -> Result<(), Error> {
        let mut conn = self.connection()?;
        conn.batch_execute("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

impl Debug for ConnectionPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("db_path", &self.db_path)
            .field("state", &self.pool.state())
            .finish()
    }
}

/// A deferred Sqlite transaction. Functions that execute queries should take this as argument
/// instead of `SqliteConnection` if they should be executed in a deferred transaction.
pub struct DeferredTxConnection<'a>(&'a mut SqliteConnection);

impl<'a> AsMut<SqliteConnection> for DeferredTxConnection<'a> {
    fn as_mut(&mut self) -> &mut SqliteConnection {
        self.0
    }
}

impl<'a> Debug for DeferredTxConnection<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredTxConnection").finish()
    }
}

/// An exclusive Sqlite transaction. Functions that execute queries should take this as argument
/// instead of `SqliteConnection` if they should be executed in an exclusive transaction.
pub struct ExclusiveTxConnection<'a>(&'a mut SqliteConnection);

impl<'a> AsMut<SqliteConnection> for ExclusiveTxConnection<'a> {
    fn as_mut(&mut self) -> &mut SqliteConnection {
        self.0
    }
}

// Exclusive transaction guarantees are superset of deferred guarantees, so it's safe to go from
// exclusive to deferred, but not the other way around.
impl<'a> From<ExclusiveTxConnection<'a>> for DeferredTxConnection<'a> {
    fn from(tx_conn: ExclusiveTxConnection<'a>) -> Self {
        DeferredTxConnection(tx_conn.0)
    }
}

impl<'a> Debug for ExclusiveTxConnection<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusiveTxConnection").finish()
    }
}

// Based on https://stackoverflow.com/a/57717533
#[derive(Debug)]
pub struct ConnectionOptions {
    pub busy_timeout: Duration,
}

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error>
    for ConnectionOptions
{
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let timeout = self.busy_timeout.as_millis();
        let query = &format!(
            "
            PRAGMA busy_timeout = {timeout};
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        "
        );
        conn.batch_execute(query)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}
