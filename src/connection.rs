use std::fmt;

use tracing::debug;

use crate::config::OpenOptions;
use crate::error::Error;
use crate::handle::{Handle, Status};
use crate::native::RawConnection;
use crate::params::Params;
use crate::row::Row;
use crate::statement::Statement;

/// An open database connection.
///
/// Closing is idempotent and also happens on drop. Statements compiled from a
/// connection do not keep it open from the caller's point of view, but the
/// native connection is only torn down once the last of them is finalized.
pub struct Connection {
    handle: Handle<RawConnection>,
}

impl Connection {
    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] with the engine's message if the open fails;
    /// no native resource is left behind.
    pub fn open(path: impl AsRef<[u8]>) -> Result<Self, Error> {
        Self::open_with(path, &OpenOptions::default())
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the engine cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::open(":memory:")
    }

    /// Open `path` with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the native open fails.
    pub fn open_with(path: impl AsRef<[u8]>, options: &OpenOptions) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = RawConnection::open(path, options.flags().bits()).inspect_err(|e| {
            debug!(
                path = %String::from_utf8_lossy(path),
                code = e.code,
                message = %e.message,
                "failed to open database"
            );
        })?;
        debug!(path = %String::from_utf8_lossy(path), ?options, "opened database");
        Ok(Self {
            handle: Handle::new(raw),
        })
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.handle.status()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.is_ok()
    }

    fn raw(&self) -> Result<&RawConnection, Error> {
        self.handle.get().ok_or(Error::InvalidConnection)
    }

    /// Compile the first statement in `sql`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConnection`] if the connection is closed and
    /// [`Error::Engine`] with the engine's message if compilation fails.
    pub fn prepare(&self, sql: impl AsRef<[u8]>) -> Result<Statement, Error> {
        let sql = sql.as_ref();
        let raw = self.raw()?;
        match raw.prepare(sql) {
            Ok(stmt) => {
                debug!(sql = %String::from_utf8_lossy(sql), "prepared statement");
                Ok(Statement::new(stmt))
            }
            Err(e) => {
                debug!(
                    sql = %String::from_utf8_lossy(sql),
                    code = e.code,
                    message = %e.message,
                    "failed to prepare statement"
                );
                Err(Error::Engine(e))
            }
        }
    }

    /// Prepare, optionally bind, and step once.
    ///
    /// The compiled statement is finalized before returning, so this is only
    /// useful for statements whose first row (or side effect) is all that
    /// matters.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::prepare`].
    pub fn exec(&self, sql: impl AsRef<[u8]>, params: Option<&Params>) -> Result<Option<Row>, Error> {
        let mut stmt = self.prepare(sql)?;
        if let Some(params) = params {
            stmt.bind(params)?;
        }
        stmt.step()
    }

    /// Rows modified by the most recent INSERT, UPDATE or DELETE.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConnection`] if the connection is closed.
    pub fn changes(&self) -> Result<i64, Error> {
        Ok(self.raw()?.changes())
    }

    /// Rowid of the most recent successful INSERT.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConnection`] if the connection is closed.
    pub fn last_insert_rowid(&self) -> Result<i64, Error> {
        Ok(self.raw()?.last_insert_rowid())
    }

    /// Most recent engine error message, or `None` if closed.
    #[must_use]
    pub fn last_error_message(&self) -> Option<String> {
        self.handle.get().map(RawConnection::errmsg)
    }

    /// Close the connection. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.handle.release() {
            debug!("database connection released");
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.handle, f)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("status", &self.handle.status())
            .finish()
    }
}
