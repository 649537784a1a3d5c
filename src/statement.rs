use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::Error;
use crate::handle::{Handle, Status};
use crate::native::{RawStatement, Step};
use crate::params::Params;
use crate::row::Row;

/// Where a statement's cursor stands.
///
/// Stepping is only meaningful while `Steppable`; in the other two states a
/// step quietly yields no row. `reset` is the only way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Steppable,
    Exhausted,
    Faulted,
}

impl CursorState {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            CursorState::Steppable => "steppable",
            CursorState::Exhausted => "exhausted",
            CursorState::Faulted => "faulted",
        }
    }
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A compiled statement with its cursor.
///
/// Every operation except [`Statement::finalize`] fails with
/// [`Error::InvalidStatement`] once the statement has been finalized.
pub struct Statement {
    handle: Handle<RawStatement>,
    cursor: CursorState,
    column_names: Option<Arc<Vec<Vec<u8>>>>,
}

impl Statement {
    pub(crate) fn new(raw: RawStatement) -> Self {
        Self {
            handle: Handle::new(raw),
            cursor: CursorState::Steppable,
            column_names: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.handle.status()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_ok()
    }

    #[must_use]
    pub fn state(&self) -> CursorState {
        self.cursor
    }

    fn raw(&self) -> Result<&RawStatement, Error> {
        self.handle.get().ok_or(Error::InvalidStatement)
    }

    /// Bind `params` in order and return the statement for chaining.
    ///
    /// Entries whose key resolves to no parameter, or whose value has no
    /// binding, are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatement`] if the statement was finalized.
    pub fn bind(&mut self, params: &Params) -> Result<&mut Self, Error> {
        let raw = self.raw()?;
        trace!(count = params.len(), "binding parameters");
        params.bind_to(raw);
        Ok(self)
    }

    /// Advance the cursor by one row.
    ///
    /// Returns `Ok(None)` at the end of the results, after an engine error
    /// (the cursor becomes [`CursorState::Faulted`]), and whenever the cursor
    /// is not steppable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatement`] if the statement was finalized.
    pub fn step(&mut self) -> Result<Option<Row>, Error> {
        let raw = self.handle.get_mut().ok_or(Error::InvalidStatement)?;
        if self.cursor != CursorState::Steppable {
            return Ok(None);
        }
        match raw.step() {
            Step::Row => {
                let values: Vec<_> = (0..raw.column_count())
                    .map(|i| raw.column_value(i))
                    .collect();
                // A schema change re-prepares the statement and may change its columns.
                let names = match &self.column_names {
                    Some(names) if names.len() == values.len() => Arc::clone(names),
                    _ => {
                        let names = Arc::new(column_names(raw));
                        self.column_names = Some(Arc::clone(&names));
                        names
                    }
                };
                Ok(Some(Row::new(names, values)))
            }
            Step::Done => {
                trace!("statement exhausted");
                self.cursor = CursorState::Exhausted;
                Ok(None)
            }
            Step::Error(code) => {
                debug!(code, message = %raw.errmsg(), "step failed");
                self.cursor = CursorState::Faulted;
                Ok(None)
            }
        }
    }

    /// Rewind the cursor. Bindings are left in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatement`] if the statement was finalized.
    pub fn reset(&mut self) -> Result<(), Error> {
        let raw = self.handle.get_mut().ok_or(Error::InvalidStatement)?;
        let rc = raw.reset();
        self.column_names = None;
        self.cursor = if rc == rusqlite::ffi::SQLITE_OK {
            CursorState::Steppable
        } else {
            CursorState::Faulted
        };
        trace!(code = rc, cursor = %self.cursor, "statement reset");
        Ok(())
    }

    /// Iterate the remaining rows.
    ///
    /// The iterator holds no state of its own: it just keeps stepping, so a
    /// [`Statement::reset`] makes the same statement iterable again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatement`] if the statement was finalized.
    pub fn rows(&mut self) -> Result<Rows<'_>, Error> {
        self.raw()?;
        Ok(Rows { stmt: self })
    }

    /// Result column names in order, as raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatement`] if the statement was finalized.
    pub fn column_names(&self) -> Result<Vec<Vec<u8>>, Error> {
        Ok(column_names(self.raw()?))
    }

    /// Number of parameters the statement takes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatement`] if the statement was finalized.
    pub fn parameter_count(&self) -> Result<i32, Error> {
        Ok(self.raw()?.parameter_count())
    }

    /// Whether the SQL text compiled to no statement at all.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatement`] if the statement was finalized.
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.raw()?.is_empty())
    }

    /// Release the native statement. Safe to call any number of times.
    pub fn finalize(&mut self) {
        self.cursor = CursorState::Faulted;
        self.column_names = None;
        if self.handle.release() {
            debug!("statement finalized");
        }
    }
}

fn column_names(raw: &RawStatement) -> Vec<Vec<u8>> {
    (0..raw.column_count()).map(|i| raw.column_name(i)).collect()
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.handle, f)
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("status", &self.handle.status())
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Rows of a [`Statement`], produced by stepping it.
///
/// Ends at the first step that yields no row, including after a fault; check
/// [`Statement::state`] to tell the two apart.
pub struct Rows<'a> {
    stmt: &'a mut Statement,
}

impl Rows<'_> {
    #[must_use]
    pub fn state(&self) -> CursorState {
        self.stmt.state()
    }
}

impl Iterator for Rows<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.stmt.step().ok().flatten()
    }
}
