//! Raw calls into the bundled SQLite library.
//!
//! This is the only module that contains `unsafe` code or C types. Everything
//! above it talks to [`RawConnection`] and [`RawStatement`], which release
//! their native resource exactly once, when dropped.
#![allow(unsafe_code)]

use std::ffi::{CStr, CString, c_int};
use std::ptr::{self, NonNull};
use std::slice;

use rusqlite::ffi;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::handle::{HandleKind, Resource};
use crate::value::Value;

// The bundled bindings only declare `sqlite3_close`, which refuses to close a
// connection that still has statements. The library itself exports the
// deferred variant.
unsafe extern "C" {
    fn sqlite3_close_v2(db: *mut ffi::sqlite3) -> c_int;
}

/// Outcome of one native step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Row,
    Done,
    Error(i32),
}

/// An open `sqlite3*` connection.
pub(crate) struct RawConnection {
    db: NonNull<ffi::sqlite3>,
}

impl RawConnection {
    /// Open `path` with the given `SQLITE_OPEN_*` flags.
    ///
    /// A partially opened connection is closed before the error is returned.
    pub(crate) fn open(path: &[u8], flags: c_int) -> Result<Self, EngineError> {
        let path = CString::new(path).map_err(|_| {
            EngineError::new(ffi::SQLITE_CANTOPEN, "database path contains a NUL byte")
        })?;
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: `path` is NUL-terminated and `db` is a valid out-pointer.
        let rc = unsafe { ffi::sqlite3_open_v2(path.as_ptr(), &mut db, flags, ptr::null()) };
        let Some(db) = NonNull::new(db) else {
            return Err(EngineError::new(rc, errstr(rc)));
        };
        let conn = Self { db };
        if rc != ffi::SQLITE_OK {
            let message = conn.errmsg();
            drop(conn);
            return Err(EngineError::new(rc, message));
        }
        Ok(conn)
    }

    /// Compile the first statement in `sql`.
    ///
    /// Text holding no statement at all compiles to an empty [`RawStatement`].
    pub(crate) fn prepare(&self, sql: &[u8]) -> Result<RawStatement, EngineError> {
        let len = c_int::try_from(sql.len())
            .map_err(|_| EngineError::new(ffi::SQLITE_TOOBIG, "SQL text is too long"))?;
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: `sql` is valid for `len` bytes and `stmt` is a valid out-pointer.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.db.as_ptr(),
                sql.as_ptr().cast(),
                len,
                &mut stmt,
                ptr::null_mut(),
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(EngineError::new(rc, self.errmsg()));
        }
        Ok(RawStatement { stmt })
    }

    pub(crate) fn errmsg(&self) -> String {
        errmsg(self.db.as_ptr())
    }

    pub(crate) fn changes(&self) -> i64 {
        // SAFETY: `db` is an open connection.
        i64::from(unsafe { ffi::sqlite3_changes(self.db.as_ptr()) })
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        // SAFETY: `db` is an open connection.
        unsafe { ffi::sqlite3_last_insert_rowid(self.db.as_ptr()) }
    }
}

impl Resource for RawConnection {
    const KIND: HandleKind = HandleKind::Connection;

    fn address(&self) -> *const () {
        self.db.as_ptr().cast_const().cast()
    }
}

impl Drop for RawConnection {
    fn drop(&mut self) {
        // SAFETY: `db` came from sqlite3_open_v2 and is dropped once. close_v2
        // defers the real teardown until every statement is finalized.
        let rc = unsafe { sqlite3_close_v2(self.db.as_ptr()) };
        if rc == ffi::SQLITE_OK {
            debug!(db = ?self.db, "closed database connection");
        } else {
            warn!(db = ?self.db, code = rc, "closing database connection failed");
        }
    }
}

/// A compiled `sqlite3_stmt*`, or nothing when the SQL text held no statement.
pub(crate) struct RawStatement {
    stmt: *mut ffi::sqlite3_stmt,
}

impl RawStatement {
    pub(crate) fn is_empty(&self) -> bool {
        self.stmt.is_null()
    }

    /// Index of a named parameter such as `:x`, `@x` or `$x`; 0 when unknown.
    pub(crate) fn parameter_index(&self, name: &[u8]) -> i32 {
        let Ok(name) = CString::new(name) else {
            return 0;
        };
        // SAFETY: sqlite accepts a null statement here and `name` is NUL-terminated.
        unsafe { ffi::sqlite3_bind_parameter_index(self.stmt, name.as_ptr()) }
    }

    pub(crate) fn parameter_count(&self) -> i32 {
        // SAFETY: sqlite accepts a null statement here.
        unsafe { ffi::sqlite3_bind_parameter_count(self.stmt) }
    }

    /// Bind `text` at `index`; sqlite keeps its own copy of the bytes.
    pub(crate) fn bind_text(&self, index: i32, text: &[u8]) -> i32 {
        let Ok(len) = c_int::try_from(text.len()) else {
            return ffi::SQLITE_TOOBIG;
        };
        // SAFETY: `text` is valid for `len` bytes and SQLITE_TRANSIENT makes
        // sqlite copy them before returning.
        unsafe {
            ffi::sqlite3_bind_text(
                self.stmt,
                index,
                text.as_ptr().cast(),
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        }
    }

    pub(crate) fn bind_double(&self, index: i32, value: f64) -> i32 {
        // SAFETY: sqlite validates the statement and index itself.
        unsafe { ffi::sqlite3_bind_double(self.stmt, index, value) }
    }

    pub(crate) fn step(&mut self) -> Step {
        if self.stmt.is_null() {
            return Step::Done;
        }
        // SAFETY: `stmt` is a live statement.
        match unsafe { ffi::sqlite3_step(self.stmt) } {
            ffi::SQLITE_ROW => Step::Row,
            ffi::SQLITE_DONE => Step::Done,
            rc => Step::Error(rc),
        }
    }

    pub(crate) fn reset(&mut self) -> i32 {
        // SAFETY: sqlite accepts a null statement here.
        unsafe { ffi::sqlite3_reset(self.stmt) }
    }

    pub(crate) fn column_count(&self) -> i32 {
        // SAFETY: sqlite accepts a null statement here.
        unsafe { ffi::sqlite3_column_count(self.stmt) }
    }

    /// Raw bytes of a column name, exactly as the engine reports them.
    pub(crate) fn column_name(&self, index: i32) -> Vec<u8> {
        // SAFETY: `index` is below column_count; the name stays valid until
        // the next call on this statement and is copied out immediately.
        unsafe {
            let name = ffi::sqlite3_column_name(self.stmt, index);
            if name.is_null() {
                Vec::new()
            } else {
                CStr::from_ptr(name).to_bytes().to_vec()
            }
        }
    }

    /// Read the current row's column `index`.
    ///
    /// Integers and floats both come back as [`Value::Number`]; text and blobs
    /// come back as their exact bytes.
    pub(crate) fn column_value(&self, index: i32) -> Value {
        // SAFETY: only called after a step returned a row and `index` is below
        // column_count. The blob pointer is read before its length, as sqlite
        // requires, and copied before any further call on the statement.
        unsafe {
            match ffi::sqlite3_column_type(self.stmt, index) {
                ffi::SQLITE_INTEGER | ffi::SQLITE_FLOAT => {
                    Value::Number(ffi::sqlite3_column_double(self.stmt, index))
                }
                ffi::SQLITE_TEXT | ffi::SQLITE_BLOB => {
                    let data = ffi::sqlite3_column_blob(self.stmt, index);
                    let len = usize::try_from(ffi::sqlite3_column_bytes(self.stmt, index))
                        .unwrap_or(0);
                    if data.is_null() || len == 0 {
                        Value::Bytes(Vec::new())
                    } else {
                        Value::Bytes(slice::from_raw_parts(data.cast::<u8>(), len).to_vec())
                    }
                }
                _ => Value::Absent,
            }
        }
    }

    /// Most recent error message of the connection that compiled this statement.
    pub(crate) fn errmsg(&self) -> String {
        // SAFETY: sqlite accepts a null statement here; the connection is kept
        // alive by close_v2 while this statement exists.
        errmsg(unsafe { ffi::sqlite3_db_handle(self.stmt) })
    }
}

impl Resource for RawStatement {
    const KIND: HandleKind = HandleKind::Statement;

    fn address(&self) -> *const () {
        self.stmt.cast_const().cast()
    }
}

impl Drop for RawStatement {
    fn drop(&mut self) {
        if self.stmt.is_null() {
            return;
        }
        // SAFETY: `stmt` came from sqlite3_prepare_v2 and is dropped once.
        let rc = unsafe { ffi::sqlite3_finalize(self.stmt) };
        if rc == ffi::SQLITE_OK {
            debug!(stmt = ?self.stmt, "finalized statement");
        } else {
            warn!(stmt = ?self.stmt, code = rc, "finalizing statement reported an error");
        }
    }
}

fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: sqlite3_errmsg accepts any connection pointer, null included,
    // and returns a NUL-terminated string that is copied out immediately.
    unsafe {
        let msg = ffi::sqlite3_errmsg(db);
        if msg.is_null() {
            String::new()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

fn errstr(code: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a static NUL-terminated string for any code.
    unsafe {
        let msg = ffi::sqlite3_errstr(code);
        if msg.is_null() {
            format!("sqlite error {code}")
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}
