//! SQLite for Lua.
//!
//! Opens databases, compiles parameterized statements and steps through their
//! rows, exposing connections and statements to Lua as garbage-collected
//! userdata. The same machinery is usable directly from Rust:
//!
//! ```rust
//! use lua_sqlite3::{Connection, Params, Value};
//!
//! let db = Connection::open_in_memory()?;
//! db.exec("CREATE TABLE t(a, b)", None)?;
//! db.exec(
//!     "INSERT INTO t VALUES(?, ?)",
//!     Some(&Params::new().with(1, 1_i64).with(2, "x")),
//! )?;
//! let row = db.exec("SELECT a, b FROM t", None)?.expect("one row");
//! assert_eq!(row.get("a"), Some(&Value::Number(1.0)));
//! assert_eq!(row.get_by_position(2), Some(&Value::Bytes(b"x".to_vec())));
//! # Ok::<_, lua_sqlite3::Error>(())
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handle;
pub mod lua;
mod native;
pub mod params;
pub mod row;
pub mod statement;
pub mod value;

pub use config::{OpenMode, OpenOptions, OpenOptionsBuilder};
pub use connection::Connection;
pub use error::{EngineError, Error};
pub use handle::{HandleKind, Status};
pub use lua::{is_instance_of, module};
pub use params::{ParamKey, ParamValue, Params};
pub use row::Row;
pub use statement::{CursorState, Rows, Statement};
pub use value::Value;

/// Entry point for `require("sqlite3")` when built as a loadable module.
#[cfg(feature = "module")]
#[allow(unsafe_code)]
mod entry {
    #[mlua::lua_module(name = "sqlite3")]
    fn sqlite3(lua: &mlua::Lua) -> mlua::Result<mlua::Table> {
        crate::lua::module(lua)
    }
}
