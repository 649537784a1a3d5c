//! The Lua-facing API.
//!
//! Connections and statements are handed to Lua as userdata. Every function
//! re-checks that its handle argument really is one of ours before touching
//! it, so look-alike tables or foreign userdata are rejected with the fixed
//! caller-error messages. Those are raised as the bare message string, so
//! `pcall` hands back exactly `"Invalid parameters."` and its siblings.
//! Engine failures come back as `nil, message`.
//!
//! ```lua
//! local sqlite3 = require("sqlite3")
//! local db = assert(sqlite3.open(":memory:"))
//! db:exec("CREATE TABLE t(a, b)")
//! local stmt = db:prepare("INSERT INTO t VALUES(:a, :b)")
//! stmt:bind({ [":a"] = 1, [":b"] = "x" }):step()
//! for row in db:prepare("SELECT a, b FROM t"):rows() do
//!   print(row.a, row[2])
//! end
//! ```

use mlua::{
    AnyUserData, FromLuaMulti, Function, IntoLuaMulti, Lua, LuaSerdeExt, MaybeSend, MetaMethod,
    MultiValue, Result as LuaResult, Table, UserData, UserDataFields, UserDataMethods,
    Value as LuaValue,
};

use crate::config::OpenOptions;
use crate::connection::Connection;
use crate::error::Error;
use crate::handle::HandleKind;
use crate::params::{ParamKey, ParamValue, Params};
use crate::row::Row;
use crate::statement::Statement;
use crate::value::Value;

const STEP_FUNCTION_KEY: &str = "lua_sqlite3.statement_step";
const GUARD_KEY: &str = "lua_sqlite3.guard";
const VIOLATION_KEY: &str = "lua_sqlite3.violation";

// Wraps a native function so that a violation marker in first return
// position is raised as a plain string error.
const GUARD_SOURCE: &str = r#"
local marker, f = ...
local function check(...)
  if rawequal((...), marker) then
    error((select(2, ...)), 0)
  end
  return ...
end
return function(...)
  return check(f(...))
end
"#;

/// Build the library table: `open` plus the engine version.
///
/// # Errors
///
/// Errors when Lua runs out of memory.
pub fn module(lua: &Lua) -> LuaResult<Table> {
    step_function(lua)?;
    let exports = lua.create_table()?;
    exports.set("open", guarded(lua, database_open)?)?;
    exports.set("sqlite_version", rusqlite::version())?;
    Ok(exports)
}

fn registry_cached(
    lua: &Lua,
    key: &str,
    init: impl FnOnce(&Lua) -> LuaResult<LuaValue>,
) -> LuaResult<LuaValue> {
    match lua.named_registry_value::<LuaValue>(key)? {
        LuaValue::Nil => {
            let value = init(lua)?;
            lua.set_named_registry_value(key, value.clone())?;
            Ok(value)
        }
        value => Ok(value),
    }
}

/// Unique value a native function returns first to ask for a raised error.
fn violation_marker(lua: &Lua) -> LuaResult<LuaValue> {
    registry_cached(lua, VIOLATION_KEY, |lua| lua.create_table().map(LuaValue::Table))
}

/// Create a Lua function that runs `func` and raises contract violations
/// as their bare message.
fn guarded<A, R, F>(lua: &Lua, func: F) -> LuaResult<Function>
where
    A: FromLuaMulti,
    R: IntoLuaMulti,
    F: Fn(&Lua, A) -> LuaResult<R> + MaybeSend + 'static,
{
    let native = lua.create_function(move |lua, args: A| match func(lua, args) {
        Ok(ret) => ret.into_lua_multi(lua),
        Err(err) => match Error::contract_message(&err) {
            Some(message) => (violation_marker(lua)?, message).into_lua_multi(lua),
            None => Err(err),
        },
    })?;
    let guard = registry_cached(lua, GUARD_KEY, |lua| {
        lua.load(GUARD_SOURCE)
            .set_name("=sqlite3")
            .into_function()
            .map(LuaValue::Function)
    })?;
    let LuaValue::Function(guard) = guard else {
        return Err(mlua::Error::runtime("sqlite3 guard is not a function"));
    };
    guard.call((violation_marker(lua)?, native))
}

/// Whether `value` is a handle of `kind` created by this library.
///
/// The check is by Rust type identity of the userdata, not by its metatable
/// contents or name.
#[must_use]
pub fn is_instance_of(value: &LuaValue, kind: HandleKind) -> bool {
    match value {
        LuaValue::UserData(ud) => match kind {
            HandleKind::Connection => ud.is::<Connection>(),
            HandleKind::Statement => ud.is::<Statement>(),
        },
        _ => false,
    }
}

fn handle_arg(value: &LuaValue, kind: HandleKind) -> Option<&AnyUserData> {
    match value {
        LuaValue::UserData(ud) if is_instance_of(value, kind) => Some(ud),
        _ => None,
    }
}

/// Turn an error into the Lua convention: engine failures become
/// `nil, message`; caller errors are raised.
fn failure(lua: &Lua, err: Error) -> LuaResult<MultiValue> {
    match err {
        Error::Engine(e) => (LuaValue::Nil, e.message).into_lua_multi(lua),
        other => Err(other.into()),
    }
}

fn database_open(lua: &Lua, (path, options): (LuaValue, LuaValue)) -> LuaResult<MultiValue> {
    let path = match path {
        LuaValue::String(_) | LuaValue::Integer(_) | LuaValue::Number(_) => {
            lua.coerce_string(path)?
        }
        _ => None,
    };
    let Some(path) = path else {
        return Err(Error::InvalidParameters.into());
    };
    let options = match options {
        LuaValue::Nil => OpenOptions::default(),
        LuaValue::Table(_) => lua
            .from_value::<OpenOptions>(options)
            .map_err(|_| Error::InvalidParameters)?,
        _ => return Err(Error::InvalidParameters.into()),
    };
    match Connection::open_with(&*path.as_bytes(), &options) {
        Ok(conn) => lua.create_userdata(conn)?.into_lua_multi(lua),
        Err(err) => failure(lua, err),
    }
}

fn compile(this: &LuaValue, sql: &LuaValue) -> Result<Statement, Error> {
    let (Some(ud), LuaValue::String(sql)) = (handle_arg(this, HandleKind::Connection), sql) else {
        return Err(Error::InvalidParameters);
    };
    let conn = ud
        .borrow::<Connection>()
        .map_err(|_| Error::InvalidParameters)?;
    conn.prepare(&*sql.as_bytes())
}

fn connection_prepare(lua: &Lua, (this, sql): (LuaValue, LuaValue)) -> LuaResult<MultiValue> {
    match compile(&this, &sql) {
        Ok(stmt) => lua.create_userdata(stmt)?.into_lua_multi(lua),
        Err(err) => failure(lua, err),
    }
}

fn connection_exec(
    lua: &Lua,
    (this, sql, params): (LuaValue, LuaValue, LuaValue),
) -> LuaResult<MultiValue> {
    let mut stmt = match compile(&this, &sql) {
        Ok(stmt) => stmt,
        Err(err) => return failure(lua, err),
    };
    if let LuaValue::Table(params) = &params {
        stmt.bind(&params_from_table(params)?)?;
    }
    match stmt.step()? {
        Some(row) => row_to_table(lua, &row)?.into_lua_multi(lua),
        None => LuaValue::Nil.into_lua_multi(lua),
    }
}

fn connection_arg(this: &LuaValue) -> LuaResult<&AnyUserData> {
    handle_arg(this, HandleKind::Connection).ok_or_else(|| Error::InvalidParameters.into())
}

fn connection_methods(lua: &Lua) -> LuaResult<Table> {
    let methods = lua.create_table()?;
    methods.set("prepare", guarded(lua, connection_prepare)?)?;
    methods.set("exec", guarded(lua, connection_exec)?)?;
    methods.set(
        "close",
        guarded(lua, |_, this: LuaValue| {
            connection_arg(&this)?.borrow_mut::<Connection>()?.close();
            Ok(())
        })?,
    )?;
    methods.set(
        "changes",
        guarded(lua, |_, this: LuaValue| {
            Ok(connection_arg(&this)?.borrow::<Connection>()?.changes()?)
        })?,
    )?;
    methods.set(
        "last_insert_rowid",
        guarded(lua, |_, this: LuaValue| {
            Ok(connection_arg(&this)?
                .borrow::<Connection>()?
                .last_insert_rowid()?)
        })?,
    )?;
    Ok(methods)
}

impl UserData for Connection {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_meta_field_with(MetaMethod::Index, connection_methods);
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.to_string()));
        methods.add_meta_method_mut(MetaMethod::Close, |_, this, _: MultiValue| {
            this.close();
            Ok(())
        });
    }
}

/// Convert a Lua parameter table, in `next` order, into [`Params`].
fn params_from_table(table: &Table) -> LuaResult<Params> {
    let mut params = Params::new();
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair?;
        let key = match key {
            LuaValue::String(name) => ParamKey::Name(name.as_bytes().to_vec()),
            LuaValue::Integer(i) => ParamKey::from_integer(i),
            LuaValue::Number(n) => ParamKey::from_number(n),
            _ => ParamKey::Other,
        };
        let value = match value {
            LuaValue::String(text) => ParamValue::Text(text.as_bytes().to_vec()),
            LuaValue::Integer(i) => ParamValue::from(i),
            LuaValue::Number(n) => ParamValue::Number(n),
            _ => ParamValue::Unsupported,
        };
        params.push(key, value);
    }
    Ok(params)
}

fn value_to_lua(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
    Ok(match value {
        Value::Number(n) => LuaValue::Number(*n),
        Value::Bytes(bytes) => LuaValue::String(lua.create_string(bytes)?),
        Value::Absent => LuaValue::Boolean(false),
    })
}

/// Row table with every value under both its column name and its position.
fn row_to_table(lua: &Lua, row: &Row) -> LuaResult<Table> {
    let table = lua.create_table()?;
    for (i, (name, value)) in row.iter().enumerate() {
        let value = value_to_lua(lua, value)?;
        table.raw_set(i + 1, value.clone())?;
        table.raw_set(lua.create_string(name)?, value)?;
    }
    Ok(table)
}

fn statement_arg(this: &LuaValue, err: Error) -> LuaResult<&AnyUserData> {
    handle_arg(this, HandleKind::Statement).ok_or_else(|| err.into())
}

fn statement_step(lua: &Lua, this: LuaValue) -> LuaResult<Option<Table>> {
    let ud = statement_arg(&this, Error::InvalidParameter)?;
    let row = ud.borrow_mut::<Statement>()?.step()?;
    row.map(|row| row_to_table(lua, &row)).transpose()
}

/// The shared step function returned by `rows`, created once per Lua state.
fn step_function(lua: &Lua) -> LuaResult<Function> {
    if let Some(step) = lua.named_registry_value::<Option<Function>>(STEP_FUNCTION_KEY)? {
        return Ok(step);
    }
    let step = guarded(lua, statement_step)?;
    lua.set_named_registry_value(STEP_FUNCTION_KEY, step.clone())?;
    Ok(step)
}

fn statement_methods(lua: &Lua) -> LuaResult<Table> {
    let methods = lua.create_table()?;
    methods.set(
        "bind",
        guarded(lua, |_, (this, params): (LuaValue, LuaValue)| {
            let ud = statement_arg(&this, Error::InvalidParameters)?;
            let LuaValue::Table(params) = params else {
                return Err(Error::InvalidParameters.into());
            };
            if !ud.borrow::<Statement>()?.is_valid() {
                return Err(Error::InvalidStatement.into());
            }
            let params = params_from_table(&params)?;
            ud.borrow_mut::<Statement>()?.bind(&params)?;
            Ok(ud.clone())
        })?,
    )?;
    methods.set("step", step_function(lua)?)?;
    methods.set(
        "reset",
        guarded(lua, |_, this: LuaValue| {
            statement_arg(&this, Error::InvalidParameter)?
                .borrow_mut::<Statement>()?
                .reset()?;
            Ok(())
        })?,
    )?;
    methods.set(
        "rows",
        guarded(lua, |lua, this: LuaValue| {
            let ud = statement_arg(&this, Error::InvalidParameter)?;
            if !ud.borrow::<Statement>()?.is_valid() {
                return Err(Error::InvalidStatement.into());
            }
            Ok((step_function(lua)?, ud.clone()))
        })?,
    )?;
    methods.set(
        "finalize",
        guarded(lua, |_, this: LuaValue| {
            statement_arg(&this, Error::InvalidParameter)?
                .borrow_mut::<Statement>()?
                .finalize();
            Ok(())
        })?,
    )?;
    methods.set(
        "state",
        guarded(lua, |_, this: LuaValue| {
            let ud = statement_arg(&this, Error::InvalidParameter)?;
            let stmt = ud.borrow::<Statement>()?;
            Ok(stmt.state().name())
        })?,
    )?;
    methods.set(
        "columns",
        guarded(lua, |lua, this: LuaValue| {
            let ud = statement_arg(&this, Error::InvalidParameter)?;
            let names = ud.borrow::<Statement>()?.column_names()?;
            let names = names
                .iter()
                .map(|name| lua.create_string(name))
                .collect::<LuaResult<Vec<_>>>()?;
            lua.create_sequence_from(names)
        })?,
    )?;
    Ok(methods)
}

impl UserData for Statement {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_meta_field_with(MetaMethod::Index, statement_methods);
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.to_string()));
        methods.add_meta_method_mut(MetaMethod::Close, |_, this, _: MultiValue| {
            this.finalize();
            Ok(())
        });
    }
}
