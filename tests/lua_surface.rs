use lua_sqlite3::{Connection, HandleKind, is_instance_of, module};
use mlua::{Lua, Value as LuaValue};

fn lua_with_sqlite3() -> mlua::Result<Lua> {
    let lua = Lua::new();
    let exports = module(&lua)?;
    lua.globals().set("sqlite3", exports)?;
    lua.load(
        r#"
        function expect_error(message, f, ...)
          local ok, err = pcall(f, ...)
          assert(not ok, "expected an error")
          assert(err == message, tostring(err))
        end
        "#,
    )
    .exec()?;
    Ok(lua)
}

fn run(chunk: &str) -> Result<(), Box<dyn std::error::Error>> {
    let lua = lua_with_sqlite3()?;
    lua.load(chunk).exec()?;
    Ok(())
}

#[test]
fn exec_scenario_returns_named_and_positional_values() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db = assert(sqlite3.open(":memory:"))
        assert(db:exec("CREATE TABLE t(a,b)") == nil)
        assert(db:exec("INSERT INTO t VALUES(1,'x')") == nil)
        local row = db:exec("SELECT a,b FROM t")
        assert(row.a == 1.0 and math.type(row.a) == "float")
        assert(row.b == "x")
        assert(row[1] == 1.0)
        assert(row[2] == "x")
        assert(#row == 2)
    "#)
}

#[test]
fn open_failure_returns_nil_and_message() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db, err = sqlite3.open("/nonexistent/path/that/cannot/be/created")
        assert(db == nil)
        assert(type(err) == "string" and #err > 0)
    "#)
}

#[test]
fn caller_errors_raise_fixed_messages() -> Result<(), Box<dyn std::error::Error>> {
    run(r##"
        local db = assert(sqlite3.open(":memory:"))
        local stmt = assert(db:prepare("SELECT 1"))

        expect_error("Invalid parameters.", sqlite3.open, {})
        expect_error("Invalid parameters.", sqlite3.open, ":memory:", { mode = "bogus" })
        expect_error("Invalid parameters.", db.prepare, db, 42)
        expect_error("Invalid parameters.", db.prepare, {}, "SELECT 1")
        expect_error("Invalid parameters.", db.prepare, stmt, "SELECT 1")
        expect_error("Invalid parameters.", db.exec, nil, "SELECT 1")
        expect_error("Invalid parameters.", stmt.bind, stmt, "not a table")
        expect_error("Invalid parameters.", stmt.bind, db, {})
        expect_error("Invalid parameter.", stmt.step, db)
        expect_error("Invalid parameter.", stmt.reset, {})
        expect_error("Invalid parameter.", stmt.rows, nil)

        local ok, err = pcall(sqlite3.open, {})
        assert(not ok and type(err) == "string" and err == "Invalid parameters.")
        assert(select("#", stmt:reset()) == 0)
    "##)
}

#[test]
fn prepare_failure_returns_nil_and_message() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db = assert(sqlite3.open(":memory:"))
        local stmt, err = db:prepare("SELEC oops")
        assert(stmt == nil)
        assert(string.find(err, "syntax error", 1, true), err)
        local row, exec_err = db:exec("SELECT * FROM missing_table")
        assert(row == nil)
        assert(string.find(exec_err, "no such table", 1, true), exec_err)
    "#)
}

#[test]
fn closed_connection_raises_invalid_database() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db = assert(sqlite3.open(":memory:"))
        db:close()
        db:close()
        assert(tostring(db) == "database: 0x0")
        expect_error("Invalid database.", db.prepare, db, "SELECT 1")
        expect_error("Invalid database.", db.exec, db, "SELECT 1")
        expect_error("Invalid database.", db.changes, db)
    "#)
}

#[test]
fn rows_iterates_and_reset_restarts() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db = assert(sqlite3.open(":memory:"))
        db:exec("CREATE TABLE t(n)")
        local insert = assert(db:prepare("INSERT INTO t VALUES(?)"))
        for i = 1, 4 do
          insert:bind({ i }):step()
          insert:reset()
        end

        local stmt = assert(db:prepare("SELECT n FROM t ORDER BY n"))
        local seen = {}
        for row in stmt:rows() do
          seen[#seen + 1] = row.n
        end
        assert(#seen == 4 and seen[1] == 1 and seen[4] == 4)
        assert(stmt:state() == "exhausted")
        assert(stmt:step() == nil)

        stmt:reset()
        assert(stmt:state() == "steppable")
        local count = 0
        for _ in stmt:rows() do count = count + 1 end
        assert(count == 4)

        local step1 = stmt:rows()
        local step2 = insert:rows()
        assert(step1 == step2)
    "#)
}

#[test]
fn empty_select_exhausts_without_error() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db = assert(sqlite3.open(":memory:"))
        local stmt = assert(db:prepare("SELECT 1 WHERE 0"))
        assert(stmt:step() == nil)
        assert(stmt:state() == "exhausted")
        assert(stmt:step() == nil)
    "#)
}

#[test]
fn engine_error_is_visible_only_through_state() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db = assert(sqlite3.open(":memory:"))
        db:exec("CREATE TABLE u(a UNIQUE)")
        db:exec("INSERT INTO u VALUES(1)")
        local dup = assert(db:prepare("INSERT INTO u VALUES(1)"))
        assert(dup:step() == nil)
        assert(dup:state() == "faulted")
        assert(dup:step() == nil)
    "#)
}

#[test]
fn bind_by_name_or_index_and_chain() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db = assert(sqlite3.open(":memory:"))
        local stmt = assert(db:prepare("SELECT :x AS v"))
        assert(stmt:bind({ [":x"] = 5 }) == stmt)
        local by_name = stmt:step().v
        stmt:reset()
        local by_index = stmt:bind({ [1] = 5 }):step().v
        assert(by_name == 5 and by_index == 5)

        local mixed = db:exec("SELECT :a AS a, ? AS b", { [":a"] = "x", [2.7] = 3, [true] = 9, [":c"] = {} })
        assert(mixed.a == "x" and mixed.b == 3)

        local skipped = db:exec("SELECT ? AS v", { true })
        assert(skipped.v == false)
    "#)
}

#[test]
fn strings_round_trip_byte_exact() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db = assert(sqlite3.open(":memory:"))
        local payload = "a\0b\255\0"
        local row = db:exec("SELECT ? AS v", { payload })
        assert(row.v == payload and #row.v == 5)
        assert(db:exec("SELECT x'00ff' AS b").b == "\0\255")
    "#)
}

#[test]
fn null_reads_as_false_at_both_addresses() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db = assert(sqlite3.open(":memory:"))
        local row = db:exec("SELECT NULL AS n, 7 AS m")
        assert(row.n == false and row[1] == false)
        assert(rawget(row, "n") ~= nil)
        assert(row.m == 7 and row[2] == 7)
    "#)
}

#[test]
fn finalize_and_to_be_closed_release_handles() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db = assert(sqlite3.open(":memory:"))
        local stmt = assert(db:prepare("SELECT 1"))
        assert(string.find(tostring(stmt), "statement: ", 1, true) == 1)
        stmt:finalize()
        stmt:finalize()
        assert(tostring(stmt) == "statement: 0x0")
        expect_error("Invalid statement.", stmt.step, stmt)
        expect_error("Invalid statement.", stmt.bind, stmt, {})
        expect_error("Invalid statement.", stmt.rows, stmt)

        local kept
        do
          local scoped <close> = assert(sqlite3.open(":memory:"))
          kept = scoped
        end
        expect_error("Invalid database.", kept.prepare, kept, "SELECT 1")
    "#)
}

#[test]
fn garbage_collection_tolerates_any_order() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        do
          local db = assert(sqlite3.open(":memory:"))
          local stmt = assert(db:prepare("SELECT 1"))
          db:close()
          stmt:step()
        end
        collectgarbage()
        collectgarbage()

        local survivor
        do
          local db = assert(sqlite3.open(":memory:"))
          survivor = assert(db:prepare("SELECT 2 AS two"))
        end
        collectgarbage()
        collectgarbage()
        local row = survivor:step()
        assert(row == nil or row.two == 2)
        survivor:finalize()
        collectgarbage()
    "#)
}

#[test]
fn open_accepts_options_and_columns_lists_names() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db = assert(sqlite3.open("file::memory:", { mode = "rwc", uri = true }))
        local stmt = assert(db:prepare("SELECT 1 AS one, 2 AS two"))
        local cols = stmt:columns()
        assert(#cols == 2 and cols[1] == "one" and cols[2] == "two")
        assert(type(sqlite3.sqlite_version) == "string")

        db:exec("CREATE TABLE t(id INTEGER PRIMARY KEY, v)")
        db:exec("INSERT INTO t(v) VALUES('a')")
        assert(db:last_insert_rowid() == 1)
        assert(db:changes() == 1)
    "#)
}

#[test]
fn instance_check_is_by_type_identity() -> Result<(), Box<dyn std::error::Error>> {
    let lua = lua_with_sqlite3()?;
    let conn = LuaValue::UserData(lua.create_userdata(Connection::open_in_memory()?)?);
    assert!(is_instance_of(&conn, HandleKind::Connection));
    assert!(!is_instance_of(&conn, HandleKind::Statement));

    let lookalike = lua
        .load("return setmetatable({}, { __name = 'database' })")
        .eval::<LuaValue>()?;
    assert!(!is_instance_of(&lookalike, HandleKind::Connection));
    assert!(!is_instance_of(&LuaValue::Nil, HandleKind::Statement));
    Ok(())
}

#[test]
fn row_tables_follow_columns_added_after_reset() -> Result<(), Box<dyn std::error::Error>> {
    run(r#"
        local db = assert(sqlite3.open(":memory:"))
        db:exec("CREATE TABLE t(a, b)")
        db:exec("INSERT INTO t VALUES(1, 2)")
        local stmt = assert(db:prepare("SELECT * FROM t"))
        assert(#stmt:step() == 2)
        stmt:reset()
        db:exec("ALTER TABLE t ADD COLUMN c DEFAULT 3")
        local row = stmt:step()
        assert(#row == 3 and row[3] == 3 and row.c == 3)
        local cols = stmt:columns()
        assert(#cols == 3 and cols[3] == "c")
    "#)
}
