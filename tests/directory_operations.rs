//! General directory operations against SQLite

use rusqlite::Connection;
use sqldir::{
    Directory, DirectoryError, DirectorySettings, FileEntrySettings, HandlerType, SqliteDialect,
    TxContext,
};
use std::sync::Arc;

fn directory() -> Directory {
    Directory::with_defaults("index_files", Arc::new(SqliteDialect)).unwrap()
}

fn write(dir: &Directory, ctx: &TxContext<'_>, name: &str, bytes: &[u8]) {
    let mut out = dir.create_output(ctx, name).unwrap();
    out.write_bytes(bytes).unwrap();
    out.close().unwrap();
}

fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}

#[test]
fn test_write_list_delete() {
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let dir = directory();
    dir.create(&ctx).unwrap();
    assert!(dir.list_all(&ctx).unwrap().is_empty());

    write(&dir, &ctx, "test1", &[1, 2, 3]);
    assert_eq!(dir.list_all(&ctx).unwrap(), vec!["test1"]);
    assert!(dir.file_exists(&ctx, "test1").unwrap());
    assert_eq!(dir.file_length(&ctx, "test1").unwrap(), 3);
    assert!(dir.file_modified(&ctx, "test1").unwrap() > 0);

    dir.delete_file(&ctx, "test1").unwrap();
    assert!(dir.list_all(&ctx).unwrap().is_empty());
    assert!(!dir.file_exists(&ctx, "test1").unwrap());
}

#[test]
fn test_missing_file() {
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let dir = directory();
    dir.create(&ctx).unwrap();

    assert_eq!(dir.file_length(&ctx, "nothing").unwrap(), 0);
    assert_eq!(dir.file_modified(&ctx, "nothing").unwrap(), 0);
    let err = dir.open_input(&ctx, "nothing").unwrap_err();
    assert!(matches!(err, DirectoryError::FileNotFound(_)));
}

#[test]
fn test_rename() {
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let dir = directory();
    dir.create(&ctx).unwrap();

    write(&dir, &ctx, "test1", b"abc");
    dir.rename_file(&ctx, "test1", "renamed").unwrap();
    assert_eq!(dir.list_all(&ctx).unwrap(), vec!["renamed"]);
    assert_eq!(dir.file_length(&ctx, "renamed").unwrap(), 3);
}

#[test]
fn test_rename_replaces_existing() {
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let dir = directory();
    dir.create(&ctx).unwrap();

    write(&dir, &ctx, "a", b"new content");
    write(&dir, &ctx, "b", b"old");
    dir.rename_file(&ctx, "a", "b").unwrap();
    assert_eq!(dir.list_all(&ctx).unwrap(), vec!["b"]);
    assert_eq!(dir.file_length(&ctx, "b").unwrap(), 11);
}

#[test]
fn test_mark_delete_keeps_reader_alive() {
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let dir = directory();
    dir.create(&ctx).unwrap();

    write(&dir, &ctx, "_0.cfs", &[9; 64]);
    let mut input = dir.open_input(&ctx, "_0.cfs").unwrap();
    dir.delete_file(&ctx, "_0.cfs").unwrap();

    assert!(!dir.file_exists(&ctx, "_0.cfs").unwrap());
    assert_eq!(dir.file_length(&ctx, "_0.cfs").unwrap(), 64);
    let mut buf = [0u8; 64];
    input.read_bytes(&mut buf).unwrap();
    assert_eq!(buf, [9; 64]);
}

#[test]
fn test_actual_delete_patterns() {
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let dir = directory();
    dir.create(&ctx).unwrap();

    write(&dir, &ctx, "_1.del", b"d");
    write(&dir, &ctx, "_1.tmp", b"t");
    write(&dir, &ctx, "segments", b"s");
    for name in ["_1.del", "_1.tmp", "segments"] {
        dir.delete_file(&ctx, name).unwrap();
        assert!(!dir.table().row_exists(&ctx, name).unwrap(), "{name}");
    }
}

#[test]
fn test_custom_pattern_settings() {
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let mut settings = DirectorySettings::default();
    settings.register(
        "frq",
        FileEntrySettings::default().with_handler(HandlerType::ActualDelete),
    );
    let dir = Directory::new("index_files", Arc::new(SqliteDialect), settings).unwrap();
    dir.create(&ctx).unwrap();

    write(&dir, &ctx, "_2.frq", b"f");
    write(&dir, &ctx, "_2.prx", b"p");
    dir.delete_file(&ctx, "_2.frq").unwrap();
    dir.delete_file(&ctx, "_2.prx").unwrap();
    assert!(!dir.table().row_exists(&ctx, "_2.frq").unwrap());
    assert!(dir.table().row_exists(&ctx, "_2.prx").unwrap());
}

#[test]
fn test_rewrite_revives_mark_deleted_file() {
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let dir = directory();
    dir.create(&ctx).unwrap();

    write(&dir, &ctx, "_3.cfs", b"first");
    dir.delete_file(&ctx, "_3.cfs").unwrap();
    write(&dir, &ctx, "_3.cfs", b"second!");
    assert!(dir.file_exists(&ctx, "_3.cfs").unwrap());
    assert_eq!(dir.file_length(&ctx, "_3.cfs").unwrap(), 7);
}

#[test]
fn test_name_too_long_rejected_before_writing() {
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let dir = directory();
    dir.create(&ctx).unwrap();

    let name = "n".repeat(60);
    let err = dir.create_output(&ctx, &name).unwrap_err();
    assert!(matches!(err, DirectoryError::NameTooLong { max: 50, .. }));

    write(&dir, &ctx, "short", b"x");
    let err = dir.rename_file(&ctx, "short", &name).unwrap_err();
    assert!(matches!(err, DirectoryError::NameTooLong { .. }));
    assert!(dir.file_exists(&ctx, "short").unwrap());
}

#[test]
fn test_touch_and_sync() {
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let dir = directory();
    dir.create(&ctx).unwrap();

    write(&dir, &ctx, "a", b"1");
    write(&dir, &ctx, "b", b"2");
    conn.execute("update index_files set lf_ = 1", []).unwrap();
    dir.touch_file(&ctx, "a").unwrap();
    assert!(dir.file_modified(&ctx, "a").unwrap() > 1);
    assert_eq!(dir.file_modified(&ctx, "b").unwrap(), 1);

    dir.sync(&ctx, &["a", "b"]).unwrap();
    assert_eq!(sorted(dir.list_all(&ctx).unwrap()), vec!["a", "b"]);
}

#[test]
fn test_settings_from_toml() {
    let settings = DirectorySettings::from_toml_str(
        r#"
        name_column_length = 20

        [columns]
        name = "file_name"
        value = "file_data"

        [default]
        handler = "actual_delete"
        "#,
    )
    .unwrap();
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let dir = Directory::new("custom", Arc::new(SqliteDialect), settings).unwrap();
    dir.create(&ctx).unwrap();

    write(&dir, &ctx, "_0.cfs", b"abc");
    let stored: Vec<u8> = conn
        .query_row(
            "select file_data from custom where file_name = '_0.cfs'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(stored, b"abc");

    dir.delete_file(&ctx, "_0.cfs").unwrap();
    assert!(!dir.table().row_exists(&ctx, "_0.cfs").unwrap());
    assert!(dir.create_output(&ctx, &"x".repeat(21)).is_err());
}

#[test]
fn test_rename_missing_source_keeps_destination() {
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let dir = directory();
    dir.create(&ctx).unwrap();

    write(&dir, &ctx, "dest", b"keep me");
    let err = dir.rename_file(&ctx, "ghost", "dest").unwrap_err();
    assert!(matches!(err, DirectoryError::FileNotFound(ref name) if name == "ghost"));
    assert!(dir.file_exists(&ctx, "dest").unwrap());
    assert_eq!(dir.file_length(&ctx, "dest").unwrap(), 7);
    assert_eq!(dir.list_all(&ctx).unwrap(), vec!["dest"]);
}

#[test]
fn test_rename_onto_itself_keeps_file() {
    let conn = Connection::open_in_memory().unwrap();
    let ctx = TxContext::new(&conn);
    let dir = directory();
    dir.create(&ctx).unwrap();

    write(&dir, &ctx, "seg", b"data");
    dir.rename_file(&ctx, "seg", "seg").unwrap();
    assert!(dir.file_exists(&ctx, "seg").unwrap());
    assert_eq!(dir.file_length(&ctx, "seg").unwrap(), 4);

    let err = dir.rename_file(&ctx, "none", "none").unwrap_err();
    assert!(matches!(err, DirectoryError::FileNotFound(_)));
}
