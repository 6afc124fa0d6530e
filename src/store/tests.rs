use super::{open_connection, ClosureRow, NodeField, Tables, ROOT_ID};
use rusqlite::params;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_db_path() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX_EPOCH")
        .as_nanos();
    std::env::temp_dir()
        .join(format!("arbor-store-{}.sqlite", nanos))
        .display()
        .to_string()
}

fn cleanup_db_files(path: &str) {
    for suffix in ["", "-wal", "-shm"] {
        let candidate = format!("{path}{suffix}");
        let _ = std::fs::remove_file(candidate);
    }
}

fn table_exists(conn: &rusqlite::Connection, table_name: &str) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
            params![table_name],
            |row| row.get(0),
        )
        .expect("table existence query should be readable");
    exists == 1
}

fn add_node(conn: &rusqlite::Connection, tables: &Tables, name: &str, parent: i64) -> i64 {
    let id = super::insert_node(conn, tables, name).expect("node insert should succeed");
    super::insert_closure_for_new_node(conn, tables, id, parent)
        .expect("closure insert should succeed");
    id
}

fn rows(conn: &rusqlite::Connection, tables: &Tables) -> Vec<ClosureRow> {
    super::list_closure(conn, tables).expect("closure rows should list")
}

#[test]
fn configures_connection_pragmas() {
    let path = unique_db_path();
    let conn = open_connection(&path, &Tables::default()).expect("connection should open");

    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .expect("journal_mode pragma should be readable");
    assert_eq!(journal_mode.to_uppercase(), "WAL");

    let synchronous: i64 = conn
        .query_row("PRAGMA synchronous;", [], |row| row.get(0))
        .expect("synchronous pragma should be readable");
    assert_eq!(synchronous, 1);

    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .expect("foreign_keys pragma should be readable");
    assert_eq!(foreign_keys, 1);

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn migrations_create_schema_and_are_idempotent() {
    let path = unique_db_path();
    let tables = Tables::default();
    let conn = open_connection(&path, &tables).expect("connection should open");
    assert!(table_exists(&conn, "node"));
    assert!(table_exists(&conn, "node_path"));
    assert!(table_exists(&conn, "schema_migrations"));
    drop(conn);

    // Reopening must not re-run the baseline migration.
    let conn = open_connection(&path, &tables).expect("reopen should succeed");
    let applied: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .expect("migration count should be readable");
    assert_eq!(applied, 1);

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn custom_table_names_are_honored() {
    let path = unique_db_path();
    let tables =
        Tables::validated("account", "account_path").expect("identifiers should validate");
    let conn = open_connection(&path, &tables).expect("connection should open");
    assert!(table_exists(&conn, "account"));
    assert!(table_exists(&conn, "account_path"));

    let id = add_node(&conn, &tables, "Assets", ROOT_ID);
    assert_eq!(
        rows(&conn, &tables),
        vec![ClosureRow {
            ancestor: id,
            descendant: id,
            distance: 0
        }]
    );

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn validated_rejects_non_identifier_names() {
    assert!(Tables::validated("node; DROP TABLE x", "node_path").is_err());
    assert!(Tables::validated("node", "").is_err());
    assert!(Tables::validated("1node", "node_path").is_err());
    assert!(Tables::validated("_node", "node_path").is_ok());
}

#[test]
fn insert_copies_parent_ancestry_plus_self_row() {
    let path = unique_db_path();
    let tables = Tables::default();
    let conn = open_connection(&path, &tables).expect("connection should open");

    let a = add_node(&conn, &tables, "A", ROOT_ID);
    let b = add_node(&conn, &tables, "B", a);

    let mut expected = vec![
        ClosureRow {
            ancestor: a,
            descendant: a,
            distance: 0,
        },
        ClosureRow {
            ancestor: a,
            descendant: b,
            distance: 1,
        },
        ClosureRow {
            ancestor: b,
            descendant: b,
            distance: 0,
        },
    ];
    expected.sort();
    assert_eq!(rows(&conn, &tables), expected);

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn delete_sequence_promotes_grandchildren_one_level() {
    let path = unique_db_path();
    let tables = Tables::default();
    let conn = open_connection(&path, &tables).expect("connection should open");

    let a = add_node(&conn, &tables, "A", ROOT_ID);
    let b = add_node(&conn, &tables, "B", a);
    let c = add_node(&conn, &tables, "C", b);

    // Delete B: node row, shrink paths through it, then drop its rows.
    super::delete_node(&conn, &tables, b).expect("node delete should succeed");
    super::shift_distances_through(&conn, &tables, b, -1).expect("shift should succeed");
    super::delete_closure_refs(&conn, &tables, b).expect("ref delete should succeed");

    let mut expected = vec![
        ClosureRow {
            ancestor: a,
            descendant: a,
            distance: 0,
        },
        ClosureRow {
            ancestor: a,
            descendant: c,
            distance: 1,
        },
        ClosureRow {
            ancestor: c,
            descendant: c,
            distance: 0,
        },
    ];
    expected.sort();
    assert_eq!(rows(&conn, &tables), expected);

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn detach_then_attach_moves_a_subtree() {
    let path = unique_db_path();
    let tables = Tables::default();
    let conn = open_connection(&path, &tables).expect("connection should open");

    let p1 = add_node(&conn, &tables, "P1", ROOT_ID);
    let p2 = add_node(&conn, &tables, "P2", ROOT_ID);
    let x = add_node(&conn, &tables, "X", p1);
    let y = add_node(&conn, &tables, "Y", x);

    super::detach_subtree(&conn, &tables, x).expect("detach should succeed");
    super::attach_subtree(&conn, &tables, x, p2).expect("attach should succeed");

    let all = rows(&conn, &tables);
    // Old parent linkage is gone.
    assert!(!all
        .iter()
        .any(|row| row.ancestor == p1 && row.descendant != p1));
    // New linkage with recomputed distances.
    assert!(all.contains(&ClosureRow {
        ancestor: p2,
        descendant: x,
        distance: 1
    }));
    assert!(all.contains(&ClosureRow {
        ancestor: p2,
        descendant: y,
        distance: 2
    }));
    // The subtree-internal row is untouched.
    assert!(all.contains(&ClosureRow {
        ancestor: x,
        descendant: y,
        distance: 1
    }));

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn detach_to_top_level_keeps_internal_rows_only() {
    let path = unique_db_path();
    let tables = Tables::default();
    let conn = open_connection(&path, &tables).expect("connection should open");

    let p = add_node(&conn, &tables, "P", ROOT_ID);
    let x = add_node(&conn, &tables, "X", p);
    let y = add_node(&conn, &tables, "Y", x);

    super::detach_subtree(&conn, &tables, x).expect("detach should succeed");
    // Attaching under the synthetic root matches no parent rows: the subtree
    // becomes top-level with only its internal rows.
    super::attach_subtree(&conn, &tables, x, ROOT_ID).expect("attach should succeed");

    let all = rows(&conn, &tables);
    assert!(all.contains(&ClosureRow {
        ancestor: x,
        descendant: y,
        distance: 1
    }));
    assert!(!all
        .iter()
        .any(|row| row.ancestor == p && row.descendant != p));

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn update_node_field_writes_whitelisted_columns() {
    let path = unique_db_path();
    let tables = Tables::default();
    let conn = open_connection(&path, &tables).expect("connection should open");

    let id = add_node(&conn, &tables, "Old", ROOT_ID);
    super::update_node_field(&conn, &tables, id, NodeField::Name, "New")
        .expect("name update should succeed");
    super::update_node_field(&conn, &tables, id, NodeField::Description, "text")
        .expect("description update should succeed");

    let record = super::list_nodes(&conn, &tables)
        .expect("nodes should list")
        .into_iter()
        .find(|record| record.id == id)
        .expect("node should exist");
    assert_eq!(record.name, "New");
    assert_eq!(record.description, "text");

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn leaf_ids_are_nodes_with_only_a_self_row() {
    let path = unique_db_path();
    let tables = Tables::default();
    let conn = open_connection(&path, &tables).expect("connection should open");

    let a = add_node(&conn, &tables, "A", ROOT_ID);
    let b = add_node(&conn, &tables, "B", a);
    let c = add_node(&conn, &tables, "C", a);
    let d = add_node(&conn, &tables, "D", c);

    assert_eq!(
        super::leaf_ids(&conn, &tables).expect("leaf query should succeed"),
        vec![b, d]
    );

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn list_closure_at_distance_returns_parent_edges() {
    let path = unique_db_path();
    let tables = Tables::default();
    let conn = open_connection(&path, &tables).expect("connection should open");

    let a = add_node(&conn, &tables, "A", ROOT_ID);
    let b = add_node(&conn, &tables, "B", a);
    let c = add_node(&conn, &tables, "C", b);

    assert_eq!(
        super::list_closure_at_distance(&conn, &tables, 1).expect("query should succeed"),
        vec![(a, b), (b, c)]
    );

    drop(conn);
    cleanup_db_files(&path);
}
