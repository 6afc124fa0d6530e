use super::run_verify;
use crate::store::{self, Tables, ROOT_ID};
use crate::tree::Tree;
use rusqlite::{params, Connection};

fn seeded() -> (Connection, Tables) {
    let tables = Tables::default();
    let conn = Connection::open_in_memory().expect("in-memory db should open");
    conn.execute_batch(
        "CREATE TABLE node (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, \
         description TEXT NOT NULL DEFAULT ''); \
         CREATE TABLE node_path (ancestor INTEGER NOT NULL, descendant INTEGER NOT NULL, \
         distance INTEGER NOT NULL, PRIMARY KEY (ancestor, descendant));",
    )
    .expect("schema should apply");
    (conn, tables)
}

fn add_node(conn: &Connection, tables: &Tables, name: &str, parent: i64) -> i64 {
    let id = store::insert_node(conn, tables, name).expect("insert should succeed");
    store::insert_closure_for_new_node(conn, tables, id, parent)
        .expect("closure insert should succeed");
    id
}

fn build_tree(conn: &Connection, tables: &Tables) -> Tree {
    let nodes = store::list_nodes(conn, tables).expect("nodes should list");
    let links = store::list_closure_at_distance(conn, tables, 1).expect("links should list");
    let (tree, issues) = Tree::build(nodes, &links);
    assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    tree
}

#[test]
fn consistent_store_and_tree_pass() {
    let (conn, tables) = seeded();
    let a = add_node(&conn, &tables, "A", ROOT_ID);
    let b = add_node(&conn, &tables, "B", a);
    add_node(&conn, &tables, "C", b);
    add_node(&conn, &tables, "D", ROOT_ID);

    let tree = build_tree(&conn, &tables);
    let report = run_verify(&conn, &tables, &tree).expect("verify should run");
    assert!(report.ok(), "unexpected issues: {:?}", report.issues);
    assert_eq!(report.nodes_checked, 4);
    assert_eq!(report.closure_rows, 7);
}

#[test]
fn missing_ancestor_row_is_reported() {
    let (conn, tables) = seeded();
    let a = add_node(&conn, &tables, "A", ROOT_ID);
    let b = add_node(&conn, &tables, "B", a);
    let tree = build_tree(&conn, &tables);

    conn.execute(
        "DELETE FROM node_path WHERE ancestor = ?1 AND descendant = ?2",
        params![a, b],
    )
    .expect("tamper should succeed");

    let report = run_verify(&conn, &tables, &tree).expect("verify should run");
    assert!(report
        .issues
        .iter()
        .any(|issue| issue.message.contains("missing closure row")));
}

#[test]
fn wrong_distance_is_reported_both_ways() {
    let (conn, tables) = seeded();
    let a = add_node(&conn, &tables, "A", ROOT_ID);
    let b = add_node(&conn, &tables, "B", a);
    let tree = build_tree(&conn, &tables);

    conn.execute(
        "UPDATE node_path SET distance = 5 WHERE ancestor = ?1 AND descendant = ?2",
        params![a, b],
    )
    .expect("tamper should succeed");

    let report = run_verify(&conn, &tables, &tree).expect("verify should run");
    assert!(report
        .issues
        .iter()
        .any(|issue| issue.message.contains("missing closure row")));
    assert!(report
        .issues
        .iter()
        .any(|issue| issue.message.contains("unexpected closure row")));
}

#[test]
fn rows_referencing_unknown_nodes_are_reported() {
    let (conn, tables) = seeded();
    add_node(&conn, &tables, "A", ROOT_ID);
    let tree = build_tree(&conn, &tables);

    conn.execute(
        "INSERT INTO node_path (ancestor, descendant, distance) VALUES (77, 77, 0)",
        [],
    )
    .expect("tamper should succeed");

    let report = run_verify(&conn, &tables, &tree).expect("verify should run");
    assert!(report
        .issues
        .iter()
        .any(|issue| issue.message.contains("references unknown node 77")));
}

#[test]
fn leaf_set_mismatch_is_reported() {
    let (conn, tables) = seeded();
    let a = add_node(&conn, &tables, "A", ROOT_ID);
    let b = add_node(&conn, &tables, "B", a);
    let tree = build_tree(&conn, &tables);

    // Strip B's ancestry so A looks like a leaf relationally while the tree
    // still has B under it.
    conn.execute(
        "DELETE FROM node_path WHERE descendant = ?1 AND ancestor != ?1",
        params![b],
    )
    .expect("tamper should succeed");

    let report = run_verify(&conn, &tables, &tree).expect("verify should run");
    assert!(report
        .issues
        .iter()
        .any(|issue| issue.message.contains("leaf by closure rows")));
}
