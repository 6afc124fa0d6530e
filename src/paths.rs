use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::store::{self, Tables, ROOT_ID};
use crate::tree::Tree;

/// Separator-joined index of the tree's leaves, keyed by the root-excluded
/// name chain. Leafness is relational (self row is the node's only closure row as
/// ancestor), so the set is recomputed from the store after every structural
/// change rather than patched.
pub fn rebuild(
    conn: &Connection,
    tables: &Tables,
    tree: &Tree,
    separator: char,
) -> rusqlite::Result<BTreeMap<String, i64>> {
    let mut paths = BTreeMap::new();
    for id in store::leaf_ids(conn, tables)? {
        let Some(node) = tree.get(id) else {
            // Store knows a leaf the tree does not: the builder dropped it
            // over an integrity issue. Leave it out of the index.
            continue;
        };
        let mut path = node.name.clone();
        let mut current = node.parent;
        while current != ROOT_ID {
            let Some(ancestor) = tree.get(current) else {
                break;
            };
            path = format!("{}{}{}", ancestor.name, separator, path);
            current = ancestor.parent;
        }
        paths.insert(path, id);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::rebuild;
    use crate::store::{self, Tables};
    use crate::tree::Tree;
    use rusqlite::Connection;

    fn seeded_store() -> (Connection, Tables) {
        let tables = Tables::default();
        let conn = Connection::open_in_memory().expect("in-memory db should open");
        // open_connection applies migrations against a path; replicate the
        // schema directly for the in-memory case.
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

    #[test]
    fn leaf_paths_join_ancestor_names_root_excluded() {
        let (conn, tables) = seeded_store();
        let assets = add_node(&conn, &tables, "Assets", store::ROOT_ID);
        let cash = add_node(&conn, &tables, "Cash", assets);
        let bank = add_node(&conn, &tables, "Bank", assets);
        let _income = add_node(&conn, &tables, "Income", store::ROOT_ID);

        let nodes = store::list_nodes(&conn, &tables).expect("nodes should list");
        let links =
            store::list_closure_at_distance(&conn, &tables, 1).expect("links should list");
        let (tree, issues) = Tree::build(nodes, &links);
        assert!(issues.is_empty());

        let paths = rebuild(&conn, &tables, &tree, '-').expect("rebuild should succeed");
        assert_eq!(paths.get("Assets-Cash"), Some(&cash));
        assert_eq!(paths.get("Assets-Bank"), Some(&bank));
        assert!(paths.contains_key("Income"));
        // Interior nodes never appear.
        assert!(!paths.keys().any(|path| path == "Assets"));
    }

    #[test]
    fn custom_separator_is_honored() {
        let (conn, tables) = seeded_store();
        let a = add_node(&conn, &tables, "A", store::ROOT_ID);
        let b = add_node(&conn, &tables, "B", a);

        let nodes = store::list_nodes(&conn, &tables).expect("nodes should list");
        let links =
            store::list_closure_at_distance(&conn, &tables, 1).expect("links should list");
        let (tree, _) = Tree::build(nodes, &links);

        let paths = rebuild(&conn, &tables, &tree, '/').expect("rebuild should succeed");
        assert_eq!(paths.get("A/B"), Some(&b));
    }
}
