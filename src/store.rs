use std::time::Duration;

use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Result};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Sentinel id of the synthetic root. Never persisted; closure queries that
/// bind it simply match no rows, which is what makes top-level inserts and
/// moves fall out of the same SQL as every other case.
pub const ROOT_ID: i64 = -1;

/// Names of the two persisted relations. Always constructed through
/// [`Tables::validated`], so the names are safe to splice into SQL text;
/// every value is still a bound parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    node: String,
    closure: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTableName(pub String);

impl std::fmt::Display for InvalidTableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' is not a valid table name (expected [A-Za-z_][A-Za-z0-9_]*)",
            self.0
        )
    }
}

impl std::error::Error for InvalidTableName {}

impl Tables {
    pub fn validated(node: &str, closure: &str) -> std::result::Result<Self, InvalidTableName> {
        for name in [node, closure] {
            if !is_identifier(name) {
                return Err(InvalidTableName(name.to_string()));
            }
        }
        Ok(Self {
            node: node.to_string(),
            closure: closure.to_string(),
        })
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn closure(&self) -> &str {
        &self.closure
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            node: "node".to_string(),
            closure: "node_path".to_string(),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn open_connection(path: &str, tables: &Tables) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure_connection(&conn)?;
    apply_migrations(&mut conn, tables)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "foreign_keys", "ON")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

struct Migration {
    version: i64,
    name: &'static str,
    sql: String,
}

fn migrations(tables: &Tables) -> Vec<Migration> {
    vec![Migration {
        version: 1,
        name: "baseline_tree_schema_v1",
        sql: format!(
            r#"
CREATE TABLE IF NOT EXISTS {node} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS {closure} (
    ancestor INTEGER NOT NULL,
    descendant INTEGER NOT NULL,
    distance INTEGER NOT NULL,
    PRIMARY KEY (ancestor, descendant)
);

CREATE INDEX IF NOT EXISTS idx_{closure}_descendant
    ON {closure}(descendant);
CREATE INDEX IF NOT EXISTS idx_{closure}_distance
    ON {closure}(distance);
"#,
            node = tables.node,
            closure = tables.closure,
        ),
    }]
}

fn apply_migrations(conn: &mut Connection, tables: &Tables) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    for migration in migrations(tables) {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        if already_applied.is_some() {
            continue;
        }

        tx.execute_batch(&migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_utc_rfc3339()],
        )?;
    }

    tx.commit()
}

fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("RFC3339 formatting for UTC timestamp should never fail")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClosureRow {
    pub ancestor: i64,
    pub descendant: i64,
    pub distance: i64,
}

/// Columns of the node relation that callers may update. Field updates go
/// through this enum so no caller-supplied string ever names a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeField {
    Name,
    Description,
}

impl NodeField {
    fn column(self) -> &'static str {
        match self {
            NodeField::Name => "name",
            NodeField::Description => "description",
        }
    }
}

pub fn list_nodes(conn: &Connection, tables: &Tables) -> Result<Vec<NodeRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, description FROM {} ORDER BY id",
        tables.node
    ))?;
    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(NodeRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
        });
    }
    Ok(result)
}

pub fn list_closure_at_distance(
    conn: &Connection,
    tables: &Tables,
    distance: i64,
) -> Result<Vec<(i64, i64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT ancestor, descendant FROM {} WHERE distance = ?1 ORDER BY ancestor, descendant",
        tables.closure
    ))?;
    let mut rows = stmt.query(params![distance])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push((row.get(0)?, row.get(1)?));
    }
    Ok(result)
}

pub fn list_closure(conn: &Connection, tables: &Tables) -> Result<Vec<ClosureRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT ancestor, descendant, distance FROM {} ORDER BY ancestor, descendant",
        tables.closure
    ))?;
    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(ClosureRow {
            ancestor: row.get(0)?,
            descendant: row.get(1)?,
            distance: row.get(2)?,
        });
    }
    Ok(result)
}

pub fn insert_node(conn: &Connection, tables: &Tables, name: &str) -> Result<i64> {
    conn.execute(
        &format!("INSERT INTO {} (name) VALUES (?1)", tables.node),
        params![name],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Closure rows for a freshly inserted child of `parent_id`: every ancestor
/// row of the parent shifted one level down, plus the self row. When the
/// parent is the synthetic root the SELECT arm matches nothing and only the
/// self row lands.
pub fn insert_closure_for_new_node(
    conn: &Connection,
    tables: &Tables,
    id: i64,
    parent_id: i64,
) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {closure} (ancestor, descendant, distance) \
             SELECT ancestor, ?1, distance + 1 FROM {closure} WHERE descendant = ?2 \
             UNION ALL SELECT ?1, ?1, 0",
            closure = tables.closure
        ),
        params![id, parent_id],
    )?;
    Ok(())
}

pub fn delete_node(conn: &Connection, tables: &Tables, id: i64) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", tables.node),
        params![id],
    )?;
    Ok(())
}

/// Shifts the distance of every path that runs strictly through `id` — rows
/// pairing a proper ancestor of `id` with a proper descendant of `id`. Delete
/// uses delta = -1 to pull the promoted subtree one level up.
pub fn shift_distances_through(
    conn: &Connection,
    tables: &Tables,
    id: i64,
    delta: i64,
) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE {closure} SET distance = distance + ?2 WHERE \
             descendant IN (SELECT descendant FROM {closure} \
                            WHERE ancestor = ?1 AND ancestor != descendant) \
             AND ancestor IN (SELECT ancestor FROM {closure} \
                              WHERE descendant = ?1 AND ancestor != descendant)",
            closure = tables.closure
        ),
        params![id, delta],
    )?;
    Ok(())
}

pub fn delete_closure_refs(conn: &Connection, tables: &Tables, id: i64) -> Result<()> {
    conn.execute(
        &format!(
            "DELETE FROM {} WHERE ancestor = ?1 OR descendant = ?1",
            tables.closure
        ),
        params![id],
    )?;
    Ok(())
}

/// First half of a subtree move: removes every row that pairs a proper
/// ancestor of `id` with a member of `id`'s subtree. Rows internal to the
/// subtree pair two subtree members and survive, because their ancestor side
/// is not a proper ancestor of `id`.
pub fn detach_subtree(conn: &Connection, tables: &Tables, id: i64) -> Result<()> {
    conn.execute(
        &format!(
            "DELETE FROM {closure} WHERE \
             descendant IN (SELECT descendant FROM {closure} WHERE ancestor = ?1) \
             AND ancestor IN (SELECT ancestor FROM {closure} \
                              WHERE descendant = ?1 AND ancestor != descendant)",
            closure = tables.closure
        ),
        params![id],
    )?;
    Ok(())
}

/// Second half of a subtree move: cross-product of the new parent's ancestor
/// set (self included) with the moved subtree, each row's distance the sum of
/// the two leg lengths plus the new edge.
pub fn attach_subtree(
    conn: &Connection,
    tables: &Tables,
    id: i64,
    new_parent_id: i64,
) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {closure} (ancestor, descendant, distance) \
             SELECT p.ancestor, s.descendant, p.distance + s.distance + 1 \
             FROM {closure} p CROSS JOIN {closure} s \
             WHERE p.descendant = ?2 AND s.ancestor = ?1",
            closure = tables.closure
        ),
        params![id, new_parent_id],
    )?;
    Ok(())
}

pub fn update_node_field(
    conn: &Connection,
    tables: &Tables,
    id: i64,
    field: NodeField,
    value: &str,
) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE {} SET {} = ?2 WHERE id = ?1",
            tables.node,
            field.column()
        ),
        params![id, value],
    )?;
    Ok(())
}

/// Ids whose only closure row as ancestor is the self row — the relational
/// definition of a leaf.
pub fn leaf_ids(conn: &Connection, tables: &Tables) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT n.id FROM {node} n \
         INNER JOIN {closure} c ON n.id = c.ancestor \
         GROUP BY n.id HAVING COUNT(c.ancestor) = 1 \
         ORDER BY n.id",
        node = tables.node,
        closure = tables.closure
    ))?;
    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(row.get(0)?);
    }
    Ok(result)
}

#[cfg(test)]
mod tests;
