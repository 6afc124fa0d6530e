use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use rusqlite::Connection;
use serde::Serialize;

use crate::config::Config;
use crate::paths;
use crate::store::{self, NodeField, Tables, ROOT_ID};
use crate::tree::{BuildIssue, Node, Tree};

type LeafPathListener = Box<dyn Fn(&BTreeMap<String, i64>)>;

/// Owns the in-memory tree and its persisted closure mirror. Every public
/// mutation validates against the tree, writes the store inside one
/// transaction, and only after commit touches the tree — a failed statement
/// leaves both views unchanged.
pub struct Engine {
    conn: Connection,
    tables: Tables,
    separator: char,
    tree: Tree,
    leaf_paths: BTreeMap<String, i64>,
    listeners: Vec<LeafPathListener>,
    build_issues: Vec<BuildIssue>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NodeView {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub parent: Option<i64>,
    pub depth: usize,
    pub row: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TreeRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MoveSummary {
    pub moved: Vec<i64>,
    pub skipped: Vec<SkippedMove>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedMove {
    pub id: i64,
    pub reason: MoveSkipReason,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoveSkipReason {
    UnknownNode,
    SameParent,
    WouldCreateCycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Id,
    Description,
}

impl Engine {
    pub fn open(db_path: &str, config: Config) -> Result<Self, EngineError> {
        ensure_parent_dir(db_path)?;
        let conn = store::open_connection(db_path, &config.tables)?;
        let nodes = store::list_nodes(&conn, &config.tables)?;
        let links = store::list_closure_at_distance(&conn, &config.tables, 1)?;
        let (tree, build_issues) = Tree::build(nodes, &links);
        let leaf_paths = paths::rebuild(&conn, &config.tables, &tree, config.separator)?;
        Ok(Self {
            conn,
            tables: config.tables,
            separator: config.separator,
            tree,
            leaf_paths,
            listeners: Vec::new(),
            build_issues,
        })
    }

    /// Warn-and-continue findings from tree reconstruction, for the caller
    /// to surface.
    pub fn build_issues(&self) -> &[BuildIssue] {
        &self.build_issues
    }

    pub fn insert_node(
        &mut self,
        parent: i64,
        position: usize,
        name: &str,
        description: Option<&str>,
    ) -> Result<NodeView, EngineError> {
        let name = non_empty(name).ok_or(EngineError::EmptyName)?;
        if !self.tree.contains(parent) {
            return Err(EngineError::NotFound(parent));
        }
        let sibling_count = self.tree.children_of(parent).len();
        if position > sibling_count {
            return Err(EngineError::InvalidPosition {
                position,
                len: sibling_count,
            });
        }

        let tx = self.conn.transaction()?;
        let id = store::insert_node(&tx, &self.tables, name)?;
        if let Some(description) = description {
            store::update_node_field(&tx, &self.tables, id, NodeField::Description, description)?;
        }
        store::insert_closure_for_new_node(&tx, &self.tables, id, parent)?;
        tx.commit()?;

        self.tree.insert(
            parent,
            position,
            Node {
                id,
                name: name.to_string(),
                description: description.unwrap_or_default().to_string(),
                parent,
                children: Vec::new(),
            },
        );
        self.refresh_leaf_paths()?;
        self.node_view(id).ok_or(EngineError::NotFound(id))
    }

    /// Deletes `id`, promoting its children to `id`'s former parent. The
    /// promoted subtree's closure distances through the removed node shrink
    /// by one before the node's own rows go away.
    pub fn remove_node(&mut self, id: i64) -> Result<(), EngineError> {
        if id == ROOT_ID {
            return Err(EngineError::SyntheticRoot);
        }
        if !self.tree.contains(id) {
            return Err(EngineError::NotFound(id));
        }

        let tx = self.conn.transaction()?;
        store::delete_node(&tx, &self.tables, id)?;
        store::shift_distances_through(&tx, &self.tables, id, -1)?;
        store::delete_closure_refs(&tx, &self.tables, id)?;
        tx.commit()?;

        self.tree.remove_promoting_children(id);
        self.refresh_leaf_paths()
    }

    /// Reparents each id in `ids` (with its whole subtree) under
    /// `new_parent`, splicing at `position`. Nodes that would be no-ops or
    /// would create a cycle are skipped, never aborting the batch.
    pub fn move_nodes(
        &mut self,
        ids: &[i64],
        new_parent: i64,
        position: usize,
    ) -> Result<MoveSummary, EngineError> {
        if !self.tree.contains(new_parent) {
            return Err(EngineError::NotFound(new_parent));
        }

        let mut summary = MoveSummary {
            moved: Vec::new(),
            skipped: Vec::new(),
        };
        for &id in ids {
            if id == ROOT_ID || !self.tree.contains(id) {
                summary.skipped.push(SkippedMove {
                    id,
                    reason: MoveSkipReason::UnknownNode,
                });
                continue;
            }
            if self.tree.parent_of(id) == Some(new_parent) {
                summary.skipped.push(SkippedMove {
                    id,
                    reason: MoveSkipReason::SameParent,
                });
                continue;
            }
            if new_parent == id || self.tree.is_descendant_of(new_parent, id) {
                summary.skipped.push(SkippedMove {
                    id,
                    reason: MoveSkipReason::WouldCreateCycle,
                });
                continue;
            }

            let tx = self.conn.transaction()?;
            store::detach_subtree(&tx, &self.tables, id)?;
            store::attach_subtree(&tx, &self.tables, id, new_parent)?;
            tx.commit()?;

            let slot = position.saturating_add(summary.moved.len());
            self.tree.reparent(id, new_parent, slot);
            summary.moved.push(id);
        }

        if !summary.moved.is_empty() {
            self.refresh_leaf_paths()?;
        }
        Ok(summary)
    }

    pub fn rename_node(&mut self, id: i64, name: &str) -> Result<NodeView, EngineError> {
        let name = non_empty(name).ok_or(EngineError::EmptyName)?;
        self.require_real_node(id)?;
        store::update_node_field(&self.conn, &self.tables, id, NodeField::Name, name)?;
        self.tree.set_name(id, name);
        // Names participate in leaf paths, so a rename is path-visible even
        // though the structure is unchanged.
        self.refresh_leaf_paths()?;
        self.node_view(id).ok_or(EngineError::NotFound(id))
    }

    pub fn describe_node(&mut self, id: i64, description: &str) -> Result<NodeView, EngineError> {
        self.require_real_node(id)?;
        store::update_node_field(
            &self.conn,
            &self.tables,
            id,
            NodeField::Description,
            description,
        )?;
        self.tree.set_description(id, description);
        self.node_view(id).ok_or(EngineError::NotFound(id))
    }

    /// Stable, recursive sibling sort by the chosen attribute. Presentation
    /// only; nothing is written to the store.
    pub fn sort_children(&mut self, key: SortKey, ascending: bool) {
        self.tree.sort_children_by(|left, right| {
            let ordering = match key {
                SortKey::Name => left.name.cmp(&right.name),
                SortKey::Id => left.id.cmp(&right.id),
                SortKey::Description => left.description.cmp(&right.description),
            };
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }

    pub fn leaf_paths(&self) -> &BTreeMap<String, i64> {
        &self.leaf_paths
    }

    pub fn resolve_node_id(&self, path: &str) -> Option<i64> {
        self.leaf_paths.get(path).copied()
    }

    /// Registers a listener invoked with the freshly rebuilt leaf path map
    /// after every path-visible mutation.
    pub fn on_leaf_paths_changed(&mut self, listener: LeafPathListener) {
        self.listeners.push(listener);
    }

    pub fn node_view(&self, id: i64) -> Option<NodeView> {
        if id == ROOT_ID {
            return None;
        }
        let node = self.tree.get(id)?;
        Some(NodeView {
            id: node.id,
            name: node.name.clone(),
            description: node.description.clone(),
            parent: match node.parent {
                ROOT_ID => None,
                parent => Some(parent),
            },
            depth: self.tree.depth(id)?,
            row: self.tree.row_of(id)?,
        })
    }

    /// Pre-order projection of the whole tree for listing.
    pub fn tree_rows(&self) -> Vec<TreeRow> {
        self.tree
            .preorder()
            .into_iter()
            .filter_map(|id| {
                let node = self.tree.get(id)?;
                Some(TreeRow {
                    id: node.id,
                    name: node.name.clone(),
                    description: node.description.clone(),
                    depth: self.tree.depth(id)?,
                })
            })
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.tree.len()
    }

    /// Number of children under `id`; the synthetic root counts the
    /// top-level nodes.
    pub fn child_count(&self, id: i64) -> Result<usize, EngineError> {
        if !self.tree.contains(id) {
            return Err(EngineError::NotFound(id));
        }
        Ok(self.tree.children_of(id).len())
    }

    /// Audits the store's closure relation against the in-memory tree.
    pub fn audit(&self) -> Result<crate::verify::VerifyReport, EngineError> {
        Ok(crate::verify::run_verify(&self.conn, &self.tables, &self.tree)?)
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn tables(&self) -> &Tables {
        &self.tables
    }

    fn require_real_node(&self, id: i64) -> Result<(), EngineError> {
        if id == ROOT_ID {
            return Err(EngineError::SyntheticRoot);
        }
        if !self.tree.contains(id) {
            return Err(EngineError::NotFound(id));
        }
        Ok(())
    }

    fn refresh_leaf_paths(&mut self) -> Result<(), EngineError> {
        self.leaf_paths = paths::rebuild(&self.conn, &self.tables, &self.tree, self.separator)?;
        for listener in &self.listeners {
            listener(&self.leaf_paths);
        }
        Ok(())
    }
}

pub fn parse_sort_key(raw: &str) -> Result<SortKey, EngineError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "name" => Ok(SortKey::Name),
        "id" => Ok(SortKey::Id),
        "description" | "desc" => Ok(SortKey::Description),
        _ => Err(EngineError::InvalidArgument(format!(
            "unsupported sort key '{}'; use name|id|description",
            raw
        ))),
    }
}

fn ensure_parent_dir(path: &str) -> Result<(), EngineError> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("tables", &self.tables)
            .field("separator", &self.separator)
            .field("nodes", &self.tree.len())
            .field("leaf_paths", &self.leaf_paths.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum EngineError {
    Io(std::io::Error),
    Db(rusqlite::Error),
    Config(crate::config::ConfigError),
    NotFound(i64),
    SyntheticRoot,
    InvalidPosition { position: usize, len: usize },
    EmptyName,
    InvalidArgument(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Io(err) => write!(f, "I/O error: {}", err),
            EngineError::Db(err) => write!(f, "database error: {}", err),
            EngineError::Config(err) => write!(f, "configuration error: {}", err),
            EngineError::NotFound(id) => write!(f, "node {} not found", id),
            EngineError::SyntheticRoot => {
                write!(f, "the synthetic root cannot be the target of this operation")
            }
            EngineError::InvalidPosition { position, len } => write!(
                f,
                "position {} is outside the valid insertion range [0, {}]",
                position, len
            ),
            EngineError::EmptyName => write!(f, "node name cannot be empty"),
            EngineError::InvalidArgument(message) => write!(f, "{}", message),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineError::Io(err) => Some(err),
            EngineError::Db(err) => Some(err),
            EngineError::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(value: std::io::Error) -> Self {
        EngineError::Io(value)
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(value: rusqlite::Error) -> Self {
        EngineError::Db(value)
    }
}

impl From<crate::config::ConfigError> for EngineError {
    fn from(value: crate::config::ConfigError) -> Self {
        EngineError::Config(value)
    }
}
