use std::collections::HashMap;
use std::fmt;

use crate::store::{NodeRecord, ROOT_ID};

/// One node of the in-memory tree. `parent` and `children` hold store ids,
/// not references, so the parent link carries no ownership and the arena can
/// be mutated without aliasing concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub parent: i64,
    pub children: Vec<i64>,
}

/// Ordered multi-way tree over an id-keyed arena. A synthetic root with
/// [`ROOT_ID`] owns every top-level node; it exists only in memory and is
/// never written to the store.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: HashMap<i64, Node>,
}

/// Non-fatal finding produced while reconstructing the tree from persisted
/// rows. The affected row or node is skipped, not the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildIssue {
    UnknownAncestor { ancestor: i64, descendant: i64 },
    UnknownDescendant { ancestor: i64, descendant: i64 },
    DuplicateParent { descendant: i64 },
}

impl fmt::Display for BuildIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildIssue::UnknownAncestor {
                ancestor,
                descendant,
            } => write!(
                f,
                "closure row ({ancestor}, {descendant}) names unknown ancestor {ancestor}; node {descendant} dropped"
            ),
            BuildIssue::UnknownDescendant {
                ancestor,
                descendant,
            } => write!(
                f,
                "closure row ({ancestor}, {descendant}) names unknown descendant {descendant}; row skipped"
            ),
            BuildIssue::DuplicateParent { descendant } => write!(
                f,
                "node {descendant} has more than one distance-1 ancestor; extra row skipped"
            ),
        }
    }
}

impl Tree {
    fn with_root() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_ID,
            Node {
                id: ROOT_ID,
                name: "root".to_string(),
                description: String::new(),
                parent: ROOT_ID,
                children: Vec::new(),
            },
        );
        Self { nodes }
    }

    /// Reconstructs the tree from the node set and the distance-1 closure
    /// rows. Nodes that a malformed row would orphan are dropped with an
    /// issue; nodes no row attaches become children of the synthetic root.
    pub fn build(nodes: Vec<NodeRecord>, links: &[(i64, i64)]) -> (Self, Vec<BuildIssue>) {
        let mut tree = Self::with_root();
        let mut issues = Vec::new();

        for record in nodes {
            tree.nodes.insert(
                record.id,
                Node {
                    id: record.id,
                    name: record.name,
                    description: record.description,
                    parent: ROOT_ID,
                    children: Vec::new(),
                },
            );
        }

        let mut dropped = Vec::new();
        let mut attached = Vec::new();
        for &(ancestor, descendant) in links {
            if !tree.nodes.contains_key(&descendant) || descendant == ROOT_ID {
                issues.push(BuildIssue::UnknownDescendant {
                    ancestor,
                    descendant,
                });
                continue;
            }
            if !tree.nodes.contains_key(&ancestor) || ancestor == ROOT_ID {
                issues.push(BuildIssue::UnknownAncestor {
                    ancestor,
                    descendant,
                });
                dropped.push(descendant);
                continue;
            }
            if attached.contains(&descendant) {
                issues.push(BuildIssue::DuplicateParent { descendant });
                continue;
            }
            tree.nodes
                .get_mut(&ancestor)
                .expect("ancestor presence checked above")
                .children
                .push(descendant);
            tree.nodes
                .get_mut(&descendant)
                .expect("descendant presence checked above")
                .parent = ancestor;
            attached.push(descendant);
        }

        for id in dropped {
            if let Some(node) = tree.nodes.remove(&id) {
                // Children attached under a dropped node fall back to the
                // orphan pass below.
                for child in node.children {
                    attached.retain(|&kept| kept != child);
                    if let Some(child_node) = tree.nodes.get_mut(&child) {
                        child_node.parent = ROOT_ID;
                    }
                }
            }
            attached.retain(|&kept| kept != id);
        }

        let mut orphans: Vec<i64> = tree
            .nodes
            .keys()
            .copied()
            .filter(|&id| id != ROOT_ID && !attached.contains(&id))
            .collect();
        orphans.sort_unstable();
        for id in orphans {
            tree.nodes
                .get_mut(&ROOT_ID)
                .expect("synthetic root always exists")
                .children
                .push(id);
        }

        (tree, issues)
    }

    pub fn get(&self, id: i64) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Real node count, synthetic root excluded.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children_of(&self, id: i64) -> &[i64] {
        self.nodes
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn node_at(&self, parent: i64, row: usize) -> Option<i64> {
        self.children_of(parent).get(row).copied()
    }

    pub fn row_of(&self, id: i64) -> Option<usize> {
        let parent = self.nodes.get(&id)?.parent;
        self.children_of(parent).iter().position(|&child| child == id)
    }

    pub fn parent_of(&self, id: i64) -> Option<i64> {
        if id == ROOT_ID {
            return None;
        }
        self.nodes.get(&id).map(|node| node.parent)
    }

    /// Edge count from the synthetic root down to `id`; top-level nodes have
    /// depth 1.
    pub fn depth(&self, id: i64) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        let mut depth = 0;
        let mut current = id;
        while current != ROOT_ID {
            current = self.nodes.get(&current)?.parent;
            depth += 1;
        }
        Some(depth)
    }

    /// Walks the parent chain of `id` and reports whether `ancestor` appears
    /// on it. A node is not its own ancestor here.
    pub fn is_descendant_of(&self, id: i64, ancestor: i64) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        let mut current = node.parent;
        while current != ROOT_ID {
            if current == ancestor {
                return true;
            }
            match self.nodes.get(&current) {
                Some(node) => current = node.parent,
                None => return false,
            }
        }
        ancestor == ROOT_ID
    }

    /// Ancestor chain of `id` from its parent up to, excluding, the
    /// synthetic root.
    pub fn ancestors_of(&self, id: i64) -> Vec<i64> {
        let mut result = Vec::new();
        let mut current = match self.nodes.get(&id) {
            Some(node) => node.parent,
            None => return result,
        };
        while current != ROOT_ID {
            result.push(current);
            current = match self.nodes.get(&current) {
                Some(node) => node.parent,
                None => break,
            };
        }
        result
    }

    /// Pre-order ids of the whole tree, synthetic root excluded.
    pub fn preorder(&self) -> Vec<i64> {
        self.preorder_from(ROOT_ID)
            .into_iter()
            .filter(|&id| id != ROOT_ID)
            .collect()
    }

    fn preorder_from(&self, id: i64) -> Vec<i64> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            result.push(current);
            for &child in self.children_of(current).iter().rev() {
                stack.push(child);
            }
        }
        result
    }

    pub fn insert(&mut self, parent: i64, position: usize, node: Node) {
        let id = node.id;
        self.nodes.insert(id, node);
        let siblings = &mut self
            .nodes
            .get_mut(&parent)
            .expect("caller validates parent presence")
            .children;
        siblings.insert(position, id);
        self.nodes
            .get_mut(&id)
            .expect("just inserted")
            .parent = parent;
    }

    /// Removes `id` after promoting its children to `id`'s parent, appended
    /// after the existing siblings in their original relative order.
    pub fn remove_promoting_children(&mut self, id: i64) {
        let node = match self.nodes.remove(&id) {
            Some(node) => node,
            None => return,
        };
        let parent = node.parent;
        for &child in &node.children {
            if let Some(child_node) = self.nodes.get_mut(&child) {
                child_node.parent = parent;
            }
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|&child| child != id);
            parent_node.children.extend(node.children.iter().copied());
        }
    }

    /// Detaches `id` from its current parent and splices it under
    /// `new_parent` at `position`. The subtree below `id` rides along
    /// untouched.
    pub fn reparent(&mut self, id: i64, new_parent: i64, position: usize) {
        let old_parent = match self.nodes.get(&id) {
            Some(node) => node.parent,
            None => return,
        };
        if let Some(parent_node) = self.nodes.get_mut(&old_parent) {
            parent_node.children.retain(|&child| child != id);
        }
        let siblings = &mut self
            .nodes
            .get_mut(&new_parent)
            .expect("caller validates parent presence")
            .children;
        let position = position.min(siblings.len());
        siblings.insert(position, id);
        self.nodes
            .get_mut(&id)
            .expect("presence checked above")
            .parent = new_parent;
    }

    pub fn set_name(&mut self, id: i64, name: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.name = name.to_string();
        }
    }

    pub fn set_description(&mut self, id: i64, description: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.description = description.to_string();
        }
    }

    /// Stable-sorts every sibling list by `compare`, recursively over the
    /// whole tree. Purely in-memory; sibling order is not persisted.
    pub fn sort_children_by<F>(&mut self, compare: F)
    where
        F: Fn(&Node, &Node) -> std::cmp::Ordering,
    {
        let parents: Vec<i64> = std::iter::once(ROOT_ID)
            .chain(self.preorder())
            .collect();
        for parent in parents {
            let mut children = self.children_of(parent).to_vec();
            children.sort_by(|&a, &b| {
                let left = self.nodes.get(&a).expect("child ids are arena members");
                let right = self.nodes.get(&b).expect("child ids are arena members");
                compare(left, right)
            });
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.children = children;
            }
        }
    }
}
