use std::collections::{BTreeMap, BTreeSet};

use rusqlite::Connection;
use serde::Serialize;

use crate::store::{self, Tables, ROOT_ID};
use crate::tree::Tree;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VerifyIssue {
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VerifyReport {
    pub nodes_checked: u64,
    pub closure_rows: u64,
    pub issues: Vec<VerifyIssue>,
}

impl VerifyReport {
    pub fn ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Audits the persisted closure relation against the in-memory tree: every
/// node must carry exactly its ancestor chain (self row at distance 0, k-th
/// ancestor at distance k) and nothing else, no row may reference an unknown
/// id, and the relational leaf set must match the structural one.
pub fn run_verify(
    conn: &Connection,
    tables: &Tables,
    tree: &Tree,
) -> rusqlite::Result<VerifyReport> {
    let mut issues = Vec::new();

    let rows = store::list_closure(conn, tables)?;
    let node_records = store::list_nodes(conn, tables)?;
    let known_ids: BTreeSet<i64> = node_records.iter().map(|record| record.id).collect();

    let mut rows_by_descendant: BTreeMap<i64, Vec<(i64, i64)>> = BTreeMap::new();
    for row in &rows {
        for id in [row.ancestor, row.descendant] {
            if !known_ids.contains(&id) {
                issues.push(issue(
                    "closure",
                    &format!(
                        "row ({}, {}, {}) references unknown node {}",
                        row.ancestor, row.descendant, row.distance, id
                    ),
                ));
            }
        }
        rows_by_descendant
            .entry(row.descendant)
            .or_default()
            .push((row.ancestor, row.distance));
    }

    for record in &node_records {
        let id = record.id;
        if !tree.contains(id) {
            issues.push(issue(
                &id.to_string(),
                "node exists in the store but not in the tree",
            ));
            continue;
        }

        // Expected rows: the self row plus one row per ancestor, distance
        // equal to the ancestor's position on the upward path.
        let mut expected: BTreeSet<(i64, i64)> = BTreeSet::new();
        expected.insert((id, 0));
        for (offset, ancestor) in tree.ancestors_of(id).into_iter().enumerate() {
            expected.insert((ancestor, offset as i64 + 1));
        }

        let actual: BTreeSet<(i64, i64)> = rows_by_descendant
            .get(&id)
            .map(|rows| rows.iter().copied().collect())
            .unwrap_or_default();

        for &(ancestor, distance) in expected.difference(&actual) {
            issues.push(issue(
                &id.to_string(),
                &format!("missing closure row ({}, {}, {})", ancestor, id, distance),
            ));
        }
        for &(ancestor, distance) in actual.difference(&expected) {
            issues.push(issue(
                &id.to_string(),
                &format!("unexpected closure row ({}, {}, {})", ancestor, id, distance),
            ));
        }
    }

    for id in tree.preorder() {
        if !known_ids.contains(&id) {
            issues.push(issue(
                &id.to_string(),
                "node exists in the tree but not in the store",
            ));
        }
    }

    let relational_leaves: BTreeSet<i64> = store::leaf_ids(conn, tables)?.into_iter().collect();
    let structural_leaves: BTreeSet<i64> = tree
        .preorder()
        .into_iter()
        .filter(|&id| id != ROOT_ID && tree.children_of(id).is_empty())
        .collect();
    for &id in relational_leaves.difference(&structural_leaves) {
        issues.push(issue(
            &id.to_string(),
            "leaf by closure rows but has children in the tree",
        ));
    }
    for &id in structural_leaves.difference(&relational_leaves) {
        issues.push(issue(
            &id.to_string(),
            "leaf in the tree but has descendants in the closure relation",
        ));
    }

    Ok(VerifyReport {
        nodes_checked: node_records.len() as u64,
        closure_rows: rows.len() as u64,
        issues,
    })
}

fn issue(subject: &str, message: &str) -> VerifyIssue {
    VerifyIssue {
        subject: subject.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests;
