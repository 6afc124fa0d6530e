use std::collections::BTreeMap;
use std::io::{self, IsTerminal};

use crate::engine::{MoveSummary, NodeView, TreeRow};
use crate::verify::VerifyReport;

pub fn print_tree(rows: &[TreeRow]) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Tree"));
    if rows.is_empty() {
        println!("{}", palette.dim("empty tree"));
        return;
    }
    for row in rows {
        let indent = indentation_prefix(row.depth, &palette);
        let mut line = format!("{}{} {}", indent, palette.id(&row.id.to_string()), row.name);
        if !row.description.is_empty() {
            line.push(' ');
            line.push_str(&palette.dim(&row.description));
        }
        println!("{line}");
    }
    println!("{}", palette.dim(&format!("{} node(s)", rows.len())));
}

pub fn print_node(node: &NodeView) {
    let palette = Palette::auto();
    println!("{} {}", palette.id(&node.id.to_string()), node.name);
    if !node.description.is_empty() {
        println!("  {}", palette.dim(&node.description));
    }
    match node.parent {
        Some(parent) => println!("  parent={parent} depth={} row={}", node.depth, node.row),
        None => println!("  top-level depth={} row={}", node.depth, node.row),
    }
}

pub fn print_leaf_paths(paths: &BTreeMap<String, i64>) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Leaf paths"));
    if paths.is_empty() {
        println!("{}", palette.dim("no leaves"));
        return;
    }
    let width = paths.keys().map(String::len).max().unwrap_or(0);
    for (path, id) in paths {
        println!("{path:width$}  {}", palette.id(&id.to_string()));
    }
    println!("{}", palette.dim(&format!("{} leaf path(s)", paths.len())));
}

pub fn print_move_summary(summary: &MoveSummary) {
    let palette = Palette::auto();
    for id in &summary.moved {
        println!("moved {}", palette.id(&id.to_string()));
    }
    for skipped in &summary.skipped {
        let reason = serde_json::to_string(&skipped.reason)
            .expect("skip reason serialization should work");
        println!(
            "{}",
            palette.dim(&format!(
                "skipped {} ({})",
                skipped.id,
                reason.trim_matches('"')
            ))
        );
    }
}

pub fn print_verify_report(report: &VerifyReport) {
    println!(
        "check nodes={} closure_rows={} issues={}",
        report.nodes_checked,
        report.closure_rows,
        report.issues.len()
    );
    for issue in &report.issues {
        println!("  - {}: {}", issue.subject, issue.message);
    }
}

fn indentation_prefix(depth: usize, palette: &Palette) -> String {
    if depth <= 1 {
        return String::new();
    }
    let spaces = "  ".repeat(depth.saturating_sub(2));
    palette.dim(&format!("{spaces}↳ "))
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }
}
