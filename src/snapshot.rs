use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use crate::deck_manager::read_deck;
use crate::error::ScanError;
use crate::item_type::infer_item_type;
use crate::metadata::CardState;
use crate::scanner::{scan, DeckEntry, ScanOptions};
use crate::scheduler::{is_due_with_tables, StepTables};

const DEFAULT_SNAPSHOT_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub new: usize,
    pub learning: usize,
    pub review: usize,
    pub relearning: usize,
}

impl StateCounts {
    fn increment(&mut self, state: CardState) {
        match state {
            CardState::New => self.new += 1,
            CardState::Learning => self.learning += 1,
            CardState::Review => self.review += 1,
            CardState::Relearning => self.relearning += 1,
        }
    }
}

// Rejected only on write, by deck_manager::validate_item; a snapshot surfaces
// the mismatch instead of dropping or correcting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    pub item_index: usize,
    pub stored_cards: usize,
    pub content_cards: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SnapshotStatus {
    Ok {
        total_cards: usize,
        due_cards: usize,
        state_counts: StateCounts,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        skipped_items: Vec<SkippedItem>,
    },
    ReadError { message: String },
    ParseError { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeckSnapshot {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub name: String,
    #[serde(flatten)]
    pub status: SnapshotStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkspaceSnapshot {
    pub root_path: PathBuf,
    pub as_of: DateTime<Utc>,
    pub decks: Vec<DeckSnapshot>,
}

#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub include_hidden: bool,
    pub extra_ignore_patterns: Vec<String>,
    pub as_of: Option<DateTime<Utc>>,
    pub concurrency: usize,
    pub learning_step_minutes: Vec<i64>,
    pub relearning_step_minutes: Vec<i64>,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        let tables = StepTables::default();
        SnapshotOptions {
            include_hidden: false,
            extra_ignore_patterns: Vec::new(),
            as_of: None,
            concurrency: DEFAULT_SNAPSHOT_CONCURRENCY,
            learning_step_minutes: tables.learning_minutes.to_vec(),
            relearning_step_minutes: tables.relearning_minutes.to_vec(),
        }
    }
}

fn snapshot_one(entry: &DeckEntry, as_of: DateTime<Utc>, tables: StepTables<'_>) -> SnapshotStatus {
    match read_deck(&entry.absolute_path) {
        Ok(parsed) => {
            let mut total_cards = 0;
            let mut due_cards = 0;
            let mut state_counts = StateCounts::default();
            let mut skipped_items = Vec::new();
            for (item_index, item) in parsed.items.iter().enumerate() {
                for card in &item.cards {
                    total_cards += 1;
                    state_counts.increment(card.state);
                    if is_due_with_tables(card, as_of, tables) {
                        due_cards += 1;
                    }
                }

                let item_type = infer_item_type(&item.content);
                let content_cards = item_type.cards(&item_type.parse(&item.content));
                if content_cards != item.cards.len() {
                    skipped_items.push(SkippedItem { item_index, stored_cards: item.cards.len(), content_cards });
                }
            }
            SnapshotStatus::Ok { total_cards, due_cards, state_counts, skipped_items }
        }
        Err(crate::error::DeckError::DeckParseError { path, message }) => {
            debug!("normalizing parse error for {} into a parse_error snapshot row: {}", path.display(), message);
            SnapshotStatus::ParseError { message }
        }
        Err(e) => {
            warn!("deck {} could not be read during snapshot: {}", entry.absolute_path.display(), e);
            SnapshotStatus::ReadError { message: e.to_string() }
        }
    }
}

pub fn snapshot_workspace(root: &std::path::Path, options: &SnapshotOptions) -> Result<WorkspaceSnapshot, ScanError> {
    let scan_options = ScanOptions {
        include_hidden: options.include_hidden,
        extra_ignore_patterns: options.extra_ignore_patterns.clone(),
    };
    let entries = scan(root, &scan_options)?;
    let as_of = options.as_of.unwrap_or_else(Utc::now);
    let tables =
        StepTables { learning_minutes: &options.learning_step_minutes, relearning_minutes: &options.relearning_step_minutes };

    // Work-stealing over a shared counter: each worker grabs the next
    // unclaimed index until none remain.
    let next_index = AtomicUsize::new(0);
    let results: Mutex<BTreeMap<usize, DeckSnapshot>> = Mutex::new(BTreeMap::new());
    let worker_count = options.concurrency.min(entries.len()).max(1);

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let entries = &entries;
            let results = &results;
            let next_index = &next_index;
            scope.spawn(move || loop {
                let i = next_index.fetch_add(1, Ordering::SeqCst);
                if i >= entries.len() {
                    break;
                }
                let entry = &entries[i];
                let status = snapshot_one(entry, as_of, tables);
                results.lock().unwrap().insert(
                    i,
                    DeckSnapshot {
                        absolute_path: entry.absolute_path.clone(),
                        relative_path: entry.relative_path.clone(),
                        name: entry.name.clone(),
                        status,
                    },
                );
            });
        }
    });

    let decks = results.into_inner().unwrap().into_values().collect();

    Ok(WorkspaceSnapshot { root_path: root.to_path_buf(), as_of, decks })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeckTreeNode {
    Group {
        relative_path: String,
        name: String,
        depth: usize,
        total_cards: usize,
        due_cards: usize,
        state_counts: StateCounts,
        error_count: usize,
        children: Vec<DeckTreeNode>,
    },
    Leaf {
        relative_path: String,
        name: String,
        depth: usize,
        snapshot: DeckSnapshot,
    },
}

impl DeckTreeNode {
    pub fn name(&self) -> &str {
        match self {
            DeckTreeNode::Group { name, .. } => name,
            DeckTreeNode::Leaf { name, .. } => name,
        }
    }
}

struct TreeBuilder {
    groups: BTreeMap<String, TreeBuilder>,
    leaves: Vec<DeckSnapshot>,
}

impl TreeBuilder {
    fn new() -> Self {
        TreeBuilder { groups: BTreeMap::new(), leaves: Vec::new() }
    }

    fn insert(&mut self, segments: &[&str], snapshot: DeckSnapshot) {
        match segments {
            [] => unreachable!("a deck always has at least one path segment"),
            [_] => self.leaves.push(snapshot),
            [head, rest @ ..] => {
                self.groups.entry(head.to_string()).or_insert_with(TreeBuilder::new).insert(rest, snapshot);
            }
        }
    }

    fn build(self, prefix: &str, depth: usize) -> Vec<DeckTreeNode> {
        let mut nodes: Vec<DeckTreeNode> = Vec::new();

        for (name, child) in self.groups {
            let relative_path = if prefix.is_empty() { name.clone() } else { format!("{}/{}", prefix, name) };
            let children = child.build(&relative_path, depth + 1);
            let mut total_cards = 0;
            let mut due_cards = 0;
            let mut state_counts = StateCounts::default();
            let mut error_count = 0;
            for c in &children {
                match c {
                    DeckTreeNode::Group { total_cards: tc, due_cards: dc, state_counts: sc, error_count: ec, .. } => {
                        total_cards += tc;
                        due_cards += dc;
                        error_count += ec;
                        state_counts.new += sc.new;
                        state_counts.learning += sc.learning;
                        state_counts.review += sc.review;
                        state_counts.relearning += sc.relearning;
                    }
                    DeckTreeNode::Leaf { snapshot, .. } => match &snapshot.status {
                        SnapshotStatus::Ok { total_cards: tc, due_cards: dc, state_counts: sc, .. } => {
                            total_cards += tc;
                            due_cards += dc;
                            state_counts.new += sc.new;
                            state_counts.learning += sc.learning;
                            state_counts.review += sc.review;
                            state_counts.relearning += sc.relearning;
                        }
                        SnapshotStatus::ReadError { .. } | SnapshotStatus::ParseError { .. } => {
                            error_count += 1;
                        }
                    },
                }
            }
            nodes.push(DeckTreeNode::Group {
                relative_path,
                name,
                depth,
                total_cards,
                due_cards,
                state_counts,
                error_count,
                children,
            });
        }

        let mut leaves = self.leaves;
        leaves.sort_by(|a, b| a.name.cmp(&b.name));
        for snapshot in leaves {
            nodes.push(DeckTreeNode::Leaf {
                relative_path: snapshot.relative_path.clone(),
                name: snapshot.name.clone(),
                depth,
                snapshot,
            });
        }

        nodes
    }
}

// Groups sort before leaves, both alphabetically.
pub fn build_deck_tree(snapshots: Vec<DeckSnapshot>) -> Vec<DeckTreeNode> {
    let mut builder = TreeBuilder::new();
    for snapshot in snapshots {
        let segments: Vec<&str> = snapshot.relative_path.split('/').collect();
        builder.insert(&segments, snapshot);
    }
    builder.build("", 0)
}

// A collapsed node still appears as a row, but its descendants are skipped.
pub fn flatten_deck_tree(nodes: &[DeckTreeNode], collapsed: &std::collections::HashSet<String>) -> Vec<&DeckTreeNode> {
    let mut rows = Vec::new();
    for node in nodes {
        rows.push(node);
        match node {
            DeckTreeNode::Group { relative_path, children, .. } => {
                if !collapsed.contains(relative_path) {
                    rows.extend(flatten_deck_tree(children, collapsed));
                }
            }
            DeckTreeNode::Leaf { .. } => {}
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn snapshots_a_workspace_with_one_ok_deck() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "<!--@ c1 0 0 0 0-->\nQ1\n").unwrap();

        let snapshot = snapshot_workspace(dir.path(), &SnapshotOptions::default()).unwrap();
        assert_eq!(snapshot.decks.len(), 1);
        match &snapshot.decks[0].status {
            SnapshotStatus::Ok { total_cards, .. } => assert_eq!(*total_cards, 1),
            other => panic!("expected Ok, got {:?}", other),
        }
    }

    #[test]
    fn card_count_mismatch_is_surfaced_as_a_skipped_item_not_an_error() {
        let dir = tempdir().unwrap();
        // Two cards on record but the cloze body only has one span: tolerated on
        // read, flagged rather than rejected.
        fs::write(dir.path().join("a.md"), "<!--@ c1 0 0 0 0-->\n<!--@ c2 0 0 0 0-->\nThe {{c1::a}}.\n").unwrap();

        let snapshot = snapshot_workspace(dir.path(), &SnapshotOptions::default()).unwrap();
        match &snapshot.decks[0].status {
            SnapshotStatus::Ok { total_cards, skipped_items, .. } => {
                assert_eq!(*total_cards, 2);
                assert_eq!(skipped_items.len(), 1);
                assert_eq!(skipped_items[0], SkippedItem { item_index: 0, stored_cards: 2, content_cards: 1 });
            }
            other => panic!("expected Ok, got {:?}", other),
        }
    }

    #[test]
    fn snapshots_are_sorted_by_relative_path() {
        let dir = tempdir().unwrap();
        for name in ["z", "a", "m"] {
            fs::write(dir.path().join(format!("{}.md", name)), "").unwrap();
        }
        let snapshot = snapshot_workspace(dir.path(), &SnapshotOptions::default()).unwrap();
        let names: Vec<&str> = snapshot.decks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "m", "z"]);
    }

    #[test]
    fn parse_errors_are_tagged_parse_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.md"), "<!--@ bad-->\n").unwrap();
        let snapshot = snapshot_workspace(dir.path(), &SnapshotOptions::default()).unwrap();
        assert!(matches!(snapshot.decks[0].status, SnapshotStatus::ParseError { .. }));
    }

    #[test]
    fn builds_tree_with_groups_before_leaves() {
        let snapshots = vec![
            DeckSnapshot {
                absolute_path: "/r/top.md".into(),
                relative_path: "top.md".into(),
                name: "top".into(),
                status: SnapshotStatus::Ok { total_cards: 1, due_cards: 0, state_counts: StateCounts::default(), skipped_items: Vec::new() },
            },
            DeckSnapshot {
                absolute_path: "/r/sub/nested.md".into(),
                relative_path: "sub/nested.md".into(),
                name: "nested".into(),
                status: SnapshotStatus::Ok { total_cards: 2, due_cards: 1, state_counts: StateCounts::default(), skipped_items: Vec::new() },
            },
        ];
        let tree = build_deck_tree(snapshots);
        assert_eq!(tree.len(), 2);
        assert!(matches!(tree[0], DeckTreeNode::Group { .. }));
        assert!(matches!(tree[1], DeckTreeNode::Leaf { .. }));
        if let DeckTreeNode::Group { total_cards, due_cards, .. } = &tree[0] {
            assert_eq!(*total_cards, 2);
            assert_eq!(*due_cards, 1);
        }
    }

    #[test]
    fn flatten_skips_collapsed_group_descendants() {
        let snapshots = vec![DeckSnapshot {
            absolute_path: "/r/sub/nested.md".into(),
            relative_path: "sub/nested.md".into(),
            name: "nested".into(),
            status: SnapshotStatus::Ok { total_cards: 1, due_cards: 0, state_counts: StateCounts::default(), skipped_items: Vec::new() },
        }];
        let tree = build_deck_tree(snapshots);
        let mut collapsed = std::collections::HashSet::new();
        collapsed.insert("sub".to_string());
        let rows = flatten_deck_tree(&tree, &collapsed);
        assert_eq!(rows.len(), 1);
    }
}
