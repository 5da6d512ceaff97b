use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use crate::deck_manager::read_deck;
use crate::metadata::{CardState, Metadata};
use crate::ordering::OrderingStrategy;
use crate::scheduler::{effective_due_with_tables, StepTables};
use crate::snapshot::DeckTreeNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    New,
    Due,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    pub deck_path: PathBuf,
    pub deck_name: String,
    pub relative_path: String,
    pub item_index: usize,
    pub card: Metadata,
    pub card_index: usize,
    pub file_position: usize,
    pub category: Category,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewQueue {
    pub items: Vec<QueueItem>,
    pub total_new: usize,
    pub total_due: usize,
}

pub struct BuildQueueInput<'a> {
    pub deck_paths: Vec<PathBuf>,
    pub root_path: PathBuf,
    pub now: DateTime<Utc>,
    pub order: &'a OrderingStrategy,
    pub step_tables: StepTables<'a>,
}

impl<'a> BuildQueueInput<'a> {
    pub fn new(deck_paths: Vec<PathBuf>, root_path: PathBuf, now: DateTime<Utc>, order: &'a OrderingStrategy) -> Self {
        BuildQueueInput { deck_paths, root_path, now, order, step_tables: StepTables::default() }
    }
}

fn deck_name(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string()
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .ok()
        .map(|r| r.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect::<Vec<_>>().join("/"))
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

// Unbounded concurrency, soft-skips read failures.
pub fn build_queue(input: BuildQueueInput) -> ReviewQueue {
    let loaded: Mutex<Vec<(usize, crate::file_codec::ParsedFile)>> = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for (idx, path) in input.deck_paths.iter().enumerate() {
            let loaded = &loaded;
            scope.spawn(move || match read_deck(path) {
                Ok(parsed) => loaded.lock().unwrap().push((idx, parsed)),
                Err(e) => warn!("soft-skipping {} while building queue: {}", path.display(), e),
            });
        }
    });

    let mut loaded = loaded.into_inner().unwrap();
    loaded.sort_by_key(|(idx, _)| *idx);

    let mut items = Vec::new();
    let mut file_position = 0usize;

    for (idx, parsed) in loaded {
        let path = &input.deck_paths[idx];
        for (item_index, item) in parsed.items.iter().enumerate() {
            for (card_index, card) in item.cards.iter().enumerate() {
                file_position += 1;
                if card.state == CardState::New {
                    items.push(QueueItem {
                        deck_path: path.clone(),
                        deck_name: deck_name(path),
                        relative_path: relative_path(&input.root_path, path),
                        item_index,
                        card: card.clone(),
                        card_index,
                        file_position,
                        category: Category::New,
                        due_date: None,
                    });
                } else if let Some(due) = effective_due_with_tables(card, input.step_tables) {
                    if due <= input.now {
                        items.push(QueueItem {
                            deck_path: path.clone(),
                            deck_name: deck_name(path),
                            relative_path: relative_path(&input.root_path, path),
                            item_index,
                            card: card.clone(),
                            card_index,
                            file_position,
                            category: Category::Due,
                            due_date: Some(due),
                        });
                    }
                }
            }
        }
    }

    let items = (input.order)(items);
    let total_new = items.iter().filter(|i| i.category == Category::New).count();
    let total_due = items.iter().filter(|i| i.category == Category::Due).count();

    ReviewQueue { items, total_new, total_due }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Folder { path: String },
    Deck { path: String },
}

impl std::str::FromStr for Selection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(Selection::All);
        }
        if let Some(path) = s.strip_prefix("folder:") {
            return Ok(Selection::Folder { path: path.to_string() });
        }
        if let Some(path) = s.strip_prefix("deck:") {
            return Ok(Selection::Deck { path: path.to_string() });
        }
        Err(format!("invalid selection `{}`, expected all|folder:<path>|deck:<path>", s))
    }
}

fn collect_leaves(nodes: &[DeckTreeNode], out: &mut Vec<PathBuf>) {
    for node in nodes {
        match node {
            DeckTreeNode::Group { children, .. } => collect_leaves(children, out),
            DeckTreeNode::Leaf { snapshot, .. } => out.push(snapshot.absolute_path.clone()),
        }
    }
}

fn find_group<'a>(nodes: &'a [DeckTreeNode], path: &str) -> Option<&'a [DeckTreeNode]> {
    for node in nodes {
        if let DeckTreeNode::Group { relative_path, children, .. } = node {
            if relative_path == path {
                return Some(children);
            }
            if let Some(found) = find_group(children, path) {
                return Some(found);
            }
        }
    }
    None
}

fn find_leaf(nodes: &[DeckTreeNode], path: &str) -> Option<PathBuf> {
    for node in nodes {
        match node {
            DeckTreeNode::Leaf { relative_path, snapshot, .. } if relative_path == path => {
                return Some(snapshot.absolute_path.clone());
            }
            DeckTreeNode::Group { children, .. } => {
                if let Some(found) = find_leaf(children, path) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

// Returns the empty list if no match.
pub fn collect_deck_paths_from_selection(selection: &Selection, tree: &[DeckTreeNode]) -> Vec<PathBuf> {
    match selection {
        Selection::All => {
            let mut out = Vec::new();
            collect_leaves(tree, &mut out);
            out
        }
        Selection::Folder { path } => match find_group(tree, path) {
            Some(children) => {
                let mut out = Vec::new();
                collect_leaves(children, &mut out);
                out
            }
            None => Vec::new(),
        },
        Selection::Deck { path } => find_leaf(tree, path).into_iter().collect(),
    }
}
