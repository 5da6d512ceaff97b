use std::collections::BTreeMap;
use std::path::PathBuf;

use log::warn;
use serde::Serialize;

use crate::deck_manager::read_deck;
use crate::error::ScanError;
use crate::scanner::{scan, ScanOptions};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardLocation {
    pub deck_path: PathBuf,
    pub relative_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateCardId {
    pub card_id: String,
    pub locations: Vec<CardLocation>,
}

pub fn find_duplicate_card_ids(
    root: &std::path::Path,
    scan_options: &ScanOptions,
) -> Result<Vec<DuplicateCardId>, ScanError> {
    let entries = scan(root, scan_options)?;

    let mut locations_by_id: BTreeMap<String, Vec<CardLocation>> = BTreeMap::new();
    for entry in &entries {
        let parsed = match read_deck(&entry.absolute_path) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("skipping {} during duplicate-id audit: {}", entry.absolute_path.display(), e);
                continue;
            }
        };
        for item in &parsed.items {
            for card in &item.cards {
                locations_by_id.entry(card.id.clone()).or_default().push(CardLocation {
                    deck_path: entry.absolute_path.clone(),
                    relative_path: entry.relative_path.clone(),
                });
            }
        }
    }

    Ok(locations_by_id
        .into_iter()
        .filter(|(_, locations)| locations.len() > 1)
        .map(|(card_id, locations)| DuplicateCardId { card_id, locations })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_cross_deck_duplicates() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "<!--@ shared 0 0 0 0-->\nQ1\n").unwrap();
        fs::write(dir.path().join("b.md"), "<!--@ shared 0 0 0 0-->\nQ2\n").unwrap();
        fs::write(dir.path().join("c.md"), "<!--@ unique 0 0 0 0-->\nQ3\n").unwrap();

        let dupes = find_duplicate_card_ids(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes[0].card_id, "shared");
        assert_eq!(dupes[0].locations.len(), 2);
    }

    #[test]
    fn finds_within_deck_duplicates() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "<!--@ dup 0 0 0 0-->\nQ1\n<!--@ dup 0 0 0 0-->\nQ2\n").unwrap();

        let dupes = find_duplicate_card_ids(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes[0].locations.len(), 2);
    }

    #[test]
    fn reports_nothing_when_all_ids_are_unique() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "<!--@ one 0 0 0 0-->\nQ1\n").unwrap();

        let dupes = find_duplicate_card_ids(dir.path(), &ScanOptions::default()).unwrap();
        assert!(dupes.is_empty());
    }
}
