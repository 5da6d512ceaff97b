use std::fs;
use std::path::Path;

use crate::error::DeckError;
use crate::file_codec::{parse_file, serialize_file, Item, ParsedFile};
use crate::item_type::ItemType;
use crate::metadata::Metadata;

pub fn read_deck(path: &Path) -> Result<ParsedFile, DeckError> {
    if !path.exists() {
        return Err(DeckError::DeckNotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)
        .map_err(|e| DeckError::DeckReadError { path: path.to_path_buf(), message: e.to_string() })?;
    parse_file(&text).map_err(|e| DeckError::DeckParseError { path: path.to_path_buf(), message: e.to_string() })
}

fn write_deck(path: &Path, parsed: &ParsedFile) -> Result<(), DeckError> {
    let tmp_path = tmp_path_for(path);
    let text = serialize_file(parsed);
    if let Err(e) = fs::write(&tmp_path, text) {
        let _ = fs::remove_file(&tmp_path);
        return Err(DeckError::DeckWriteError { path: path.to_path_buf(), message: e.to_string() });
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(DeckError::DeckWriteError { path: path.to_path_buf(), message: e.to_string() });
    }
    Ok(())
}

pub fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".tmp");
    os_string.into()
}

// First match wins; duplicate ids across items aren't rejected here, see
// the workspace-wide duplicate auditor.
fn find_card<'a>(items: &'a [Item], card_id: &str) -> Option<(usize, usize)> {
    items.iter().enumerate().find_map(|(item_idx, item)| {
        item.cards.iter().position(|c| c.id == card_id).map(|card_idx| (item_idx, card_idx))
    })
}

pub fn update_card_metadata(path: &Path, card_id: &str, new_meta: Metadata) -> Result<(), DeckError> {
    let mut parsed = read_deck(path)?;
    let (item_idx, card_idx) = find_card(&parsed.items, card_id)
        .ok_or_else(|| DeckError::card_not_found(path, card_id))?;
    parsed.items[item_idx].cards[card_idx] = new_meta;
    write_deck(path, &parsed)
}

fn validate_item(path: &Path, item: &Item, item_type: ItemType) -> Result<(), DeckError> {
    let parsed_body = item_type.parse(&item.content);
    let produced = item_type.cards(&parsed_body);
    if produced != item.cards.len() {
        return Err(DeckError::item_validation(
            path,
            format!("card count mismatch: content produces {} but item has {}", produced, item.cards.len()),
        ));
    }
    Ok(())
}

pub fn replace_item(path: &Path, card_id: &str, new_item: Item, item_type: ItemType) -> Result<(), DeckError> {
    let mut parsed = read_deck(path)?;
    let (item_idx, _) =
        find_card(&parsed.items, card_id).ok_or_else(|| DeckError::card_not_found(path, card_id))?;
    validate_item(path, &new_item, item_type)?;
    parsed.items[item_idx] = new_item;
    write_deck(path, &parsed)
}

pub fn append_item(path: &Path, mut new_item: Item, item_type: ItemType) -> Result<(), DeckError> {
    let mut parsed = read_deck(path)?;
    validate_item(path, &new_item, item_type)?;

    match parsed.items.last_mut() {
        Some(last) if !last.content.ends_with('\n') => last.content.push('\n'),
        Some(_) => {}
        None => {
            if !parsed.preamble.is_empty() && !parsed.preamble.ends_with('\n') {
                parsed.preamble.push('\n');
            }
        }
    }
    if !new_item.content.is_empty() && !new_item.content.ends_with('\n') {
        new_item.content.push('\n');
    }

    parsed.items.push(new_item);
    write_deck(path, &parsed)
}

pub fn remove_item(path: &Path, card_id: &str) -> Result<(), DeckError> {
    let mut parsed = read_deck(path)?;
    let (item_idx, _) =
        find_card(&parsed.items, card_id).ok_or_else(|| DeckError::card_not_found(path, card_id))?;
    parsed.items.remove(item_idx);
    write_deck(path, &parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn deck_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        dir.path().join(name)
    }

    #[test]
    fn update_card_metadata_preserves_other_cards_and_content() {
        let dir = tempdir().unwrap();
        let path = deck_path(&dir, "deck.md");
        fs::write(&path, "<!--@ first 0 0 0 0-->\nQ1\n<!--@ second 0 0 0 0-->\nQ2\n").unwrap();

        let mut meta = Metadata::new_card("first");
        meta.stability = crate::metadata::RawNumber::new(2.5);
        update_card_metadata(&path, "first", meta).unwrap();

        let parsed = read_deck(&path).unwrap();
        assert_eq!(parsed.items[0].cards[0].stability.value(), 2.5);
        assert_eq!(parsed.items[1].cards[0].id, "second");
        assert_eq!(parsed.items[1].content, "Q2\n");
    }

    #[test]
    fn update_card_metadata_reports_card_not_found() {
        let dir = tempdir().unwrap();
        let path = deck_path(&dir, "deck.md");
        fs::write(&path, "<!--@ first 0 0 0 0-->\nQ1\n").unwrap();

        let err = update_card_metadata(&path, "missing", Metadata::new_card("missing")).unwrap_err();
        assert!(matches!(err, DeckError::CardNotFound { .. }));
    }

    #[test]
    fn append_item_adds_newline_after_last_item_without_one() {
        let dir = tempdir().unwrap();
        let path = deck_path(&dir, "deck.md");
        fs::write(&path, "<!--@ first 0 0 0 0-->\nno trailing newline").unwrap();

        let new_item = Item { cards: vec![Metadata::new_card("second")], content: "Q2\n".to_string() };
        append_item(&path, new_item, ItemType::Qa).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("no trailing newline\n<!--@ second"));
    }

    #[test]
    fn append_item_rejects_card_count_mismatch() {
        let dir = tempdir().unwrap();
        let path = deck_path(&dir, "deck.md");
        fs::write(&path, "").unwrap();

        let new_item = Item {
            cards: vec![Metadata::new_card("a"), Metadata::new_card("b")],
            content: "only one qa card here\n".to_string(),
        };
        let err = append_item(&path, new_item, ItemType::Qa).unwrap_err();
        assert!(matches!(err, DeckError::ItemValidationError { .. }));
    }

    #[test]
    fn remove_item_drops_only_the_targeted_item() {
        let dir = tempdir().unwrap();
        let path = deck_path(&dir, "deck.md");
        fs::write(&path, "<!--@ first 0 0 0 0-->\nQ1\n<!--@ second 0 0 0 0-->\nQ2\n").unwrap();

        remove_item(&path, "first").unwrap();
        let parsed = read_deck(&path).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].cards[0].id, "second");
    }

    #[test]
    fn read_deck_reports_deck_not_found() {
        let dir = tempdir().unwrap();
        let path = deck_path(&dir, "missing.md");
        let err = read_deck(&path).unwrap_err();
        assert!(matches!(err, DeckError::DeckNotFound(_)));
    }

    #[test]
    fn write_failure_leaves_original_file_untouched() {
        let dir = tempdir().unwrap();
        let path = deck_path(&dir, "deck.md");
        let original = "<!--@ first 0 0 0 0-->\nQ1\n";
        fs::write(&path, original).unwrap();

        // Make the tmp path itself a directory so the rename step fails.
        fs::create_dir(tmp_path_for(&path)).unwrap();
        let result = update_card_metadata(&path, "first", Metadata::new_card("first"));
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }
}
