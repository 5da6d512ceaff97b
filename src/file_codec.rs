use serde::Serialize;

use crate::error::DeckParseError;
use crate::metadata::{is_metadata_comment_line, parse_metadata, serialize_metadata, Metadata};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub cards: Vec<Metadata>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedFile {
    pub preamble: String,
    pub items: Vec<Item>,
}

// Keeps each line's own terminator so serialize_file can reassemble the file
// byte-for-byte from unmodified items.
fn split_keepends(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            lines.push(&text[start..=i]);
            start = i + 1;
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

// Line and column are 1-based; column is always 1 since a metadata comment
// occupies a whole line.
pub fn parse_file(text: &str) -> Result<ParsedFile, DeckParseError> {
    let lines = split_keepends(text);

    let preamble_line_count = lines.iter().take_while(|l| !is_metadata_comment_line(l)).count();
    let preamble: String = lines[..preamble_line_count].concat();
    let remaining = &lines[preamble_line_count..];

    let mut items = Vec::new();
    let mut i = 0;
    let mut line_no = preamble_line_count + 1;

    while i < remaining.len() {
        if !is_metadata_comment_line(remaining[i]) {
            return Err(DeckParseError::ParseError {
                line: line_no,
                column: 1,
                message: "expected a metadata comment line".to_string(),
            });
        }

        let mut cards = Vec::new();
        while i < remaining.len() && is_metadata_comment_line(remaining[i]) {
            let card = parse_metadata(remaining[i], line_no)?;
            cards.push(card);
            line_no += 1;
            i += 1;
        }

        let content_start = i;
        while i < remaining.len() && !is_metadata_comment_line(remaining[i]) {
            line_no += 1;
            i += 1;
        }
        let content: String = remaining[content_start..i].concat();

        items.push(Item { cards, content });
    }

    Ok(ParsedFile { preamble, items })
}

pub fn serialize_file(parsed: &ParsedFile) -> String {
    let mut out = String::with_capacity(parsed.preamble.len() + 64);
    out.push_str(&parsed.preamble);
    for item in &parsed.items {
        for card in &item.cards {
            out.push_str(&serialize_metadata(card));
            out.push('\n');
        }
        out.push_str(&item.content);
    }
    out
}
