// <!--@ <id> <stability> <difficulty> <state> <learning_steps> [<last_review> [<due>]]-->

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetadataParseError;

pub const METADATA_PREFIX: &str = "<!--@ ";
pub const METADATA_SUFFIX: &str = "-->";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CardState {
    New = 0,
    Learning = 1,
    Review = 2,
    Relearning = 3,
}

impl CardState {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CardState::New),
            1 => Some(CardState::Learning),
            2 => Some(CardState::Review),
            3 => Some(CardState::Relearning),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for CardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

// Keeps the exact on-disk text a value was parsed from, so touching one card
// doesn't reformat another.
#[derive(Debug, Clone)]
pub struct RawNumber {
    value: f64,
    raw: Option<String>,
}

impl RawNumber {
    pub fn new(value: f64) -> Self {
        RawNumber { value, raw: None }
    }

    fn parsed(value: f64, raw: &str) -> Self {
        RawNumber { value, raw: Some(raw.to_string()) }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn text(&self) -> String {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => format!("{}", self.value),
        }
    }
}

impl From<f64> for RawNumber {
    fn from(value: f64) -> Self {
        RawNumber::new(value)
    }
}

impl PartialEq for RawNumber {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Serialize for RawNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value)
    }
}

#[derive(Debug, Clone)]
pub struct RawLearningSteps {
    value: u32,
    raw: Option<String>,
}

impl RawLearningSteps {
    pub fn new(value: u32) -> Self {
        RawLearningSteps { value, raw: None }
    }

    fn parsed(value: u32, raw: &str) -> Self {
        RawLearningSteps { value, raw: Some(raw.to_string()) }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn text(&self) -> String {
        self.raw.clone().unwrap_or_else(|| format!("{}", self.value))
    }
}

impl From<u32> for RawLearningSteps {
    fn from(value: u32) -> Self {
        RawLearningSteps::new(value)
    }
}

impl PartialEq for RawLearningSteps {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Serialize for RawLearningSteps {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.value)
    }
}

// Parser accepts any ISO-parseable form; serialization always emits
// millisecond-precision RFC 3339, unless the raw on-disk text is kept.
#[derive(Debug, Clone)]
pub struct RawTimestamp {
    value: DateTime<Utc>,
    raw: Option<String>,
}

impl RawTimestamp {
    pub fn new(value: DateTime<Utc>) -> Self {
        RawTimestamp { value, raw: None }
    }

    fn parsed(value: DateTime<Utc>, raw: &str) -> Self {
        RawTimestamp { value, raw: Some(raw.to_string()) }
    }

    pub fn value(&self) -> DateTime<Utc> {
        self.value
    }

    pub fn text(&self) -> String {
        self.raw.clone().unwrap_or_else(|| format_timestamp(&self.value))
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        RawTimestamp::new(value)
    }
}

impl PartialEq for RawTimestamp {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Serialize for RawTimestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Metadata {
    pub id: String,
    pub stability: RawNumber,
    pub difficulty: RawNumber,
    pub state: CardState,
    pub learning_steps: RawLearningSteps,
    pub last_review: Option<RawTimestamp>,
    pub due: Option<RawTimestamp>,
}

impl Metadata {
    pub fn new_card(id: impl Into<String>) -> Self {
        Metadata {
            id: id.into(),
            stability: RawNumber::new(0.0),
            difficulty: RawNumber::new(0.0),
            state: CardState::New,
            learning_steps: RawLearningSteps::new(0),
            last_review: None,
            due: None,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    raw.parse::<DateTime<Utc>>().ok()
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Shape check only, doesn't validate field contents.
pub fn is_metadata_comment_line(line: &str) -> bool {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    trimmed.starts_with(METADATA_PREFIX) && trimmed.ends_with(METADATA_SUFFIX)
        && trimmed.len() >= METADATA_PREFIX.len() + METADATA_SUFFIX.len()
}

pub fn parse_metadata(line: &str, line_no: usize) -> Result<Metadata, MetadataParseError> {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    if !is_metadata_comment_line(trimmed) {
        return Err(MetadataParseError::InvalidMetadataFormat { line: line_no, found: 0 });
    }

    let inner = &trimmed[METADATA_PREFIX.len()..trimmed.len() - METADATA_SUFFIX.len()];
    let fields: Vec<&str> = inner.split(' ').collect();
    if !(5..=7).contains(&fields.len()) {
        return Err(MetadataParseError::InvalidMetadataFormat { line: line_no, found: fields.len() });
    }

    let id = fields[0];
    if id.is_empty() || id.chars().any(char::is_whitespace) || id.contains("-->") {
        return Err(MetadataParseError::InvalidFieldValue {
            line: line_no,
            field: "id",
            value: id.to_string(),
            expected: "non-whitespace identifier without `-->`",
        });
    }

    let stability_raw = fields[1];
    let stability_value: f64 = stability_raw.parse().map_err(|_| MetadataParseError::InvalidFieldValue {
        line: line_no,
        field: "stability",
        value: stability_raw.to_string(),
        expected: "numeric",
    })?;
    if stability_value < 0.0 {
        return Err(MetadataParseError::InvalidFieldValue {
            line: line_no,
            field: "stability",
            value: stability_raw.to_string(),
            expected: "numeric",
        });
    }

    let difficulty_raw = fields[2];
    let difficulty_value: f64 = difficulty_raw.parse().map_err(|_| MetadataParseError::InvalidFieldValue {
        line: line_no,
        field: "difficulty",
        value: difficulty_raw.to_string(),
        expected: "numeric",
    })?;

    let state_raw = fields[3];
    let state_code: u8 = state_raw.parse().map_err(|_| MetadataParseError::InvalidFieldValue {
        line: line_no,
        field: "state",
        value: state_raw.to_string(),
        expected: "state in 0..3",
    })?;
    let state = CardState::from_code(state_code).ok_or_else(|| MetadataParseError::InvalidFieldValue {
        line: line_no,
        field: "state",
        value: state_raw.to_string(),
        expected: "state in 0..3",
    })?;

    let learning_steps_raw = fields[4];
    let learning_steps: u32 = learning_steps_raw.parse().map_err(|_| MetadataParseError::InvalidFieldValue {
        line: line_no,
        field: "learning_steps",
        value: learning_steps_raw.to_string(),
        expected: "non-negative integer",
    })?;

    let last_review = match fields.get(5) {
        Some(raw) => {
            let value = parse_timestamp(raw).ok_or_else(|| MetadataParseError::InvalidFieldValue {
                line: line_no,
                field: "last_review",
                value: raw.to_string(),
                expected: "ISO timestamp",
            })?;
            Some(RawTimestamp::parsed(value, raw))
        }
        None => None,
    };

    let due = match fields.get(6) {
        Some(raw) => {
            let value = parse_timestamp(raw).ok_or_else(|| MetadataParseError::InvalidFieldValue {
                line: line_no,
                field: "due",
                value: raw.to_string(),
                expected: "ISO timestamp",
            })?;
            Some(RawTimestamp::parsed(value, raw))
        }
        None => None,
    };

    Ok(Metadata {
        id: id.to_string(),
        stability: RawNumber::parsed(stability_value, stability_raw),
        difficulty: RawNumber::parsed(difficulty_value, difficulty_raw),
        state,
        learning_steps: RawLearningSteps::parsed(learning_steps, learning_steps_raw),
        last_review,
        due,
    })
}

// No trailing newline.
pub fn serialize_metadata(meta: &Metadata) -> String {
    let mut out = format!(
        "{}{} {} {} {} {}",
        METADATA_PREFIX,
        meta.id,
        meta.stability.text(),
        meta.difficulty.text(),
        meta.state.code(),
        meta.learning_steps.text(),
    );
    if let Some(last_review) = &meta.last_review {
        out.push(' ');
        out.push_str(&last_review.text());
        if let Some(due) = &meta.due {
            out.push(' ');
            out.push_str(&due.text());
        }
    }
    out.push_str(METADATA_SUFFIX);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_minimal_new_card() {
        let meta = Metadata::new_card("abc");
        let line = serialize_metadata(&meta);
        let parsed = parse_metadata(&line, 1).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn round_trips_a_full_review_card() {
        let line = "<!--@ abc 2.5 -1.3 2 0 2025-01-01T12:00:00.000Z 2025-01-08T12:00:00.000Z-->";
        let parsed = parse_metadata(line, 1).unwrap();
        assert_eq!(parsed.id, "abc");
        assert_eq!(parsed.state, CardState::Review);
        assert_eq!(parsed.due.unwrap().value().to_rfc3339_opts(SecondsFormat::Millis, true), "2025-01-08T12:00:00.000Z");
        assert_eq!(serialize_metadata(&parsed), line);
    }

    #[test]
    fn preserves_raw_numeric_text_across_reads() {
        let line = "<!--@ abc 2.500 -1.30 2 0-->";
        let parsed = parse_metadata(line, 1).unwrap();
        assert_eq!(serialize_metadata(&parsed), line);
    }

    #[test]
    fn rejects_wrong_field_count() {
        let err = parse_metadata("<!--@ abc 1 2-->", 1).unwrap_err();
        assert!(matches!(err, MetadataParseError::InvalidMetadataFormat { found: 3, .. }));
    }

    #[test]
    fn rejects_out_of_range_state() {
        let err = parse_metadata("<!--@ abc 1 2 9 0-->", 1).unwrap_err();
        assert!(matches!(err, MetadataParseError::InvalidFieldValue { field: "state", .. }));
    }

    #[test]
    fn rejects_negative_stability() {
        let err = parse_metadata("<!--@ abc -1 2 0 0-->", 1).unwrap_err();
        assert!(matches!(err, MetadataParseError::InvalidFieldValue { field: "stability", .. }));
    }

    #[test]
    fn preserves_non_canonical_timestamp_text_across_reads() {
        // No milliseconds and a numeric offset instead of `Z`: not the canonical form
        // this crate would emit, but still ISO-parseable, so it must round-trip as-is.
        let line = "<!--@ abc 1 2 2 0 2025-01-01T12:00:00+00:00-->";
        let parsed = parse_metadata(line, 1).unwrap();
        assert_eq!(serialize_metadata(&parsed), line);
    }

    #[test]
    fn due_requires_last_review_present() {
        // 6 fields: the trailing timestamp is last_review, not due.
        let line = "<!--@ abc 1 2 2 0 2025-01-01T00:00:00.000Z-->";
        let parsed = parse_metadata(line, 1).unwrap();
        assert!(parsed.last_review.is_some());
        assert!(parsed.due.is_none());
    }
}
