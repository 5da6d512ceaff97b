use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataParseError {
    #[error("line {line}: expected 5 to 7 fields in metadata comment, found {found}")]
    InvalidMetadataFormat { line: usize, found: usize },

    #[error("line {line}: invalid value for field `{field}`: `{value}` (expected {expected})")]
    InvalidFieldValue { line: usize, field: &'static str, value: String, expected: &'static str },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeckParseError {
    #[error("{line}:{column}: {message}")]
    ParseError { line: usize, column: usize, message: String },

    #[error(transparent)]
    Metadata(#[from] MetadataParseError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("workspace root does not exist: {0}")]
    WorkspaceRootNotFound(PathBuf),

    #[error("workspace root is not a directory: {0}")]
    WorkspaceRootNotDirectory(PathBuf),

    #[error("workspace root unreadable during {operation} on {path}: {message}")]
    WorkspaceRootUnreadable { operation: &'static str, path: PathBuf, message: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeckError {
    #[error("deck not found: {0}")]
    DeckNotFound(PathBuf),

    #[error("failed to read deck {path}: {message}")]
    DeckReadError { path: PathBuf, message: String },

    #[error("failed to parse deck {path}: {message}")]
    DeckParseError { path: PathBuf, message: String },

    #[error("failed to write deck {path}: {message}")]
    DeckWriteError { path: PathBuf, message: String },

    #[error("card `{card_id}` not found in deck {deck_path}")]
    CardNotFound { deck_path: PathBuf, card_id: String },

    #[error("item validation failed for deck {deck_path}: {message}")]
    ItemValidationError { deck_path: PathBuf, message: String },
}

impl DeckError {
    pub fn card_not_found(deck_path: impl Into<PathBuf>, card_id: impl Into<String>) -> Self {
        DeckError::CardNotFound { deck_path: deck_path.into(), card_id: card_id.into() }
    }

    pub fn item_validation(deck_path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        DeckError::ItemValidationError { deck_path: deck_path.into(), message: message.into() }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to schedule card `{card_id}`: {message}")]
pub struct ScheduleError {
    pub card_id: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum RepoSpaceError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Deck(#[from] DeckError),

    #[error(transparent)]
    DeckParse(#[from] DeckParseError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
