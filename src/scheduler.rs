use chrono::{DateTime, Utc};
use rs_fsrs::{Card as FsrsCard, Parameters, Rating, FSRS};
use serde::Serialize;

// rs_fsrs::FSRS::repeat(card, now) returns scheduling outcomes for all four ratings at
// once (mirroring ts-fsrs's `repeat`); we pick the caller's rating out of that map
// rather than asking FSRS to schedule a single rating directly.

use crate::error::ScheduleError;
use crate::metadata::{CardState, Metadata, RawLearningSteps, RawNumber, RawTimestamp};

// Used only when `due` is absent and must be reconstructed from `last_review`.
const DEFAULT_LEARNING_STEP_MINUTES: &[i64] = &[1, 10];
const DEFAULT_RELEARNING_STEP_MINUTES: &[i64] = &[10];

#[derive(Debug, Clone, Copy)]
pub struct StepTables<'a> {
    pub learning_minutes: &'a [i64],
    pub relearning_minutes: &'a [i64],
}

impl<'a> Default for StepTables<'a> {
    fn default() -> Self {
        StepTables { learning_minutes: DEFAULT_LEARNING_STEP_MINUTES, relearning_minutes: DEFAULT_RELEARNING_STEP_MINUTES }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Again = 0,
    Hard = 1,
    Good = 2,
    Easy = 3,
}

impl Grade {
    fn to_fsrs_rating(self) -> Rating {
        match self {
            Grade::Again => Rating::Again,
            Grade::Hard => Rating::Hard,
            Grade::Good => Rating::Good,
            Grade::Easy => Rating::Easy,
        }
    }
}

impl std::str::FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "again" => Ok(Grade::Again),
            "hard" => Ok(Grade::Hard),
            "good" => Ok(Grade::Good),
            "easy" => Ok(Grade::Easy),
            other => Err(format!("unknown grade `{}`, expected again|hard|good|easy", other)),
        }
    }
}

// Restoring a card is: write previous_card back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerLog {
    pub rating: Grade,
    pub previous_state: CardState,
    pub previous_card: Metadata,
    pub due: DateTime<Utc>,
    pub stability: f64,
    pub difficulty: f64,
    pub scheduled_days: i64,
    pub learning_steps: u32,
    pub review: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeResult {
    pub updated_card: Metadata,
    pub scheduler_log: SchedulerLog,
}

// New cards are never due, they're categorized separately by callers.
pub fn is_due(meta: &Metadata, now: DateTime<Utc>) -> bool {
    is_due_with_tables(meta, now, StepTables::default())
}

pub fn is_due_with_tables(meta: &Metadata, now: DateTime<Utc>, tables: StepTables<'_>) -> bool {
    if meta.state == CardState::New {
        return false;
    }
    match effective_due_with_tables(meta, tables) {
        Some(due) => due <= now,
        None => false,
    }
}

pub fn effective_due(meta: &Metadata) -> Option<DateTime<Utc>> {
    effective_due_with_tables(meta, StepTables::default())
}

pub fn effective_due_with_tables(meta: &Metadata, tables: StepTables<'_>) -> Option<DateTime<Utc>> {
    if let Some(due) = &meta.due {
        return Some(due.value());
    }
    let last_review = meta.last_review.as_ref()?.value();
    match meta.state {
        CardState::New => None,
        CardState::Review => {
            let days = meta.stability.value();
            Some(last_review + chrono::Duration::seconds((days * 86_400.0) as i64))
        }
        CardState::Learning => {
            let minutes = step_minutes(tables.learning_minutes, meta.learning_steps.value());
            Some(last_review + chrono::Duration::minutes(minutes))
        }
        CardState::Relearning => {
            let minutes = step_minutes(tables.relearning_minutes, meta.learning_steps.value());
            Some(last_review + chrono::Duration::minutes(minutes))
        }
    }
}

fn step_minutes(table: &[i64], index: u32) -> i64 {
    table.get(index as usize).copied().unwrap_or(table[0])
}

fn to_fsrs_state(state: CardState) -> rs_fsrs::State {
    match state {
        CardState::New => rs_fsrs::State::New,
        CardState::Learning => rs_fsrs::State::Learning,
        CardState::Review => rs_fsrs::State::Review,
        CardState::Relearning => rs_fsrs::State::Relearning,
    }
}

fn from_fsrs_state(state: rs_fsrs::State) -> CardState {
    match state {
        rs_fsrs::State::New => CardState::New,
        rs_fsrs::State::Learning => CardState::Learning,
        rs_fsrs::State::Review => CardState::Review,
        rs_fsrs::State::Relearning => CardState::Relearning,
    }
}

fn lift_to_fsrs_card(meta: &Metadata, now: DateTime<Utc>) -> FsrsCard {
    if meta.state == CardState::New {
        let mut card = FsrsCard::default();
        card.due = now;
        return card;
    }

    let last_review = meta.last_review.as_ref().map(|t| t.value()).unwrap_or(now);
    let elapsed_days = ((now - last_review).num_seconds() as f64 / 86_400.0).max(0.0) as i64;
    let scheduled_days = if meta.state == CardState::Review { meta.stability.value() as i64 } else { 0 };

    FsrsCard {
        due: meta.due.as_ref().map(|t| t.value()).unwrap_or(now),
        stability: meta.stability.value(),
        difficulty: meta.difficulty.value(),
        elapsed_days,
        scheduled_days,
        reps: 0,
        lapses: 0,
        state: to_fsrs_state(meta.state),
        last_review,
    }
}

// FSRS has no notion of this field; it only indexes the step tables above.
// Entering Learning/Relearning fresh resets to 0, a non-Again grade while
// already there increments it, reaching Review resets it to 0.
fn next_learning_steps(previous: &Metadata, grade: Grade, new_state: CardState) -> u32 {
    match new_state {
        CardState::Review => 0,
        CardState::Learning | CardState::Relearning => {
            let was_already_stepping =
                matches!(previous.state, CardState::Learning | CardState::Relearning) && grade != Grade::Again;
            if was_already_stepping && previous.state == new_state {
                previous.learning_steps.value() + 1
            } else {
                0
            }
        }
        CardState::New => 0,
    }
}

pub fn schedule_review(meta: &Metadata, grade: Grade, now: DateTime<Utc>) -> Result<GradeResult, ScheduleError> {
    let fsrs = FSRS::new(Parameters::default());
    let before = lift_to_fsrs_card(meta, now);
    let rating = grade.to_fsrs_rating();

    let scheduled = fsrs.repeat(before, now);
    let record = scheduled.get(&rating).ok_or_else(|| ScheduleError {
        card_id: meta.id.clone(),
        message: format!("FSRS produced no scheduling record for rating {:?}", rating),
    })?;
    let after = record.card.clone();
    let new_state = from_fsrs_state(after.state);
    let learning_steps = next_learning_steps(meta, grade, new_state);

    let updated_card = Metadata {
        id: meta.id.clone(),
        stability: RawNumber::new(after.stability),
        difficulty: RawNumber::new(after.difficulty),
        state: new_state,
        learning_steps: RawLearningSteps::new(learning_steps),
        last_review: Some(RawTimestamp::new(now)),
        due: Some(RawTimestamp::new(after.due)),
    };

    let scheduler_log = SchedulerLog {
        rating: grade,
        previous_state: meta.state,
        previous_card: meta.clone(),
        due: after.due,
        stability: after.stability,
        difficulty: after.difficulty,
        scheduled_days: after.scheduled_days,
        learning_steps,
        review: now,
    };

    Ok(GradeResult { updated_card, scheduler_log })
}
