//! Practice sessions and lifetime speaking history

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::curriculum::LearningItem;
use crate::error::{LexiError, LexiResult};
use crate::scoring::PronunciationResult;
use crate::stages::StageKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionMode {
    /// Regular run through a stage; finishing it completes the stage
    Stage(StageKey),
    /// Re-practising wrong-answer notes; no attempt limit, no stage completion
    Review,
}

#[derive(Debug, Clone)]
pub struct PracticeSession {
    id: String,
    mode: SessionMode,
    items: Vec<LearningItem>,
    current_index: usize,
    attempts: Vec<u32>,
    results: Vec<PronunciationResult>,
    started_at: DateTime<Utc>,
}

/// What a finished session produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub mode: SessionMode,
    pub results: Vec<PronunciationResult>,
    pub average_score: u8,
    pub passed_count: usize,
    /// Every item in the session was reached
    pub reached_end: bool,
    pub stage_completed: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Rounded mean of overall scores, 0 for an empty list
pub fn average_score(results: &[PronunciationResult]) -> u8 {
    if results.is_empty() {
        return 0;
    }
    let total: u32 = results.iter().map(|r| r.overall_score as u32).sum();
    (total as f64 / results.len() as f64).round() as u8
}

fn session_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let suffix: String = (0..9).map(|_| char::from(rng.sample(Alphanumeric))).collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix.to_lowercase())
}

impl PracticeSession {
    pub fn start<R: Rng + ?Sized>(mode: SessionMode, items: Vec<LearningItem>, rng: &mut R) -> LexiResult<Self> {
        if items.is_empty() {
            return Err(LexiError::EmptySession);
        }
        Ok(Self {
            id: session_id(rng),
            mode,
            attempts: vec![0; items.len()],
            items,
            current_index: 0,
            results: Vec::new(),
            started_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    pub fn items(&self) -> &[LearningItem] {
        &self.items
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_item(&self) -> Option<&LearningItem> {
        self.items.get(self.current_index)
    }

    /// Store a scored attempt on the current item, returning its attempt count
    pub fn record_result(&mut self, result: PronunciationResult) -> u32 {
        self.results.push(result);
        match self.attempts.get_mut(self.current_index) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => 0,
        }
    }

    pub fn attempts_on_current(&self) -> u32 {
        self.attempts.get(self.current_index).copied().unwrap_or(0)
    }

    /// Move to the next item; `false` once the list is exhausted
    pub fn advance(&mut self) -> bool {
        if self.current_index < self.items.len() {
            self.current_index += 1;
        }
        self.current_index < self.items.len()
    }

    pub fn is_finished(&self) -> bool {
        self.current_index >= self.items.len()
    }

    pub fn results(&self) -> &[PronunciationResult] {
        &self.results
    }

    pub fn average_score(&self) -> u8 {
        average_score(&self.results)
    }

    pub fn finish(self, pass_threshold: u8, stage_completed: bool) -> SessionSummary {
        SessionSummary {
            average_score: average_score(&self.results),
            passed_count: self.results.iter().filter(|r| r.passed(pass_threshold)).count(),
            reached_end: self.is_finished(),
            stage_completed,
            id: self.id,
            mode: self.mode,
            results: self.results,
            started_at: self.started_at,
            ended_at: Utc::now(),
        }
    }
}

/// Every scored attempt across sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PracticeHistory {
    results: Vec<PronunciationResult>,
}

impl PracticeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: PronunciationResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[PronunciationResult] {
        &self.results
    }

    pub fn average_score(&self) -> u8 {
        average_score(&self.results)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn reset(&mut self) {
        self.results.clear();
    }
}
