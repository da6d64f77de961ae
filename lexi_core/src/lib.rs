//! LexiLearn Core - pronunciation scoring and learner progress for an English-speaking tutor
//!
//! Provides fuzzy phrase similarity, score mapping, wrong-answer tracking, stage
//! progression, timeout-guarded recognition and key-value persistence.

pub mod config;
pub mod curriculum;
pub mod error;
pub mod fuzzy;
pub mod practice;
pub mod recognition;
pub mod scoring;
pub mod service;
pub mod stages;
pub mod store;
pub mod wrong_answers;

#[cfg(feature = "python")]
mod python;

pub use config::LexiConfig;
pub use curriculum::{parse_csv, parse_excel, parse_file, Curriculum, ItemType, LearningItem, Level};
pub use error::{LexiError, LexiResult};
pub use fuzzy::{combined_similarity, edit_distance, normalize_text, word_similarity};
pub use practice::{PracticeHistory, PracticeSession, SessionMode, SessionSummary};
pub use recognition::{RecognitionError, RecognitionErrorKind, RecognitionSession, SpeechRecognizer};
pub use scoring::{score_pronunciation, FeedbackLocale, FeedbackTier, PronunciationResult};
pub use service::{AttemptOutcome, AttemptReport, LearningService};
pub use stages::{Achievement, StageKey, StageManager, StageRecord, StageState, UserProgress};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use wrong_answers::{AnswerKey, WrongAnswerRecord, WrongAnswerStats, WrongAnswerTracker};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// LexiLearn Core Python Module
#[cfg(feature = "python")]
#[pymodule]
fn lexi_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Stateless helpers
    m.add_function(wrap_pyfunction!(python::py_score_pronunciation, m)?)?;
    m.add_function(wrap_pyfunction!(python::py_similarity, m)?)?;
    m.add_function(wrap_pyfunction!(python::py_parse_curriculum, m)?)?;

    // Register classes
    m.add_class::<python::PyLearningService>()?;
    m.add_class::<python::PyPronunciationResult>()?;
    m.add_class::<python::PyAttemptOutcome>()?;
    m.add_class::<python::PyLearningItem>()?;
    m.add_class::<python::PyWrongAnswer>()?;
    m.add_class::<python::PyStageRecord>()?;
    m.add_class::<python::PyWrongAnswerStats>()?;
    m.add_class::<python::PyUserProgress>()?;
    m.add_class::<python::PySessionSummary>()?;

    Ok(())
}
