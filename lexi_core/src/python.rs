//! Python bindings for the UI layer

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use rand::thread_rng;

use crate::config::LexiConfig;
use crate::curriculum::{self, Curriculum, ItemType, LearningItem, Level};
use crate::error::LexiError;
use crate::scoring::{self, FeedbackLocale, PronunciationResult};
use crate::practice::{SessionMode, SessionSummary};
use crate::service::{AttemptOutcome, LearningService};
use crate::stages::{StageRecord, UserProgress};
use crate::store::SqliteStore;
use crate::wrong_answers::{AnswerKey, WrongAnswerRecord, WrongAnswerStats};

impl From<LexiError> for PyErr {
    fn from(e: LexiError) -> Self {
        match e {
            LexiError::InvalidValue(_) | LexiError::Import(_) => PyValueError::new_err(e.to_string()),
            _ => PyRuntimeError::new_err(e.to_string()),
        }
    }
}

fn parse_level(level: &str) -> PyResult<Level> {
    Ok(level.parse::<Level>()?)
}

fn parse_item_type(item_type: &str) -> PyResult<ItemType> {
    Ok(item_type.parse::<ItemType>()?)
}

#[pyclass(name = "PronunciationResult")]
#[derive(Debug, Clone)]
pub struct PyPronunciationResult {
    #[pyo3(get)]
    pub accuracy: u8,
    #[pyo3(get)]
    pub fluency: u8,
    #[pyo3(get)]
    pub pronunciation: u8,
    #[pyo3(get)]
    pub overall_score: u8,
    #[pyo3(get)]
    pub feedback: String,
    #[pyo3(get)]
    pub timestamp: String,
}

#[pymethods]
impl PyPronunciationResult {
    fn __repr__(&self) -> String {
        format!(
            "PronunciationResult(overall={}, accuracy={}, fluency={}, pronunciation={})",
            self.overall_score, self.accuracy, self.fluency, self.pronunciation
        )
    }
}

impl From<&PronunciationResult> for PyPronunciationResult {
    fn from(result: &PronunciationResult) -> Self {
        Self {
            accuracy: result.accuracy,
            fluency: result.fluency,
            pronunciation: result.pronunciation,
            overall_score: result.overall_score,
            feedback: result.feedback_message.clone(),
            timestamp: result.timestamp.to_rfc3339(),
        }
    }
}

#[pyclass(name = "AttemptOutcome")]
#[derive(Debug, Clone)]
pub struct PyAttemptOutcome {
    #[pyo3(get)]
    pub passed: bool,
    #[pyo3(get)]
    pub promoted_to_notes: bool,
    #[pyo3(get)]
    pub miss_count: u32,
    #[pyo3(get)]
    pub attempts_on_item: u32,
    #[pyo3(get)]
    pub should_advance: bool,
    #[pyo3(get)]
    pub auto_advanced: bool,
}

impl From<AttemptOutcome> for PyAttemptOutcome {
    fn from(outcome: AttemptOutcome) -> Self {
        Self {
            passed: outcome.passed,
            promoted_to_notes: outcome.promoted_to_notes,
            miss_count: outcome.miss_count,
            attempts_on_item: outcome.attempts_on_item,
            should_advance: outcome.should_advance,
            auto_advanced: outcome.auto_advanced,
        }
    }
}

#[pyclass(name = "LearningItem")]
#[derive(Debug, Clone)]
pub struct PyLearningItem {
    #[pyo3(get)]
    pub id: String,
    #[pyo3(get)]
    pub english_text: String,
    #[pyo3(get)]
    pub korean_text: String,
    #[pyo3(get)]
    pub level: String,
    #[pyo3(get)]
    pub category: Option<String>,
    #[pyo3(get)]
    pub item_type: String,
    #[pyo3(get)]
    pub stage: u32,
}

impl From<&LearningItem> for PyLearningItem {
    fn from(item: &LearningItem) -> Self {
        Self {
            id: item.id.clone(),
            english_text: item.english_text.clone(),
            korean_text: item.korean_text.clone(),
            level: item.level.to_string(),
            category: item.category.clone(),
            item_type: item.item_type.as_str().to_string(),
            stage: item.stage,
        }
    }
}

#[pyclass(name = "WrongAnswer")]
#[derive(Debug, Clone)]
pub struct PyWrongAnswer {
    #[pyo3(get)]
    pub item_id: String,
    #[pyo3(get)]
    pub item_type: String,
    #[pyo3(get)]
    pub english_text: String,
    #[pyo3(get)]
    pub korean_text: String,
    #[pyo3(get)]
    pub miss_count: u32,
    #[pyo3(get)]
    pub mistakes: Vec<String>,
    #[pyo3(get)]
    pub difficulty: u8,
    #[pyo3(get)]
    pub last_miss_at: String,
}

impl From<WrongAnswerRecord> for PyWrongAnswer {
    fn from(record: WrongAnswerRecord) -> Self {
        Self {
            item_type: record.key.item_type.as_str().to_string(),
            item_id: record.key.item_id,
            english_text: record.english_text,
            korean_text: record.korean_text,
            miss_count: record.miss_count,
            mistakes: record.mistakes,
            difficulty: record.difficulty,
            last_miss_at: record.last_miss_at.to_rfc3339(),
        }
    }
}

#[pyclass(name = "StageRecord")]
#[derive(Debug, Clone)]
pub struct PyStageRecord {
    #[pyo3(get)]
    pub level: String,
    #[pyo3(get)]
    pub category: String,
    #[pyo3(get)]
    pub stage: u32,
    #[pyo3(get)]
    pub is_unlocked: bool,
    #[pyo3(get)]
    pub is_completed: bool,
    #[pyo3(get)]
    pub score: u8,
    #[pyo3(get)]
    pub completed_at: Option<String>,
}

impl From<StageRecord> for PyStageRecord {
    fn from(record: StageRecord) -> Self {
        Self {
            level: record.level.to_string(),
            category: record.category,
            stage: record.stage,
            is_unlocked: record.is_unlocked,
            is_completed: record.is_completed,
            score: record.score,
            completed_at: record.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[pyclass(name = "WrongAnswerStats")]
#[derive(Debug, Clone)]
pub struct PyWrongAnswerStats {
    #[pyo3(get)]
    pub total: usize,
    #[pyo3(get)]
    pub expressions: usize,
    #[pyo3(get)]
    pub vocabulary: usize,
    #[pyo3(get)]
    pub most_difficult: Vec<PyWrongAnswer>,
}

impl From<WrongAnswerStats> for PyWrongAnswerStats {
    fn from(stats: WrongAnswerStats) -> Self {
        Self {
            total: stats.total,
            expressions: stats.expressions,
            vocabulary: stats.vocabulary,
            most_difficult: stats.most_difficult.into_iter().map(PyWrongAnswer::from).collect(),
        }
    }
}

#[pyclass(name = "UserProgress")]
#[derive(Debug, Clone)]
pub struct PyUserProgress {
    #[pyo3(get)]
    pub completed_expression_stages: u32,
    #[pyo3(get)]
    pub completed_vocabulary_stages: u32,
    #[pyo3(get)]
    pub overall_accuracy: f64,
    #[pyo3(get)]
    pub last_activity: String,
}

impl From<&UserProgress> for PyUserProgress {
    fn from(progress: &UserProgress) -> Self {
        Self {
            completed_expression_stages: progress.completed_expression_stages,
            completed_vocabulary_stages: progress.completed_vocabulary_stages,
            overall_accuracy: progress.overall_accuracy,
            last_activity: progress.last_activity.to_rfc3339(),
        }
    }
}

#[pyclass(name = "SessionSummary")]
#[derive(Debug, Clone)]
pub struct PySessionSummary {
    #[pyo3(get)]
    pub id: String,
    /// "stage" or "review"
    #[pyo3(get)]
    pub mode: String,
    #[pyo3(get)]
    pub results: Vec<PyPronunciationResult>,
    #[pyo3(get)]
    pub average_score: u8,
    #[pyo3(get)]
    pub passed_count: usize,
    #[pyo3(get)]
    pub reached_end: bool,
    #[pyo3(get)]
    pub stage_completed: bool,
}

#[pymethods]
impl PySessionSummary {
    fn __repr__(&self) -> String {
        format!(
            "SessionSummary(mode='{}', average={}, passed={}/{}, stage_completed={})",
            self.mode,
            self.average_score,
            self.passed_count,
            self.results.len(),
            self.stage_completed
        )
    }
}

impl From<SessionSummary> for PySessionSummary {
    fn from(summary: SessionSummary) -> Self {
        let mode = match summary.mode {
            SessionMode::Stage(_) => "stage",
            SessionMode::Review => "review",
        };
        Self {
            id: summary.id,
            mode: mode.to_string(),
            results: summary.results.iter().map(PyPronunciationResult::from).collect(),
            average_score: summary.average_score,
            passed_count: summary.passed_count,
            reached_end: summary.reached_end,
            stage_completed: summary.stage_completed,
        }
    }
}

/// Learner state backed by a SQLite file
#[pyclass(name = "LearningService", unsendable)]
pub struct PyLearningService {
    inner: LearningService<SqliteStore>,
    curriculum: Curriculum,
}

#[pymethods]
impl PyLearningService {
    #[new]
    #[pyo3(signature = (db_path, config_path=None))]
    fn new(db_path: &str, config_path: Option<&str>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => LexiConfig::from_json_file(path)?,
            None => LexiConfig::default(),
        };
        let store = SqliteStore::open(db_path)?;
        Ok(Self {
            inner: LearningService::open(config, store),
            curriculum: Curriculum::new(),
        })
    }

    /// Import an Excel or CSV curriculum, returning the item count
    fn load_curriculum(&mut self, file_path: &str) -> PyResult<usize> {
        self.curriculum = curriculum::parse_file(std::path::Path::new(file_path))?;
        Ok(self.curriculum.len())
    }

    fn stage_items(&self, level: &str, category: &str, stage: u32, item_type: &str) -> PyResult<Vec<PyLearningItem>> {
        let items = self
            .curriculum
            .items_for_stage(parse_level(level)?, category, stage, parse_item_type(item_type)?);
        Ok(items.iter().map(PyLearningItem::from).collect())
    }

    fn score_pronunciation(&mut self, recognized: &str, target: &str) -> PyPronunciationResult {
        PyPronunciationResult::from(&self.inner.score_pronunciation(recognized, target))
    }

    /// Score a transcript against a curriculum item and record the attempt
    fn record_attempt(
        &mut self,
        item_type: &str,
        item_id: &str,
        recognized: &str,
    ) -> PyResult<(PyPronunciationResult, PyAttemptOutcome)> {
        let item_type = parse_item_type(item_type)?;
        // review items may come from notes of an older curriculum
        let item = self
            .curriculum
            .find(item_type, item_id)
            .or_else(|| {
                self.inner
                    .session()
                    .and_then(|session| session.current_item())
                    .filter(|current| current.item_type == item_type && current.id == item_id)
            })
            .cloned()
            .ok_or_else(|| PyValueError::new_err(format!("unknown item '{}'", item_id)))?;
        let result = self.inner.score_pronunciation(recognized, &item.english_text);
        let outcome = self.inner.record_attempt(&item, &result);
        Ok((PyPronunciationResult::from(&result), outcome.into()))
    }

    #[pyo3(signature = (item_type=None))]
    fn visible_wrong_answers(&self, item_type: Option<&str>) -> PyResult<Vec<PyWrongAnswer>> {
        let item_type = item_type.map(parse_item_type).transpose()?;
        Ok(self
            .inner
            .visible_wrong_answers(item_type)
            .into_iter()
            .map(PyWrongAnswer::from)
            .collect())
    }

    fn wrong_answer_stats(&self) -> PyWrongAnswerStats {
        self.inner.wrong_answer_stats().into()
    }

    fn remove_wrong_answer(&mut self, item_type: &str, item_id: &str) -> PyResult<bool> {
        let key = AnswerKey::new(parse_item_type(item_type)?, item_id);
        Ok(self.inner.remove_wrong_answer(&key))
    }

    /// Count a notes-page practice attempt on an item
    fn touch_wrong_answer(&mut self, item_type: &str, item_id: &str) -> PyResult<bool> {
        let key = AnswerKey::new(parse_item_type(item_type)?, item_id);
        Ok(self.inner.touch_wrong_answer(&key))
    }

    fn stage_state(&self, level: &str, category: &str, stage: u32, item_type: &str) -> PyResult<Option<PyStageRecord>> {
        Ok(self
            .inner
            .stage_state(parse_level(level)?, category, stage, parse_item_type(item_type)?)
            .map(PyStageRecord::from))
    }

    fn complete_stage(
        &mut self,
        level: &str,
        category: &str,
        stage: u32,
        average_score: u8,
        item_type: &str,
    ) -> PyResult<()> {
        self.inner
            .complete_stage(parse_level(level)?, category, stage, average_score, parse_item_type(item_type)?)?;
        Ok(())
    }

    fn user_progress(&self) -> PyUserProgress {
        PyUserProgress::from(self.inner.user_progress())
    }

    /// Start a stage session, returning its first item
    fn start_stage_session(
        &mut self,
        level: &str,
        category: &str,
        stage: u32,
        item_type: &str,
    ) -> PyResult<Option<PyLearningItem>> {
        let session = self.inner.start_stage_session(
            &self.curriculum,
            parse_level(level)?,
            category,
            stage,
            parse_item_type(item_type)?,
        )?;
        Ok(session.current_item().map(PyLearningItem::from))
    }

    /// Start practising the wrong-answer notes, returning the first item
    #[pyo3(signature = (item_type=None))]
    fn start_review_session(&mut self, item_type: Option<&str>) -> PyResult<Option<PyLearningItem>> {
        let item_type = item_type.map(parse_item_type).transpose()?;
        let session = self.inner.start_review_session(item_type)?;
        Ok(session.current_item().map(PyLearningItem::from))
    }

    fn current_item(&self) -> Option<PyLearningItem> {
        self.inner
            .session()
            .and_then(|session| session.current_item())
            .map(PyLearningItem::from)
    }

    /// Move to the next item; `False` once the session reached its end
    fn advance_session(&mut self) -> PyResult<bool> {
        Ok(self.inner.advance_session()?)
    }

    fn finish_session(&mut self) -> PyResult<PySessionSummary> {
        Ok(self.inner.finish_session()?.into())
    }

    fn achievements(&self) -> Vec<String> {
        self.inner
            .achievements()
            .into_iter()
            .map(|a| a.as_str().to_string())
            .collect()
    }

    fn reset_all(&mut self) {
        self.inner.reset_all();
    }

    fn save(&mut self) -> PyResult<()> {
        self.inner.save()?;
        Ok(())
    }
}

#[pyfunction]
#[pyo3(name = "score_pronunciation")]
#[pyo3(signature = (recognized, target, english_feedback=false))]
pub fn py_score_pronunciation(recognized: &str, target: &str, english_feedback: bool) -> PyPronunciationResult {
    let locale = if english_feedback {
        FeedbackLocale::English
    } else {
        FeedbackLocale::Korean
    };
    PyPronunciationResult::from(&scoring::score_pronunciation(recognized, target, locale, &mut thread_rng()))
}

#[pyfunction]
#[pyo3(name = "parse_curriculum")]
pub fn py_parse_curriculum(file_path: &str) -> PyResult<Vec<PyLearningItem>> {
    let curriculum = curriculum::parse_file(std::path::Path::new(file_path))?;
    Ok(curriculum.items().map(PyLearningItem::from).collect())
}

#[pyfunction]
#[pyo3(name = "similarity")]
pub fn py_similarity(recognized: &str, target: &str) -> f64 {
    crate::fuzzy::combined_similarity(recognized, target)
}
