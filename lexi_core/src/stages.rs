//! Stage progression: Locked -> Unlocked -> Completed per track
//!
//! A track is one (item type, level, category) combination. Vocabulary has a
//! single track per level regardless of category. Completing a stage unlocks the
//! next stage of the same track only.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::curriculum::{ItemType, Level, EXPRESSION_CATEGORIES, VOCABULARY_CATEGORY};
use crate::error::{LexiError, LexiResult};

pub const DEFAULT_STAGES_PER_TRACK: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageKey {
    pub item_type: ItemType,
    pub level: Level,
    pub category: String,
    pub stage: u32,
}

impl StageKey {
    /// Vocabulary keys always use the vocabulary category
    pub fn new(level: Level, category: &str, stage: u32, item_type: ItemType) -> Self {
        let category = match item_type {
            ItemType::Vocabulary => VOCABULARY_CATEGORY,
            ItemType::Expression => category,
        };
        Self {
            item_type,
            level,
            category: category.to_string(),
            stage,
        }
    }

    pub fn next(&self) -> Self {
        Self {
            stage: self.stage + 1,
            ..self.clone()
        }
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.item_type, self.level, self.category, self.stage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Locked,
    Unlocked,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub level: Level,
    pub category: String,
    pub stage: u32,
    pub item_type: ItemType,
    pub is_unlocked: bool,
    pub is_completed: bool,
    pub score: u8,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    fn initial(key: &StageKey) -> Self {
        Self {
            level: key.level,
            category: key.category.clone(),
            stage: key.stage,
            item_type: key.item_type,
            is_unlocked: key.stage == 1,
            is_completed: false,
            score: 0,
            completed_at: None,
        }
    }

    pub fn state(&self) -> StageState {
        if self.is_completed {
            StageState::Completed
        } else if self.is_unlocked {
            StageState::Unlocked
        } else {
            StageState::Locked
        }
    }
}

/// Aggregate learner progress across all tracks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    pub completed_expression_stages: u32,
    pub completed_vocabulary_stages: u32,
    /// Mean score of completed stages
    pub overall_accuracy: f64,
    pub last_activity: DateTime<Utc>,
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            completed_expression_stages: 0,
            completed_vocabulary_stages: 0,
            overall_accuracy: 0.0,
            last_activity: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    First10Stages,
    DedicatedLearner,
    AccuracyMaster,
}

impl Achievement {
    pub fn as_str(self) -> &'static str {
        match self {
            Achievement::First10Stages => "first_10_stages",
            Achievement::DedicatedLearner => "dedicated_learner",
            Achievement::AccuracyMaster => "accuracy_master",
        }
    }
}

/// Persisted form of the stage map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub stages: Vec<(StageKey, StageRecord)>,
    pub progress: UserProgress,
}

#[derive(Debug, Clone)]
pub struct StageManager {
    stages: BTreeMap<StageKey, StageRecord>,
    progress: UserProgress,
    stages_per_track: u32,
}

impl Default for StageManager {
    fn default() -> Self {
        Self::new(DEFAULT_STAGES_PER_TRACK)
    }
}

impl StageManager {
    pub fn new(stages_per_track: u32) -> Self {
        let mut manager = Self {
            stages: BTreeMap::new(),
            progress: UserProgress::default(),
            stages_per_track: stages_per_track.max(1),
        };
        manager.initialize();
        manager
    }

    fn initialize(&mut self) {
        self.stages.clear();
        for level in Level::ALL {
            for category in EXPRESSION_CATEGORIES {
                self.insert_track(level, category, ItemType::Expression);
            }
            self.insert_track(level, VOCABULARY_CATEGORY, ItemType::Vocabulary);
        }
        self.progress = UserProgress::default();
    }

    fn insert_track(&mut self, level: Level, category: &str, item_type: ItemType) {
        for stage in 1..=self.stages_per_track {
            let key = StageKey::new(level, category, stage, item_type);
            let record = StageRecord::initial(&key);
            self.stages.insert(key, record);
        }
    }

    /// Restore saved records over a freshly initialized map
    pub fn from_snapshot(stages_per_track: u32, snapshot: StageSnapshot) -> Self {
        let mut manager = Self::new(stages_per_track);
        for (key, record) in snapshot.stages {
            if let Some(slot) = manager.stages.get_mut(&key) {
                *slot = record;
            } else {
                debug!("Ignoring saved stage {} outside the curriculum", key);
            }
        }
        manager.progress = snapshot.progress;
        manager
    }

    /// Only stages that differ from their initial state are included
    pub fn snapshot(&self) -> StageSnapshot {
        let stages = self
            .stages
            .iter()
            .filter(|(key, record)| **record != StageRecord::initial(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        StageSnapshot {
            stages,
            progress: self.progress.clone(),
        }
    }

    pub fn stage(&self, level: Level, category: &str, stage: u32, item_type: ItemType) -> Option<&StageRecord> {
        self.stages.get(&StageKey::new(level, category, stage, item_type))
    }

    pub fn get(&self, key: &StageKey) -> Option<&StageRecord> {
        self.stages.get(key)
    }

    pub fn complete_stage(
        &mut self,
        level: Level,
        category: &str,
        stage: u32,
        score: u8,
        item_type: ItemType,
    ) -> LexiResult<()> {
        self.complete(&StageKey::new(level, category, stage, item_type), score)
    }

    /// Mark an unlocked stage completed and unlock the next stage of its track
    pub fn complete(&mut self, key: &StageKey, score: u8) -> LexiResult<()> {
        let now = Utc::now();
        let record = self
            .stages
            .get_mut(key)
            .ok_or_else(|| LexiError::StageNotFound(key.to_string()))?;
        if !record.is_unlocked {
            return Err(LexiError::StageLocked(key.to_string()));
        }

        let first_completion = !record.is_completed;
        record.is_completed = true;
        record.score = score.min(100);
        record.completed_at = Some(now);

        if let Some(next) = self.stages.get_mut(&key.next()) {
            if !next.is_unlocked {
                debug!("Unlocked stage {}", key.next());
            }
            next.is_unlocked = true;
        }

        if first_completion {
            match key.item_type {
                ItemType::Expression => self.progress.completed_expression_stages += 1,
                ItemType::Vocabulary => self.progress.completed_vocabulary_stages += 1,
            }
        }
        self.progress.last_activity = now;
        self.refresh_accuracy();

        info!("Completed stage {} with score {}", key, score);
        Ok(())
    }

    fn refresh_accuracy(&mut self) {
        let scores: Vec<f64> = self
            .stages
            .values()
            .filter(|s| s.is_completed)
            .map(|s| s.score as f64)
            .collect();
        if !scores.is_empty() {
            self.progress.overall_accuracy = scores.iter().sum::<f64>() / scores.len() as f64;
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &StageRecord> {
        self.stages.values()
    }

    pub fn by_level(&self, level: Level, item_type: Option<ItemType>) -> Vec<&StageRecord> {
        self.stages
            .values()
            .filter(|s| s.level == level && item_type.map_or(true, |t| s.item_type == t))
            .collect()
    }

    pub fn by_category(&self, category: &str, item_type: Option<ItemType>) -> Vec<&StageRecord> {
        self.stages
            .values()
            .filter(|s| s.category == category && item_type.map_or(true, |t| s.item_type == t))
            .collect()
    }

    pub fn progress(&self) -> &UserProgress {
        &self.progress
    }

    pub fn completed_count(&self) -> usize {
        self.stages.values().filter(|s| s.is_completed).count()
    }

    pub fn achievements(&self) -> Vec<Achievement> {
        let completed = self.completed_count();
        let mut achievements = Vec::new();
        if completed >= 10 {
            achievements.push(Achievement::First10Stages);
        }
        if completed >= 50 {
            achievements.push(Achievement::DedicatedLearner);
        }
        if completed > 0 && self.progress.overall_accuracy >= 90.0 {
            achievements.push(Achievement::AccuracyMaster);
        }
        achievements
    }

    /// Reinitialize every track to its starting state
    pub fn reset(&mut self) {
        self.initialize();
        info!("Stage progress reset");
    }
}
