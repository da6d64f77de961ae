//! Wrong-answer tracking with promotion to review notes
//!
//! Every miss on an item bumps its counter. The miss that brings the counter to the
//! threshold promotes the item into the learner's notes, and that crossing is
//! reported exactly once. A single correct answer forgets the item entirely.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::curriculum::{ItemType, LearningItem, Level};

pub const DEFAULT_MISS_THRESHOLD: u32 = 3;

/// Notes stats list at most this many difficult items
const MOST_DIFFICULT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnswerKey {
    pub item_type: ItemType,
    pub item_id: String,
}

impl AnswerKey {
    pub fn new(item_type: ItemType, item_id: impl Into<String>) -> Self {
        Self {
            item_type,
            item_id: item_id.into(),
        }
    }

    pub fn for_item(item: &LearningItem) -> Self {
        Self::new(item.item_type, item.id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrongAnswerRecord {
    pub key: AnswerKey,
    pub english_text: String,
    pub korean_text: String,
    pub level: Level,
    pub category: Option<String>,
    pub stage: u32,
    pub miss_count: u32,
    /// Distinct reasons in the order they were first seen
    pub mistakes: Vec<String>,
    pub total_attempts: u32,
    /// Highest `100 - score` seen across misses
    pub difficulty: u8,
    pub last_miss_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrongAnswerStats {
    pub total: usize,
    pub expressions: usize,
    pub vocabulary: usize,
    pub most_difficult: Vec<WrongAnswerRecord>,
}

#[derive(Debug, Clone)]
pub struct WrongAnswerTracker {
    records: HashMap<AnswerKey, WrongAnswerRecord>,
    threshold: u32,
}

impl Default for WrongAnswerTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MISS_THRESHOLD)
    }
}

impl WrongAnswerTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            records: HashMap::new(),
            threshold: threshold.max(1),
        }
    }

    /// Rebuild from a snapshot produced by [`WrongAnswerTracker::entries`]
    pub fn from_entries(threshold: u32, entries: Vec<(AnswerKey, WrongAnswerRecord)>) -> Self {
        let mut tracker = Self::new(threshold);
        tracker.records.extend(entries);
        tracker
    }

    /// Snapshot as (key, record) pairs, sorted by key for stable output
    pub fn entries(&self) -> Vec<(AnswerKey, WrongAnswerRecord)> {
        let mut entries: Vec<_> = self.records.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        entries.sort_by(|a, b| (a.0.item_type, &a.0.item_id).cmp(&(b.0.item_type, &b.0.item_id)));
        entries
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record a miss; `true` only when this miss reaches the threshold
    pub fn record_miss(&mut self, item: &LearningItem, reason: &str, score: u8) -> bool {
        self.record_miss_at(item, reason, score, Utc::now())
    }

    pub fn record_miss_at(&mut self, item: &LearningItem, reason: &str, score: u8, now: DateTime<Utc>) -> bool {
        let key = AnswerKey::for_item(item);
        let difficulty = 100u8.saturating_sub(score.min(100));

        let record = self
            .records
            .entry(key.clone())
            .and_modify(|record| {
                record.miss_count += 1;
                record.total_attempts += 1;
                record.last_miss_at = now;
                record.last_attempt_at = now;
                record.difficulty = record.difficulty.max(difficulty);
                if !record.mistakes.iter().any(|m| m == reason) {
                    record.mistakes.push(reason.to_string());
                }
            })
            .or_insert_with(|| WrongAnswerRecord {
                key: key.clone(),
                english_text: item.english_text.clone(),
                korean_text: item.korean_text.clone(),
                level: item.level,
                category: item.category.clone(),
                stage: item.stage,
                miss_count: 1,
                mistakes: vec![reason.to_string()],
                total_attempts: 1,
                difficulty,
                last_miss_at: now,
                last_attempt_at: now,
            });

        debug!("Miss recorded for {}_{} (count {})", key.item_type, key.item_id, record.miss_count);

        let promoted = record.miss_count == self.threshold;
        if promoted {
            info!("Promoted '{}' to wrong-answer notes", record.english_text);
        }
        promoted
    }

    /// A correct answer clears the item's whole miss history
    pub fn record_correct(&mut self, key: &AnswerKey) -> bool {
        let removed = self.records.remove(key).is_some();
        if removed {
            debug!("Cleared miss history for {}_{}", key.item_type, key.item_id);
        }
        removed
    }

    /// Drop an item from the notes without it being answered
    pub fn remove_from_notes(&mut self, key: &AnswerKey) -> bool {
        self.records.remove(key).is_some()
    }

    /// Count a review attempt that neither passed nor missed
    pub fn touch_attempt(&mut self, key: &AnswerKey) -> bool {
        match self.records.get_mut(key) {
            Some(record) => {
                record.total_attempts += 1;
                record.last_attempt_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn miss_count(&self, key: &AnswerKey) -> u32 {
        self.records.get(key).map_or(0, |r| r.miss_count)
    }

    pub fn get(&self, key: &AnswerKey) -> Option<&WrongAnswerRecord> {
        self.records.get(key)
    }

    /// Records at or past the threshold, most recent miss first
    pub fn visible_notes(&self, item_type: Option<ItemType>) -> Vec<WrongAnswerRecord> {
        let mut notes: Vec<WrongAnswerRecord> = self
            .records
            .values()
            .filter(|r| r.miss_count >= self.threshold)
            .filter(|r| item_type.map_or(true, |t| r.key.item_type == t))
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.last_miss_at.cmp(&a.last_miss_at));
        notes
    }

    pub fn stats(&self) -> WrongAnswerStats {
        let notes = self.visible_notes(None);
        let expressions = notes.iter().filter(|r| r.key.item_type == ItemType::Expression).count();

        let mut most_difficult = notes.clone();
        most_difficult.sort_by(|a, b| b.difficulty.cmp(&a.difficulty));
        most_difficult.truncate(MOST_DIFFICULT_LIMIT);

        WrongAnswerStats {
            total: notes.len(),
            expressions,
            vocabulary: notes.len() - expressions,
            most_difficult,
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn word(id: &str) -> LearningItem {
        LearningItem {
            id: id.to_string(),
            english_text: format!("word {}", id),
            korean_text: "단어".to_string(),
            level: Level::Beginner,
            category: None,
            item_type: ItemType::Vocabulary,
            stage: 1,
        }
    }

    fn expression(id: &str) -> LearningItem {
        LearningItem {
            item_type: ItemType::Expression,
            category: Some("daily_conversation".to_string()),
            ..word(id)
        }
    }

    #[test]
    fn test_promotion_fires_once_on_third_miss() {
        let mut tracker = WrongAnswerTracker::default();
        let item = word("X");

        assert!(!tracker.record_miss(&item, "low accuracy", 40));
        assert!(!tracker.record_miss(&item, "low fluency", 30));
        assert!(tracker.record_miss(&item, "low pronunciation", 20));
        assert!(!tracker.record_miss(&item, "low accuracy", 10));

        assert_eq!(tracker.miss_count(&AnswerKey::for_item(&item)), 4);
    }

    #[test]
    fn test_three_vocabulary_misses_visible_once() {
        let mut tracker = WrongAnswerTracker::default();
        let item = word("X");
        let reasons = ["accuracy", "fluency", "accuracy"];
        let results: Vec<bool> = [40, 30, 20]
            .iter()
            .zip(reasons)
            .map(|(score, reason)| tracker.record_miss(&item, reason, *score))
            .collect();
        assert_eq!(results, vec![false, false, true]);

        let notes = tracker.visible_notes(Some(ItemType::Vocabulary));
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].miss_count, 3);
        assert_eq!(notes[0].mistakes, vec!["accuracy", "fluency"]);
        assert_eq!(notes[0].total_attempts, 3);
        assert_eq!(notes[0].difficulty, 80);
        assert!(tracker.visible_notes(Some(ItemType::Expression)).is_empty());
    }

    #[test]
    fn test_correct_answer_restarts_count() {
        let mut tracker = WrongAnswerTracker::default();
        let item = word("X");
        let key = AnswerKey::for_item(&item);

        tracker.record_miss(&item, "accuracy", 50);
        tracker.record_miss(&item, "accuracy", 50);
        assert!(tracker.record_correct(&key));
        assert_eq!(tracker.miss_count(&key), 0);
        assert!(!tracker.record_correct(&key));

        assert!(!tracker.record_miss(&item, "accuracy", 50));
        assert_eq!(tracker.miss_count(&key), 1);
        assert!(!tracker.record_miss(&item, "accuracy", 50));
        assert!(tracker.record_miss(&item, "accuracy", 50));
    }

    #[test]
    fn test_notes_exclude_items_below_threshold() {
        let mut tracker = WrongAnswerTracker::default();
        tracker.record_miss(&word("a"), "accuracy", 50);
        tracker.record_miss(&word("a"), "accuracy", 50);
        for _ in 0..3 {
            tracker.record_miss(&word("b"), "accuracy", 50);
        }

        let notes = tracker.visible_notes(None);
        assert_eq!(notes.len(), 1);
        assert!(notes.iter().all(|r| r.miss_count >= 3));
    }

    #[test]
    fn test_notes_ordered_by_latest_miss() {
        let mut tracker = WrongAnswerTracker::default();
        let start = Utc::now();
        for i in 0..3 {
            tracker.record_miss_at(&word("old"), "accuracy", 50, start + Duration::seconds(i));
        }
        for i in 0..3 {
            tracker.record_miss_at(&expression("new"), "accuracy", 50, start + Duration::seconds(10 + i));
        }

        let notes = tracker.visible_notes(None);
        assert_eq!(notes[0].key.item_id, "new");
        assert_eq!(notes[1].key.item_id, "old");
    }

    #[test]
    fn test_same_id_different_type_tracked_separately() {
        let mut tracker = WrongAnswerTracker::default();
        tracker.record_miss(&word("1"), "accuracy", 50);
        tracker.record_miss(&expression("1"), "accuracy", 50);

        assert_eq!(tracker.miss_count(&AnswerKey::new(ItemType::Vocabulary, "1")), 1);
        assert_eq!(tracker.miss_count(&AnswerKey::new(ItemType::Expression, "1")), 1);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_stats_and_entries_roundtrip() {
        let mut tracker = WrongAnswerTracker::default();
        for _ in 0..3 {
            tracker.record_miss(&word("w"), "accuracy", 60);
            tracker.record_miss(&expression("e"), "accuracy", 20);
        }
        tracker.touch_attempt(&AnswerKey::new(ItemType::Vocabulary, "w"));

        let stats = tracker.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.expressions, 1);
        assert_eq!(stats.vocabulary, 1);
        assert_eq!(stats.most_difficult[0].key.item_id, "e");

        let json = serde_json::to_string(&tracker.entries()).unwrap();
        let restored = WrongAnswerTracker::from_entries(3, serde_json::from_str(&json).unwrap());
        assert_eq!(restored.entries(), tracker.entries());
        assert_eq!(
            restored.get(&AnswerKey::new(ItemType::Vocabulary, "w")).unwrap().total_attempts,
            4
        );
    }
}
