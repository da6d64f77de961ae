//! Learning service: the stateful entry point for the UI layer
//!
//! Owns the wrong-answer tracker, stage map, practice history and the store they
//! persist to. Every mutation is followed by a best-effort save; storage problems
//! are logged and never interrupt the session.

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::LexiConfig;
use crate::curriculum::{Curriculum, ItemType, LearningItem, Level};
use crate::error::{LexiError, LexiResult};
use crate::practice::{PracticeHistory, PracticeSession, SessionMode, SessionSummary};
use crate::recognition::{RecognitionError, RecognitionSession, SpeechRecognizer};
use crate::scoring::{score_pronunciation, PronunciationResult};
use crate::stages::{Achievement, StageKey, StageManager, StageRecord, StageSnapshot, UserProgress};
use crate::store::{KeyValueStore, SPEAKING_HISTORY_KEY, STAGE_PROGRESS_KEY, WRONG_ANSWERS_KEY};
use crate::wrong_answers::{AnswerKey, WrongAnswerRecord, WrongAnswerStats, WrongAnswerTracker};

/// What recording one scored attempt changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttemptOutcome {
    pub passed: bool,
    /// This attempt moved the item into the wrong-answer notes
    pub promoted_to_notes: bool,
    pub miss_count: u32,
    /// Attempts on the item within the active session, 0 outside one
    pub attempts_on_item: u32,
    /// Passed; the caller moves on when ready
    pub should_advance: bool,
    /// Out of attempts in a stage session; the session already moved on
    pub auto_advanced: bool,
}

/// A recognized, scored and recorded attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptReport {
    pub transcript: String,
    pub result: PronunciationResult,
    pub outcome: AttemptOutcome,
}

pub struct LearningService<S: KeyValueStore> {
    config: LexiConfig,
    store: S,
    tracker: WrongAnswerTracker,
    stages: StageManager,
    history: PracticeHistory,
    session: Option<PracticeSession>,
    rng: StdRng,
}

impl<S: KeyValueStore> LearningService<S> {
    /// Fresh state, nothing read from the store
    pub fn new(config: LexiConfig, store: S) -> Self {
        Self {
            tracker: WrongAnswerTracker::new(config.miss_threshold),
            stages: StageManager::new(config.stages_per_track),
            history: PracticeHistory::new(),
            session: None,
            rng: StdRng::from_entropy(),
            config,
            store,
        }
    }

    /// Construct and restore whatever the store holds
    pub fn open(config: LexiConfig, store: S) -> Self {
        let mut service = Self::new(config, store);
        service.load();
        service
    }

    /// Replace the jitter source, e.g. with a seeded generator
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn config(&self) -> &LexiConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Recognition session using the configured time budget
    pub fn recognition_session<R: SpeechRecognizer>(&self, recognizer: R) -> RecognitionSession<R> {
        RecognitionSession::with_timeout(recognizer, self.config.recognition_timeout())
    }

    // ========== Scoring ==========

    pub fn score_pronunciation(&mut self, recognized: &str, target: &str) -> PronunciationResult {
        score_pronunciation(recognized, target, self.config.feedback_locale, &mut self.rng)
    }

    /// Feed a scored attempt into the tracker, the session and the history
    pub fn record_attempt(&mut self, item: &LearningItem, result: &PronunciationResult) -> AttemptOutcome {
        let key = AnswerKey::for_item(item);
        let passed = result.passed(self.config.pass_threshold);

        let promoted_to_notes = if passed {
            self.tracker.record_correct(&key);
            false
        } else {
            let reason = format!("low {}", result.weakest_area());
            self.tracker.record_miss(item, &reason, result.overall_score)
        };

        self.history.push(result.clone());

        let mut attempts_on_item = 0;
        let mut auto_advanced = false;
        if let Some(session) = self.session.as_mut() {
            let is_current = session
                .current_item()
                .map_or(false, |current| AnswerKey::for_item(current) == key);
            if is_current {
                attempts_on_item = session.record_result(result.clone());
                let stage_mode = matches!(session.mode(), SessionMode::Stage(_));
                if stage_mode && !passed && attempts_on_item >= self.config.max_attempts_per_item {
                    debug!("Out of attempts on {}, moving on", item.id);
                    session.advance();
                    auto_advanced = true;
                }
            }
        }

        self.persist();

        AttemptOutcome {
            passed,
            promoted_to_notes,
            miss_count: self.tracker.miss_count(&key),
            attempts_on_item,
            should_advance: passed,
            auto_advanced,
        }
    }

    /// Listen for one utterance, then score and record it
    ///
    /// Timeouts and recognition errors return early, so they never count as an attempt.
    pub async fn listen_and_score<R: SpeechRecognizer>(
        &mut self,
        recognition: &mut RecognitionSession<R>,
        item: &LearningItem,
    ) -> Result<AttemptReport, RecognitionError> {
        let transcript = recognition.listen().await?;
        let result = self.score_pronunciation(&transcript, &item.english_text);
        let outcome = self.record_attempt(item, &result);
        Ok(AttemptReport {
            transcript,
            result,
            outcome,
        })
    }

    // ========== Wrong-answer notes ==========

    pub fn visible_wrong_answers(&self, item_type: Option<ItemType>) -> Vec<WrongAnswerRecord> {
        self.tracker.visible_notes(item_type)
    }

    pub fn wrong_answer_stats(&self) -> WrongAnswerStats {
        self.tracker.stats()
    }

    pub fn miss_count(&self, key: &AnswerKey) -> u32 {
        self.tracker.miss_count(key)
    }

    pub fn remove_wrong_answer(&mut self, key: &AnswerKey) -> bool {
        let removed = self.tracker.remove_from_notes(key);
        if removed {
            self.persist();
        }
        removed
    }

    /// Note a practice attempt on a wrong-answer item without scoring it
    pub fn touch_wrong_answer(&mut self, key: &AnswerKey) -> bool {
        let touched = self.tracker.touch_attempt(key);
        if touched {
            self.persist();
        }
        touched
    }

    // ========== Stages ==========

    pub fn stage_state(&self, level: Level, category: &str, stage: u32, item_type: ItemType) -> Option<StageRecord> {
        self.stages.stage(level, category, stage, item_type).cloned()
    }

    pub fn complete_stage(
        &mut self,
        level: Level,
        category: &str,
        stage: u32,
        average_score: u8,
        item_type: ItemType,
    ) -> LexiResult<()> {
        self.stages.complete_stage(level, category, stage, average_score, item_type)?;
        self.persist();
        Ok(())
    }

    pub fn stages(&self) -> &StageManager {
        &self.stages
    }

    pub fn user_progress(&self) -> &UserProgress {
        self.stages.progress()
    }

    pub fn achievements(&self) -> Vec<Achievement> {
        self.stages.achievements()
    }

    // ========== Practice sessions ==========

    /// Start working through an unlocked stage
    pub fn start_stage_session(
        &mut self,
        curriculum: &Curriculum,
        level: Level,
        category: &str,
        stage: u32,
        item_type: ItemType,
    ) -> LexiResult<&PracticeSession> {
        let key = StageKey::new(level, category, stage, item_type);
        let record = self
            .stages
            .get(&key)
            .ok_or_else(|| LexiError::StageNotFound(key.to_string()))?;
        if !record.is_unlocked {
            return Err(LexiError::StageLocked(key.to_string()));
        }

        let items = curriculum.items_for_stage(level, category, stage, item_type).to_vec();
        self.begin_session(SessionMode::Stage(key), items)
    }

    /// Start re-practising the items currently in the wrong-answer notes
    pub fn start_review_session(&mut self, item_type: Option<ItemType>) -> LexiResult<&PracticeSession> {
        let items = self
            .tracker
            .visible_notes(item_type)
            .into_iter()
            .map(|record| LearningItem {
                id: record.key.item_id,
                english_text: record.english_text,
                korean_text: record.korean_text,
                level: record.level,
                category: record.category,
                item_type: record.key.item_type,
                stage: record.stage,
            })
            .collect();
        self.begin_session(SessionMode::Review, items)
    }

    fn begin_session(&mut self, mode: SessionMode, items: Vec<LearningItem>) -> LexiResult<&PracticeSession> {
        if let Some(previous) = self.session.take() {
            warn!("Discarding unfinished session {}", previous.id());
        }
        let session = PracticeSession::start(mode, items, &mut self.rng)?;
        info!("Started session {} with {} items", session.id(), session.items().len());
        Ok(self.session.insert(session))
    }

    pub fn session(&self) -> Option<&PracticeSession> {
        self.session.as_ref()
    }

    /// Move the active session to its next item; `false` once all were reached
    pub fn advance_session(&mut self) -> LexiResult<bool> {
        let session = self.session.as_mut().ok_or(LexiError::NoActiveSession)?;
        Ok(session.advance())
    }

    /// End the active session, completing its stage when every item was reached
    pub fn finish_session(&mut self) -> LexiResult<SessionSummary> {
        let session = self.session.take().ok_or(LexiError::NoActiveSession)?;
        let average = session.average_score();

        let stage_completed = match session.mode() {
            SessionMode::Stage(key) if session.is_finished() => match self.stages.complete(key, average) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Could not complete stage {}: {}", key, e);
                    false
                }
            },
            _ => false,
        };

        let summary = session.finish(self.config.pass_threshold, stage_completed);
        self.persist();
        Ok(summary)
    }

    pub fn practice_history(&self) -> &PracticeHistory {
        &self.history
    }

    /// Back to a brand-new learner
    pub fn reset_all(&mut self) {
        self.tracker.clear();
        self.stages.reset();
        self.history.reset();
        self.session = None;
        for key in [WRONG_ANSWERS_KEY, STAGE_PROGRESS_KEY, SPEAKING_HISTORY_KEY] {
            if let Err(e) = self.store.remove(key) {
                error!("Failed to clear '{}' from storage: {}", key, e);
            }
        }
    }

    // ========== Persistence ==========

    /// Write all learner state to the store
    pub fn save(&mut self) -> LexiResult<()> {
        let wrong_answers = serde_json::to_string(&self.tracker.entries())?;
        self.store.set(WRONG_ANSWERS_KEY, &wrong_answers)?;

        let stages = serde_json::to_string(&self.stages.snapshot())?;
        self.store.set(STAGE_PROGRESS_KEY, &stages)?;

        let history = serde_json::to_string(&self.history)?;
        self.store.set(SPEAKING_HISTORY_KEY, &history)?;
        Ok(())
    }

    /// Restore state from the store; unreadable pieces keep their current value
    pub fn load(&mut self) {
        if let Some(entries) = self.read_state::<Vec<(AnswerKey, WrongAnswerRecord)>>(WRONG_ANSWERS_KEY) {
            self.tracker = WrongAnswerTracker::from_entries(self.config.miss_threshold, entries);
        }
        if let Some(snapshot) = self.read_state::<StageSnapshot>(STAGE_PROGRESS_KEY) {
            self.stages = StageManager::from_snapshot(self.config.stages_per_track, snapshot);
        }
        if let Some(history) = self.read_state::<PracticeHistory>(SPEAKING_HISTORY_KEY) {
            self.history = history;
        }
    }

    fn read_state<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                error!("Failed to read '{}' from storage, using defaults: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Malformed '{}' in storage, using defaults: {}", key, e);
                None
            }
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.save() {
            error!("Failed to persist learner state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::parse_csv_str;
    use crate::recognition::testing::ScriptedRecognizer;
    use crate::recognition::RecognitionErrorKind;
    use crate::store::MemoryStore;

    const CURRICULUM: &str = "\
id,english,korean,level,category,stage,type
e1,How are you today?,오늘 어떠세요?,beginner,daily_conversation,1,expression
e2,Nice to meet you.,만나서 반가워요.,beginner,daily_conversation,1,expression
";

    fn service() -> LearningService<MemoryStore> {
        LearningService::new(LexiConfig::default(), MemoryStore::new()).with_rng(StdRng::seed_from_u64(5))
    }

    fn vocabulary_item(id: &str) -> LearningItem {
        LearningItem {
            id: id.to_string(),
            english_text: "apple".to_string(),
            korean_text: "사과".to_string(),
            level: Level::Beginner,
            category: None,
            item_type: ItemType::Vocabulary,
            stage: 1,
        }
    }

    /// Store whose every call fails
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> LexiResult<Option<String>> {
            Err(LexiError::InvalidValue("storage unavailable".to_string()))
        }

        fn set(&mut self, _key: &str, _value: &str) -> LexiResult<()> {
            Err(LexiError::InvalidValue("storage unavailable".to_string()))
        }

        fn remove(&mut self, _key: &str) -> LexiResult<()> {
            Err(LexiError::InvalidValue("storage unavailable".to_string()))
        }
    }

    #[test]
    fn test_three_misses_promote_once() {
        let mut service = service();
        let item = vocabulary_item("X");

        let mut promoted = Vec::new();
        for _ in 0..3 {
            let result = service.score_pronunciation("", &item.english_text);
            assert!(!result.passed(70));
            promoted.push(service.record_attempt(&item, &result).promoted_to_notes);
        }
        assert_eq!(promoted, vec![false, false, true]);

        let notes = service.visible_wrong_answers(Some(ItemType::Vocabulary));
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].miss_count, 3);
        assert_eq!(service.practice_history().len(), 3);
    }

    #[test]
    fn test_pass_clears_miss_history() {
        let mut service = service();
        let item = vocabulary_item("X");

        let miss = service.score_pronunciation("banana", "apple");
        service.record_attempt(&item, &miss);
        assert_eq!(service.miss_count(&AnswerKey::for_item(&item)), 1);

        let hit = service.score_pronunciation("apple", "apple");
        let outcome = service.record_attempt(&item, &hit);
        assert!(outcome.passed);
        assert!(outcome.should_advance);
        assert_eq!(outcome.miss_count, 0);
    }

    #[test]
    fn test_state_survives_reopen() {
        let mut service = service();
        let item = vocabulary_item("X");
        for _ in 0..3 {
            let result = service.score_pronunciation("", "apple");
            service.record_attempt(&item, &result);
        }
        service
            .complete_stage(Level::Beginner, "daily_conversation", 1, 90, ItemType::Expression)
            .unwrap();

        let store = service.store().clone();
        let reopened = LearningService::open(LexiConfig::default(), store);
        assert_eq!(reopened.visible_wrong_answers(None).len(), 1);
        assert_eq!(reopened.practice_history().len(), 3);
        let stage2 = reopened
            .stage_state(Level::Beginner, "daily_conversation", 2, ItemType::Expression)
            .unwrap();
        assert!(stage2.is_unlocked);
    }

    #[test]
    fn test_malformed_storage_falls_back_to_defaults() {
        let mut store = MemoryStore::new();
        store.set(WRONG_ANSWERS_KEY, "{ definitely not json").unwrap();
        store.set(STAGE_PROGRESS_KEY, "42").unwrap();

        let service = LearningService::open(LexiConfig::default(), store);
        assert!(service.visible_wrong_answers(None).is_empty());
        let stage1 = service
            .stage_state(Level::Beginner, "daily_conversation", 1, ItemType::Expression)
            .unwrap();
        assert!(stage1.is_unlocked);
    }

    #[test]
    fn test_broken_store_does_not_interrupt_session() {
        let mut service = LearningService::open(LexiConfig::default(), BrokenStore);
        let item = vocabulary_item("X");
        let result = service.score_pronunciation("", "apple");
        let outcome = service.record_attempt(&item, &result);

        assert!(!outcome.passed);
        assert_eq!(outcome.miss_count, 1);
        assert!(service.save().is_err());
    }

    #[test]
    fn test_stage_session_completes_stage() {
        let curriculum = parse_csv_str(CURRICULUM).unwrap();
        let mut service = service();

        service
            .start_stage_session(&curriculum, Level::Beginner, "daily_conversation", 1, ItemType::Expression)
            .unwrap();

        loop {
            let item = service.session().and_then(|s| s.current_item()).cloned().unwrap();
            let result = service.score_pronunciation(&item.english_text, &item.english_text);
            let outcome = service.record_attempt(&item, &result);
            assert_eq!(outcome.attempts_on_item, 1);
            assert!(outcome.should_advance);
            if !service.advance_session().unwrap() {
                break;
            }
        }

        let summary = service.finish_session().unwrap();
        assert!(summary.stage_completed);
        assert_eq!(summary.passed_count, 2);
        assert!(summary.average_score >= 97);

        let stage1 = service
            .stage_state(Level::Beginner, "daily_conversation", 1, ItemType::Expression)
            .unwrap();
        assert!(stage1.is_completed);
        assert_eq!(stage1.score, summary.average_score);
        assert!(service
            .stage_state(Level::Beginner, "daily_conversation", 2, ItemType::Expression)
            .unwrap()
            .is_unlocked);
        assert!(!service
            .stage_state(Level::Beginner, "daily_conversation", 2, ItemType::Vocabulary)
            .unwrap()
            .is_unlocked);
    }

    #[test]
    fn test_stage_session_out_of_attempts_and_early_finish() {
        let curriculum = parse_csv_str(CURRICULUM).unwrap();
        let mut service = service();
        service
            .start_stage_session(&curriculum, Level::Beginner, "daily_conversation", 1, ItemType::Expression)
            .unwrap();

        let item = service.session().and_then(|s| s.current_item()).cloned().unwrap();
        let mut last = None;
        for _ in 0..3 {
            let result = service.score_pronunciation("", &item.english_text);
            last = Some(service.record_attempt(&item, &result));
        }
        let last = last.unwrap();
        assert_eq!(last.attempts_on_item, 3);
        assert!(!last.should_advance);
        assert!(last.auto_advanced);
        assert!(last.promoted_to_notes);
        assert_eq!(service.session().unwrap().current_index(), 1);

        // leaving before the last item does not complete the stage
        let summary = service.finish_session().unwrap();
        assert!(!summary.stage_completed);
        assert!(!summary.reached_end);
        assert!(matches!(service.finish_session(), Err(LexiError::NoActiveSession)));
    }

    #[test]
    fn test_locked_stage_session_rejected() {
        let curriculum = parse_csv_str(CURRICULUM).unwrap();
        let mut service = service();
        let err = service
            .start_stage_session(&curriculum, Level::Beginner, "daily_conversation", 2, ItemType::Expression)
            .unwrap_err();
        assert!(matches!(err, LexiError::StageLocked(_)));

        // unlocked but no items in the curriculum
        let err = service
            .start_stage_session(&curriculum, Level::Advanced, "daily_conversation", 1, ItemType::Expression)
            .unwrap_err();
        assert!(matches!(err, LexiError::EmptySession));
    }

    #[test]
    fn test_review_session_never_completes_stage() {
        let mut service = service();
        let item = vocabulary_item("X");
        for _ in 0..3 {
            let result = service.score_pronunciation("", "apple");
            service.record_attempt(&item, &result);
        }

        service.start_review_session(Some(ItemType::Vocabulary)).unwrap();
        let current = service.session().and_then(|s| s.current_item()).cloned().unwrap();
        assert_eq!(current.id, "X");

        for _ in 0..4 {
            let result = service.score_pronunciation("", "apple");
            let outcome = service.record_attempt(&current, &result);
            assert!(!outcome.should_advance);
            assert!(!outcome.auto_advanced);
        }
        let result = service.score_pronunciation("apple", "apple");
        assert!(service.record_attempt(&current, &result).passed);
        assert!(service.visible_wrong_answers(None).is_empty());

        assert!(!service.advance_session().unwrap());
        let summary = service.finish_session().unwrap();
        assert_eq!(summary.mode, SessionMode::Review);
        assert!(!summary.stage_completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_and_errors_are_not_scored() {
        let mut service = service();
        let item = vocabulary_item("X");
        let mut recognition = service.recognition_session(ScriptedRecognizer::new(vec![
            None,
            Some(Err(RecognitionErrorKind::NoSpeech)),
            Some(Ok("apple".to_string())),
        ]));

        let timeout = service.listen_and_score(&mut recognition, &item).await.unwrap_err();
        assert!(matches!(timeout, RecognitionError::Timeout(_)));
        let no_speech = service.listen_and_score(&mut recognition, &item).await.unwrap_err();
        assert_eq!(no_speech, RecognitionError::Platform(RecognitionErrorKind::NoSpeech));

        assert!(service.practice_history().is_empty());
        assert_eq!(service.miss_count(&AnswerKey::for_item(&item)), 0);

        let report = service.listen_and_score(&mut recognition, &item).await.unwrap();
        assert_eq!(report.transcript, "apple");
        assert!(report.outcome.passed);
        assert_eq!(service.practice_history().len(), 1);
    }

    #[test]
    fn test_reset_all() {
        let mut service = service();
        service
            .complete_stage(Level::Beginner, "daily_conversation", 1, 80, ItemType::Expression)
            .unwrap();
        let item = vocabulary_item("X");
        let result = service.score_pronunciation("", "apple");
        service.record_attempt(&item, &result);

        assert!(service.store().get(STAGE_PROGRESS_KEY).unwrap().is_some());

        service.reset_all();
        assert_eq!(service.stages().completed_count(), 0);
        assert!(service.practice_history().is_empty());
        assert_eq!(service.miss_count(&AnswerKey::for_item(&item)), 0);
        assert_eq!(service.wrong_answer_stats().total, 0);
        for key in [WRONG_ANSWERS_KEY, STAGE_PROGRESS_KEY, SPEAKING_HISTORY_KEY] {
            assert_eq!(service.store().get(key).unwrap(), None);
        }

        let reopened = LearningService::open(LexiConfig::default(), service.store().clone());
        assert_eq!(reopened.stages().completed_count(), 0);
    }

    #[test]
    fn test_touch_wrong_answer_is_persisted() {
        let mut service = service();
        let item = vocabulary_item("X");
        for _ in 0..3 {
            let result = service.score_pronunciation("", "apple");
            service.record_attempt(&item, &result);
        }
        let key = AnswerKey::for_item(&item);

        assert!(service.touch_wrong_answer(&key));
        assert!(!service.touch_wrong_answer(&AnswerKey::new(ItemType::Vocabulary, "missing")));

        let reopened = LearningService::open(LexiConfig::default(), service.store().clone());
        let notes = reopened.visible_wrong_answers(None);
        assert_eq!(notes[0].total_attempts, 4);
        assert_eq!(notes[0].miss_count, 3);
    }
}
