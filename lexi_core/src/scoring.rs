//! Pronunciation scoring built on phrase similarity
//!
//! Sub-scores carry a small amount of random jitter to mimic assessment noise.
//! The random source is always passed in, so callers own determinism.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::fuzzy::combined_similarity;

/// Lowest accuracy ever reported
pub const ACCURACY_FLOOR: f64 = 50.0;
/// Lowest fluency and pronunciation ever reported
pub const SUB_SCORE_FLOOR: f64 = 45.0;

/// Message language for feedback tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackLocale {
    #[default]
    Korean,
    English,
}

/// Feedback ladder, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTier {
    Excellent,
    Great,
    Good,
    Fair,
    KeepPracticing,
    DontGiveUp,
}

impl FeedbackTier {
    pub fn for_score(overall: u8) -> Self {
        match overall {
            90.. => FeedbackTier::Excellent,
            80..=89 => FeedbackTier::Great,
            70..=79 => FeedbackTier::Good,
            60..=69 => FeedbackTier::Fair,
            50..=59 => FeedbackTier::KeepPracticing,
            _ => FeedbackTier::DontGiveUp,
        }
    }

    pub fn message(self, locale: FeedbackLocale) -> &'static str {
        match (locale, self) {
            (FeedbackLocale::Korean, FeedbackTier::Excellent) => "🎉 완벽해요! 발음이 정말 훌륭합니다!",
            (FeedbackLocale::Korean, FeedbackTier::Great) => "👏 잘했어요! 발음이 매우 좋습니다!",
            (FeedbackLocale::Korean, FeedbackTier::Good) => "👍 좋아요! 조금만 더 연습하면 완벽할 거예요!",
            (FeedbackLocale::Korean, FeedbackTier::Fair) => "💪 괜찮아요! 조금 더 천천히 발음해보세요!",
            (FeedbackLocale::Korean, FeedbackTier::KeepPracticing) => {
                "🌟 계속 연습해보세요! 오디오를 다시 들어보고 따라해보세요!"
            }
            (FeedbackLocale::Korean, FeedbackTier::DontGiveUp) => "💫 포기하지 마세요! 천천히 다시 시도해보세요!",
            (FeedbackLocale::English, FeedbackTier::Excellent) => {
                "Excellent pronunciation! You're speaking very clearly and naturally."
            }
            (FeedbackLocale::English, FeedbackTier::Great) => {
                "Good job! Your pronunciation is clear with minor improvements needed."
            }
            (FeedbackLocale::English, FeedbackTier::Good) => {
                "Not bad! Keep practicing to improve your pronunciation and fluency."
            }
            (FeedbackLocale::English, FeedbackTier::Fair) => {
                "Keep practicing! Focus on clear pronunciation and natural rhythm."
            }
            (FeedbackLocale::English, FeedbackTier::KeepPracticing) => {
                "Listen to the audio again and try to follow along."
            }
            (FeedbackLocale::English, FeedbackTier::DontGiveUp) => {
                "Don't give up! Practice more to improve your speaking skills."
            }
        }
    }
}

/// Outcome of a single scored pronunciation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationResult {
    pub accuracy: u8,
    pub fluency: u8,
    pub pronunciation: u8,
    pub overall_score: u8,
    pub feedback_tier: FeedbackTier,
    pub feedback_message: String,
    pub timestamp: DateTime<Utc>,
}

impl PronunciationResult {
    pub fn passed(&self, pass_threshold: u8) -> bool {
        self.overall_score >= pass_threshold
    }

    /// Name of the weakest sub-score, used as the mistake reason for a miss
    pub fn weakest_area(&self) -> &'static str {
        if self.accuracy <= self.fluency && self.accuracy <= self.pronunciation {
            "accuracy"
        } else if self.fluency <= self.pronunciation {
            "fluency"
        } else {
            "pronunciation"
        }
    }
}

/// Accuracy before the floor: similarity as a percentage plus one bonus tier
fn raw_accuracy(similarity: f64) -> f64 {
    let raw = similarity.clamp(0.0, 1.0) * 100.0;
    let bonus = if similarity >= 0.8 {
        15.0
    } else if similarity >= 0.6 {
        10.0
    } else if similarity >= 0.4 {
        5.0
    } else {
        0.0
    };

    (raw + bonus).min(100.0)
}

fn jittered<R: Rng + ?Sized>(accuracy: f64, spread: f64, rng: &mut R) -> f64 {
    let jitter = (rng.gen::<f64>() - 0.3) * spread;
    (accuracy + jitter).clamp(SUB_SCORE_FLOOR, 100.0)
}

/// Map a combined similarity in `[0, 1]` to a full result
pub fn score_similarity<R: Rng + ?Sized>(
    similarity: f64,
    locale: FeedbackLocale,
    rng: &mut R,
) -> PronunciationResult {
    // jitter applies to the unfloored accuracy
    let raw = raw_accuracy(similarity);
    let fluency = jittered(raw, 15.0, rng);
    let pronunciation = jittered(raw, 12.0, rng);
    let accuracy = raw.max(ACCURACY_FLOOR);

    let overall = (0.5 * accuracy + 0.25 * fluency + 0.25 * pronunciation)
        .min(100.0)
        .round() as u8;
    let feedback_tier = FeedbackTier::for_score(overall);

    PronunciationResult {
        accuracy: accuracy.round() as u8,
        fluency: fluency.round() as u8,
        pronunciation: pronunciation.round() as u8,
        overall_score: overall,
        feedback_tier,
        feedback_message: feedback_tier.message(locale).to_string(),
        timestamp: Utc::now(),
    }
}

/// Score a recognized transcript against the target text
pub fn score_pronunciation<R: Rng + ?Sized>(
    recognized: &str,
    target: &str,
    locale: FeedbackLocale,
    rng: &mut R,
) -> PronunciationResult {
    let similarity = combined_similarity(recognized, target);
    score_similarity(similarity, locale, rng)
}
