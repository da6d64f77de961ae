//! Timeout-guarded speech recognition
//!
//! The platform recognizer is abstracted behind [`SpeechRecognizer`]. A
//! [`RecognitionSession`] keeps at most one capture in flight, aborts it when the
//! time budget runs out, and reports timeouts separately from platform errors.
//! None of the failures produce a transcript, so none of them get scored.

use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time;

pub const DEFAULT_RECOGNITION_TIMEOUT: Duration = Duration::from_millis(4000);

/// Final transcript or platform error for one capture
pub type RecognitionReply = Result<String, RecognitionErrorKind>;

/// Error codes reported by the platform recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    AudioCapture,
    NotAllowed,
    Network,
    Aborted,
    Other(String),
}

impl RecognitionErrorKind {
    /// Map a platform error code such as `"no-speech"`
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => RecognitionErrorKind::NoSpeech,
            "audio-capture" => RecognitionErrorKind::AudioCapture,
            "not-allowed" | "service-not-allowed" => RecognitionErrorKind::NotAllowed,
            "network" => RecognitionErrorKind::Network,
            "aborted" => RecognitionErrorKind::Aborted,
            other => RecognitionErrorKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionErrorKind::NoSpeech => write!(f, "no speech detected, please try again"),
            RecognitionErrorKind::AudioCapture => write!(f, "microphone capture failed, please try again"),
            RecognitionErrorKind::NotAllowed => write!(f, "microphone permission was not granted"),
            RecognitionErrorKind::Network => write!(f, "network error, check your connection"),
            RecognitionErrorKind::Aborted => write!(f, "recognition aborted"),
            RecognitionErrorKind::Other(code) => write!(f, "recognition error: {}", code),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("no transcript within {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("{0}")]
    Platform(RecognitionErrorKind),

    #[error("speech recognition is not supported on this platform")]
    Unsupported,

    #[error("failed to start speech recognition: {0}")]
    StartFailed(String),
}

impl RecognitionError {
    /// Intentional cancellations are not shown to the learner
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, RecognitionError::Platform(RecognitionErrorKind::Aborted))
    }
}

/// Platform speech-to-text capability
pub trait SpeechRecognizer {
    fn is_supported(&self) -> bool;

    /// Begin a single-utterance capture; the receiver yields its outcome
    fn start(&mut self) -> Result<oneshot::Receiver<RecognitionReply>, RecognitionError>;

    /// Cancel the capture in flight, if any
    fn abort(&mut self);
}

pub struct RecognitionSession<R> {
    recognizer: R,
    timeout: Duration,
    listening: bool,
}

impl<R: SpeechRecognizer> RecognitionSession<R> {
    pub fn new(recognizer: R) -> Self {
        Self::with_timeout(recognizer, DEFAULT_RECOGNITION_TIMEOUT)
    }

    pub fn with_timeout(recognizer: R, timeout: Duration) -> Self {
        Self {
            recognizer,
            timeout,
            listening: false,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_supported()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    pub fn recognizer_mut(&mut self) -> &mut R {
        &mut self.recognizer
    }

    /// Capture one utterance and return its trimmed transcript
    ///
    /// A capture left running by a dropped `listen` future is aborted first.
    pub async fn listen(&mut self) -> Result<String, RecognitionError> {
        if !self.recognizer.is_supported() {
            return Err(RecognitionError::Unsupported);
        }
        if self.listening {
            debug!("Stopping recognition still in flight before starting a new one");
            self.stop();
        }

        let reply = self.recognizer.start()?;
        self.listening = true;
        let outcome = time::timeout(self.timeout, reply).await;
        self.listening = false;

        match outcome {
            Err(_) => {
                self.recognizer.abort();
                warn!("Speech recognition timed out after {:?}", self.timeout);
                Err(RecognitionError::Timeout(self.timeout))
            }
            // recognizer dropped the sender without answering
            Ok(Err(_)) => Err(RecognitionError::Platform(RecognitionErrorKind::Aborted)),
            Ok(Ok(Err(kind))) => {
                if kind == RecognitionErrorKind::Aborted {
                    debug!("Speech recognition was aborted");
                } else {
                    warn!("Speech recognition error: {}", kind);
                }
                Err(RecognitionError::Platform(kind))
            }
            Ok(Ok(Ok(transcript))) => {
                let transcript = transcript.trim();
                if transcript.is_empty() {
                    return Err(RecognitionError::Platform(RecognitionErrorKind::NoSpeech));
                }
                Ok(transcript.to_string())
            }
        }
    }

    /// Abort the active capture; a no-op when idle
    pub fn stop(&mut self) {
        if self.listening {
            self.recognizer.abort();
            self.listening = false;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRecognizer;
    use super::*;

    #[tokio::test]
    async fn test_transcript_is_trimmed() {
        let recognizer = ScriptedRecognizer::new(vec![Some(Ok("  how are you  ".to_string()))]);
        let mut session = RecognitionSession::new(recognizer);
        assert_eq!(session.listen().await.unwrap(), "how are you");
        assert!(!session.is_listening());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_capture() {
        let mut session = RecognitionSession::new(ScriptedRecognizer::new(vec![None]));
        let err = session.listen().await.unwrap_err();

        assert_eq!(err, RecognitionError::Timeout(DEFAULT_RECOGNITION_TIMEOUT));
        assert!(err.is_user_visible());
        assert_eq!(session.recognizer().aborts, 1);
        assert!(!session.is_listening());
    }

    #[tokio::test]
    async fn test_platform_errors_surface() {
        let recognizer = ScriptedRecognizer::new(vec![
            Some(Err(RecognitionErrorKind::NotAllowed)),
            Some(Err(RecognitionErrorKind::Aborted)),
            Some(Ok("   ".to_string())),
        ]);
        let mut session = RecognitionSession::new(recognizer);

        let denied = session.listen().await.unwrap_err();
        assert_eq!(denied, RecognitionError::Platform(RecognitionErrorKind::NotAllowed));
        assert!(denied.is_user_visible());

        let aborted = session.listen().await.unwrap_err();
        assert!(!aborted.is_user_visible());

        let silent = session.listen().await.unwrap_err();
        assert_eq!(silent, RecognitionError::Platform(RecognitionErrorKind::NoSpeech));
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let mut recognizer = ScriptedRecognizer::new(vec![]);
        recognizer.supported = false;
        let mut session = RecognitionSession::new(recognizer);
        assert_eq!(session.listen().await.unwrap_err(), RecognitionError::Unsupported);
        assert_eq!(session.recognizer().starts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_listen_aborts_capture_left_in_flight() {
        let recognizer = ScriptedRecognizer::new(vec![None, Some(Ok("hello".to_string()))]);
        let mut session = RecognitionSession::new(recognizer);

        // the caller gives up early and drops the first capture mid-flight
        let abandoned = time::timeout(Duration::from_millis(10), session.listen()).await;
        assert!(abandoned.is_err());
        assert!(session.is_listening());

        assert_eq!(session.listen().await.unwrap(), "hello");
        assert_eq!(session.recognizer().starts, 2);
        assert_eq!(session.recognizer().aborts, 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut session = RecognitionSession::new(ScriptedRecognizer::new(vec![]));
        session.stop();
        session.stop();
        assert_eq!(session.recognizer().aborts, 0);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(RecognitionErrorKind::from_code("no-speech"), RecognitionErrorKind::NoSpeech);
        assert_eq!(RecognitionErrorKind::from_code("network"), RecognitionErrorKind::Network);
        assert_eq!(
            RecognitionErrorKind::from_code("bad-grammar"),
            RecognitionErrorKind::Other("bad-grammar".to_string())
        );
    }
}
