//! Streaming speech recognition.
//!
//! [`Recognizer`] opens [`RecognitionSession`]s; the transcription
//! supervisor drives one session at a time.

pub mod mock;
pub mod protocol;
pub mod session;
pub mod websocket;

pub use mock::{ScriptedRecognizer, SessionScript};
pub use session::{
    EouSensitivity, RecognitionConfig, RecognitionSession, Recognizer, SessionError,
};
pub use websocket::WebSocketRecognizer;
