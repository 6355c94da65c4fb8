//! Voice processing module
//!
//! Audio capture, wake phrase detection, transcription, synthesis, and
//! playback. The orchestrator consumes these only through the collaborator
//! traits.

mod capture;
mod playback;
mod stt;
mod tts;
mod wake_word;

pub use capture::{AudioCapture, CaptureBuffer, MicListener, SAMPLE_RATE, samples_to_wav};
pub use playback::{AudioPlayback, wav_to_samples};
pub use stt::WhisperServer;
pub use tts::{PiperClient, PiperSpeaker};
pub use wake_word::{DetectorState, WakeWordDetector, rms_energy, watch_for_wake_phrase};
