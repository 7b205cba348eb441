//! Turn-taking core: the five-state machine, transcript buffer, silence
//! timer, cancellation signals, sentence segmenter, adaptive debounce
//! controller, telemetry, and the [`controller::TurnController`]
//! orchestrator that wires them together (spec §4).

pub mod audio_buffer;
pub mod controller;
pub mod debounce_controller;
pub mod sentence_segmenter;
pub mod silence_timer;
pub mod state_machine;
pub mod telemetry;
pub mod transcript_buffer;

pub use audio_buffer::AudioInboundBuffer;
pub use controller::{ChannelSink, ClientSink, TurnController, TurnControllerConfig, TurnControllerDeps};
pub use debounce_controller::{contains_correction_marker, AdaptiveDebounceController};
pub use sentence_segmenter::SentenceSegmenter;
pub use silence_timer::{SilenceTimer, TimerOutcome, TimerState};
pub use state_machine::{EntryHook, Trigger, TurnState};
pub use telemetry::TelemetryTracker;
pub use transcript_buffer::TranscriptBuffer;
