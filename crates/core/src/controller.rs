//! TurnController (C11) — the per-session orchestrator that wires the
//! state machine, transcript buffer, silence timer, cancellation
//! signals, sentence segmenter, and adaptive debounce controller to the
//! STT/LLM/TTS/RAG adapters and the client channel (spec §4.7).
//!
//! All mutable turn state lives behind one `tokio::sync::Mutex` per
//! session, matching spec §4's "serialize everything through a single
//! session-scoped guard" guidance. Background work (the speculative
//! LLM/RAG call, the silence timer, the TTS pump) runs on spawned tasks
//! that call back into `&Arc<TurnController>` entry points, each of
//! which re-acquires the lock and re-validates the episode it was
//! spawned for before touching shared state — a stale task from a
//! canceled episode is a no-op, never a bug.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use voice_domain::config::Config;
use voice_domain::{CancelToken, Message, Result};
use voice_protocol::client::SettingsPatch;
use voice_protocol::server::{ServerMessage, WireState};
use voice_providers::{
    LlmAdapter, LlmEvent, RagRetriever, Snippet, SttAdapter, SttEvent, SttSession, TtsAdapter,
};
use voice_sessions::turn_record::{StateTransitionLogEntry, TurnLatencies, TurnOutcome, TurnRecord};
use voice_sessions::store::TurnStore;

use crate::audio_buffer::AudioInboundBuffer;
use crate::debounce_controller::{contains_correction_marker, AdaptiveDebounceController};
use crate::sentence_segmenter::SentenceSegmenter;
use crate::silence_timer::{SilenceTimer, TimerOutcome};
use crate::state_machine::{Trigger, TurnState};
use crate::telemetry::TelemetryTracker;
use crate::transcript_buffer::TranscriptBuffer;

/// Where a `TurnController` sends outbound protocol messages. The
/// gateway implements this over the WebSocket write half so the
/// orchestration logic here stays transport-agnostic and unit-testable.
#[async_trait]
pub trait ClientSink: Send + Sync {
    async fn send(&self, message: ServerMessage);
}

/// A [`ClientSink`] backed by a bounded channel. `send` suspends the
/// caller when the channel is full rather than dropping — the
/// backpressure policy from spec §5 ("producer suspends, never drops").
pub struct ChannelSink {
    tx: mpsc::Sender<ServerMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ClientSink for ChannelSink {
    async fn send(&self, message: ServerMessage) {
        if self.tx.send(message).await.is_err() {
            // Receiver half (the socket writer) is gone; the connection
            // is already torn down, nothing left to deliver to.
        }
    }
}

/// The subset of [`Config`] the controller needs at construction time,
/// collected from the relevant per-concern sub-structs.
#[derive(Debug, Clone)]
pub struct TurnControllerConfig {
    pub debounce: voice_domain::config::DebounceConfig,
    pub rag_enabled: bool,
    pub rag_timeout: Duration,
    pub rag_top_k: usize,
    pub playback_watchdog: Duration,
    pub telemetry_every_n_turns: u64,
    pub rolling_window: usize,
    pub default_voice_id: String,
    pub default_llm_model: String,
    pub system_prompt: String,
    pub audio_buffer_capacity_bytes: usize,
}

impl TurnControllerConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            debounce: cfg.debounce.clone(),
            rag_enabled: cfg.rag.enabled,
            rag_timeout: Duration::from_millis(cfg.rag.timeout_ms),
            rag_top_k: cfg.rag.top_k,
            playback_watchdog: Duration::from_millis(cfg.tts.playback_watchdog_ms),
            telemetry_every_n_turns: cfg.session.telemetry_every_n_turns as u64,
            rolling_window: cfg.session.rolling_window,
            default_voice_id: cfg.tts.default_voice_id.clone(),
            default_llm_model: cfg.llm.default_model.clone(),
            system_prompt: "You are a helpful, concise voice assistant.".to_string(),
            audio_buffer_capacity_bytes: cfg.audio.buffer_capacity_bytes(),
        }
    }
}

/// Construction arguments for [`TurnController::new`].
pub struct TurnControllerDeps {
    pub session_id: String,
    pub sample_rate_hz: u32,
    pub config: TurnControllerConfig,
    pub stt: Arc<dyn SttAdapter>,
    pub llm: Arc<dyn LlmAdapter>,
    pub tts: Arc<dyn TtsAdapter>,
    pub rag: Option<Arc<dyn RagRetriever>>,
    pub store: Option<Arc<TurnStore>>,
    pub sink: Arc<dyn ClientSink>,
}

/// Runtime-mutable per-session settings (spec §6.1 `update_settings`).
struct RuntimeSettings {
    cancellation_threshold: f64,
    voice_id: String,
    llm_model: String,
    correction_markers: Vec<String>,
}

/// Everything the controller mutates while handling one session.
///
/// Fields split into two lifetimes: *turn-scoped* fields persist across
/// repeated LISTENING↔SPECULATIVE cycles within one logical turn (the
/// [`crate::state_machine`] Turn entity, closed only at IDLE or a
/// terminal error), while *episode-scoped* fields are reset every time
/// the controller (re)enters SPECULATIVE. See DESIGN.md for why the
/// adaptive debounce controller is fed at episode granularity while
/// `turn_complete`/telemetry fire at turn granularity.
struct SessionState {
    turn_state: TurnState,
    settings: RuntimeSettings,

    // Turn-scoped.
    turn_id: Option<String>,
    started_at: Option<chrono::DateTime<Utc>>,
    transcript: TranscriptBuffer,
    state_log: Vec<StateTransitionLogEntry>,
    was_interrupted: bool,
    tokens_wasted: u64,
    tokens_prompt: u32,
    tokens_completion: u32,
    agent_text: String,
    final_to_first_token_ms: Option<u64>,
    final_to_first_audio_ms: Option<u64>,
    final_received_at: Option<Instant>,

    // Episode-scoped (one speculative attempt).
    episode_seq: u64,
    llm_cancel: Option<CancelToken>,
    tts_cancel: Option<CancelToken>,
    hold_buffer: Vec<String>,
    tts_tx: Option<mpsc::UnboundedSender<String>>,
    chunk_index: Arc<AtomicU32>,
    first_chunk_sent: Arc<AtomicBool>,
    timer: Option<Arc<SilenceTimer>>,
    llm_finished: bool,
}

impl SessionState {
    fn new(config: &TurnControllerConfig) -> Self {
        Self {
            turn_state: TurnState::Idle,
            settings: RuntimeSettings {
                cancellation_threshold: 0.30,
                voice_id: config.default_voice_id.clone(),
                llm_model: config.default_llm_model.clone(),
                correction_markers: config.debounce.correction_markers.clone(),
            },
            turn_id: None,
            started_at: None,
            transcript: TranscriptBuffer::new(),
            state_log: Vec::new(),
            was_interrupted: false,
            tokens_wasted: 0,
            tokens_prompt: 0,
            tokens_completion: 0,
            agent_text: String::new(),
            final_to_first_token_ms: None,
            final_to_first_audio_ms: None,
            final_received_at: None,
            episode_seq: 0,
            llm_cancel: None,
            tts_cancel: None,
            hold_buffer: Vec::new(),
            tts_tx: None,
            chunk_index: Arc::new(AtomicU32::new(0)),
            first_chunk_sent: Arc::new(AtomicBool::new(false)),
            timer: None,
            llm_finished: false,
        }
    }
}

fn wire_state(state: TurnState) -> WireState {
    match state {
        TurnState::Idle => WireState::Idle,
        TurnState::Listening => WireState::Listening,
        TurnState::Speculative => WireState::Speculative,
        TurnState::Committed => WireState::Committed,
        TurnState::Speaking => WireState::Speaking,
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn base_messages(system_prompt: &str, user_text: &str) -> Vec<Message> {
    vec![
        Message::system(system_prompt.to_string()),
        Message::user(user_text.to_string()),
    ]
}

fn base_messages_with_rag(system_prompt: &str, user_text: &str, snippets: &[Snippet]) -> Vec<Message> {
    let mut context = String::from("Relevant context, ranked by relevance:\n");
    for snippet in snippets {
        context.push_str(&format!("- {} (score {:.2})\n", snippet.text, snippet.score));
    }
    vec![
        Message::system(system_prompt.to_string()),
        Message::system(context),
        Message::user(user_text.to_string()),
    ]
}

pub struct TurnController {
    session_id: String,
    config: TurnControllerConfig,
    sink: Arc<dyn ClientSink>,
    stt_session: Arc<dyn SttSession>,
    llm: Arc<dyn LlmAdapter>,
    tts: Arc<dyn TtsAdapter>,
    rag: Option<Arc<dyn RagRetriever>>,
    store: Option<Arc<TurnStore>>,
    debounce_ctrl: Arc<AdaptiveDebounceController>,
    telemetry: Arc<TelemetryTracker>,
    audio_buffer: AudioInboundBuffer,
    state: Mutex<SessionState>,
}

impl TurnController {
    /// Open the STT session, build the controller, and spawn the
    /// background STT event pump. Returns an `Arc` since every
    /// subsequent entry point is driven by spawned tasks that need to
    /// clone a handle to call back in.
    pub async fn new(deps: TurnControllerDeps) -> Result<Arc<Self>> {
        let stt_session = deps.stt.open(deps.sample_rate_hz).await?;
        let debounce_ctrl = Arc::new(AdaptiveDebounceController::new(
            deps.config.debounce.clone(),
            deps.config.rolling_window,
        ));
        let telemetry = Arc::new(TelemetryTracker::new(deps.config.telemetry_every_n_turns));
        let audio_buffer = AudioInboundBuffer::new(deps.config.audio_buffer_capacity_bytes);
        let state = Mutex::new(SessionState::new(&deps.config));

        let controller = Arc::new(Self {
            session_id: deps.session_id,
            config: deps.config,
            sink: deps.sink,
            stt_session,
            llm: deps.llm,
            tts: deps.tts,
            rag: deps.rag,
            store: deps.store,
            debounce_ctrl,
            telemetry,
            audio_buffer,
            state,
        });

        let ctrl = controller.clone();
        let mut events = ctrl.stt_session.events();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    Ok(ev) => ctrl.dispatch_stt_event(ev).await,
                    Err(e) => {
                        warn!(session_id = %ctrl.session_id, error = %e, "STT event stream error");
                        ctrl.sink.send(ServerMessage::from_error(&e, now_ms())).await;
                    }
                }
            }
        });

        let ctrl = controller.clone();
        tokio::spawn(async move {
            loop {
                ctrl.audio_buffer.wait_for_frame().await;
                if ctrl.audio_buffer.is_closed() {
                    break;
                }
                while let Some(frame) = ctrl.audio_buffer.pop_front() {
                    if let Err(e) = ctrl.stt_session.send(frame).await {
                        warn!(session_id = %ctrl.session_id, error = %e, "failed to forward audio frame to STT");
                        break;
                    }
                }
            }
        });

        Ok(controller)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ctrl.current_ms()
    }

    async fn dispatch_stt_event(self: &Arc<Self>, event: SttEvent) {
        match event {
            SttEvent::Partial { text, confidence } => self.on_partial(text, confidence).await,
            SttEvent::Final { text, confidence } => self.on_final(text, confidence).await,
            SttEvent::Endpoint => {}
            SttEvent::Error { message, recoverable } => {
                self.sink
                    .send(ServerMessage::Error {
                        code: "STT_ERROR".to_string(),
                        message,
                        recoverable,
                        timestamp: now_ms(),
                    })
                    .await;
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Public entry points (spec §4.7.1)
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn on_audio_frame(self: &Arc<Self>, frame: Vec<u8>) {
        {
            let mut state = self.state.lock().await;
            match state.turn_state {
                TurnState::Speaking | TurnState::Committed => {
                    self.force_barge_in(&mut state).await;
                }
                TurnState::Speculative => {
                    self.cancel_episode_silently(&mut state, "new_audio").await;
                }
                TurnState::Idle => {
                    if let Ok((to, _)) = state.turn_state.transition(Trigger::FirstAudioFrame) {
                        self.apply_transition(&mut state, to).await;
                    }
                }
                TurnState::Listening => {}
            }
        }

        let evicted = self.audio_buffer.push(frame);
        if evicted > 0 {
            warn!(
                session_id = %self.session_id,
                dropped = evicted,
                total_dropped = self.audio_buffer.dropped_count(),
                "inbound audio buffer overflow, dropping oldest frames"
            );
            self.sink
                .send(ServerMessage::Error {
                    code: "AUDIO_BUFFER_OVERFLOW".to_string(),
                    message: format!("dropped {evicted} oldest audio frame(s) at buffer capacity"),
                    recoverable: true,
                    timestamp: now_ms(),
                })
                .await;
        }
    }

    pub async fn on_partial(self: &Arc<Self>, text: String, confidence: f64) {
        let mut state = self.state.lock().await;
        state.transcript.set_partial(text.clone());
        self.sink
            .send(ServerMessage::TranscriptPartial {
                text: text.clone(),
                confidence,
                timestamp: now_ms(),
            })
            .await;

        if state.turn_state == TurnState::Speculative {
            let reason = if contains_correction_marker(&text, &state.settings.correction_markers) {
                "correction_marker"
            } else {
                "new_partial"
            };
            self.cancel_episode_silently(&mut state, reason).await;
        }
    }

    pub async fn on_final(self: &Arc<Self>, text: String, confidence: f64) {
        let mut state = self.state.lock().await;
        if matches!(state.turn_state, TurnState::Committed | TurnState::Speaking) {
            warn!(session_id = %self.session_id, "dropping final transcript: buffer locked");
            return;
        }

        if state.turn_state == TurnState::Speculative {
            let reason = if contains_correction_marker(&text, &state.settings.correction_markers) {
                "correction_marker"
            } else {
                "new_final"
            };
            self.cancel_episode_silently(&mut state, reason).await;
        }

        if state.turn_id.is_none() {
            state.turn_id = Some(Uuid::new_v4().to_string());
            state.started_at = Some(Utc::now());
        }
        let _ = state.transcript.append_final(text.clone());

        self.sink
            .send(ServerMessage::TranscriptFinal {
                text,
                confidence,
                timestamp: now_ms(),
            })
            .await;

        if state.turn_state == TurnState::Listening {
            self.begin_speculative(&mut state).await;
        }
    }

    pub async fn on_interrupt_message(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        match state.turn_state {
            TurnState::Speaking | TurnState::Committed => self.force_barge_in(&mut state).await,
            TurnState::Speculative => {
                self.cancel_episode_silently(&mut state, "explicit_interrupt").await;
            }
            _ => {}
        }
    }

    pub async fn on_playback_complete(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.turn_state != TurnState::Speaking {
            return;
        }
        let (to, _hook) = match state.turn_state.transition(Trigger::PlaybackComplete) {
            Ok(v) => v,
            Err(_) => return,
        };
        self.apply_transition(&mut state, to).await;
        self.close_turn(&mut state, TurnOutcome::Completed, true).await;
    }

    pub async fn on_settings_update(self: &Arc<Self>, patch: SettingsPatch) {
        let mut state = self.state.lock().await;
        if let Some(ms) = patch.silence_debounce_ms {
            self.debounce_ctrl
                .set_current_ms(ms.clamp(self.config.debounce.min_ms, self.config.debounce.max_ms));
        }
        if let Some(threshold) = patch.cancellation_threshold {
            state.settings.cancellation_threshold = threshold.clamp(0.10, 0.50);
        }
        if let Some(enabled) = patch.adaptive_debounce_enabled {
            self.debounce_ctrl.set_enabled(enabled);
        }
        if let Some(voice_id) = patch.voice_id {
            state.settings.voice_id = voice_id;
        }
        if let Some(model) = patch.llm_model {
            state.settings.llm_model = model;
        }
    }

    pub async fn on_disconnect(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if let Some(cancel) = state.llm_cancel.take() {
            cancel.cancel();
        }
        if let Some(cancel) = state.tts_cancel.take() {
            cancel.cancel();
        }
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.tts_tx = None;

        if state.turn_id.is_some() {
            let outcome = if state.turn_state == TurnState::Speculative {
                TurnOutcome::SpeculativelyCanceled
            } else {
                TurnOutcome::Interrupted
            };
            self.close_turn(&mut state, outcome, false).await;
        }
        drop(state);

        self.audio_buffer.shut_down();
        let _ = self.stt_session.close().await;
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // State transition bookkeeping
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn apply_transition(self: &Arc<Self>, state: &mut SessionState, to: TurnState) {
        let from = state.turn_state;
        state.turn_state = to;
        state.state_log.push(StateTransitionLogEntry {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
            at: Utc::now(),
        });
        self.sink
            .send(ServerMessage::StateChange {
                from_state: wire_state(from),
                to_state: wire_state(to),
                timestamp: now_ms(),
            })
            .await;
    }

    /// Cancel the current speculative episode without surfacing
    /// anything to the client (spec §4.7.2 "silent cancel"). The turn
    /// itself stays open — only the episode's in-flight work is torn
    /// down — and the adaptive debounce controller is fed at this,
    /// episode, granularity (see DESIGN.md).
    async fn cancel_episode_silently(self: &Arc<Self>, state: &mut SessionState, reason: &'static str) {
        if let Some(cancel) = state.llm_cancel.take() {
            cancel.cancel();
        }
        if let Some(cancel) = state.tts_cancel.take() {
            cancel.cancel();
        }
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.tokens_wasted += (state.hold_buffer.len() as u64).max(1);
        state.hold_buffer.clear();
        state.tts_tx = None;

        let (to, _hook) = match state.turn_state.transition(Trigger::NewActivityOrCorrection) {
            Ok(v) => v,
            Err(_) => return,
        };
        self.apply_transition(state, to).await;
        let new_debounce = self.debounce_ctrl.record_turn_outcome(true);
        self.telemetry.record_speculative_cancel();
        info!(
            session_id = %self.session_id,
            reason,
            debounce_ms = new_debounce,
            "speculative episode canceled silently"
        );
    }

    /// Forcibly close the in-progress turn on a barge-in (spec §4.7.4).
    /// Called only from COMMITTED or SPEAKING.
    async fn force_barge_in(self: &Arc<Self>, state: &mut SessionState) {
        if let Some(cancel) = state.llm_cancel.take() {
            cancel.cancel();
        }
        if let Some(cancel) = state.tts_cancel.take() {
            cancel.cancel();
        }
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.hold_buffer.clear();
        state.tts_tx = None;
        state.was_interrupted = true;

        let trigger = match state.turn_state {
            TurnState::Speaking => Trigger::BargeInDuringAudio,
            TurnState::Committed => Trigger::BargeInBeforeAudio,
            _ => return,
        };
        let (to, _hook) = match state.turn_state.transition(trigger) {
            Ok(v) => v,
            Err(_) => return,
        };
        self.apply_transition(state, to).await;

        if let Err(e) = self.stt_session.finalize().await {
            warn!(session_id = %self.session_id, error = %e, "STT finalize failed during barge-in");
        }

        self.close_turn(state, TurnOutcome::Interrupted, true).await;
    }

    /// Enter SPECULATIVE: reset the episode, start the silence timer,
    /// and kick off the speculative LLM(+RAG) call (spec §4.7.2).
    async fn begin_speculative(self: &Arc<Self>, state: &mut SessionState) {
        let (to, _hook) = match state.turn_state.transition(Trigger::SilenceTimerStarted) {
            Ok(v) => v,
            Err(_) => return,
        };

        state.episode_seq += 1;
        let episode_seq = state.episode_seq;
        let llm_cancel = CancelToken::new();
        state.llm_cancel = Some(llm_cancel.clone());
        state.tts_cancel = Some(CancelToken::new());
        state.hold_buffer.clear();
        state.tts_tx = None;
        state.chunk_index = Arc::new(AtomicU32::new(0));
        state.first_chunk_sent = Arc::new(AtomicBool::new(false));
        state.llm_finished = false;
        state.final_received_at = Some(Instant::now());

        let timer = Arc::new(SilenceTimer::new());
        state.timer = Some(timer.clone());
        let duration = Duration::from_millis(self.debounce_ctrl.current_ms());

        self.apply_transition(state, to).await;

        let user_text = state.transcript.complete_text();
        let model = state.settings.llm_model.clone();

        {
            let ctrl = self.clone();
            let timer = timer.clone();
            tokio::spawn(async move {
                if timer.wait(duration).await == TimerOutcome::Fired {
                    ctrl.on_silence_timeout(episode_seq).await;
                }
            });
        }

        {
            let ctrl = self.clone();
            tokio::spawn(async move {
                ctrl.run_speculative(episode_seq, user_text, model, llm_cancel).await;
            });
        }
    }

    /// Fired when the silence timer reaches zero uncanceled: release
    /// the hold buffer to TTS and transition to COMMITTED (spec §4.1
    /// `SilenceTimerFired`, §4.7.3).
    async fn on_silence_timeout(self: &Arc<Self>, episode_seq: u64) {
        let mut state = self.state.lock().await;
        if state.episode_seq != episode_seq || state.turn_state != TurnState::Speculative {
            return;
        }

        let (to, _hook) = match state.turn_state.transition(Trigger::SilenceTimerFired) {
            Ok(v) => v,
            Err(_) => return,
        };
        state.transcript.lock();
        self.apply_transition(&mut state, to).await;
        self.debounce_ctrl.record_turn_outcome(false);
        state.timer = None;

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        for sentence in state.hold_buffer.drain(..) {
            let _ = tx.send(sentence);
        }
        let llm_already_finished = state.llm_finished;
        if llm_already_finished {
            drop(tx);
        } else {
            state.tts_tx = Some(tx);
        }

        let voice_id = state.settings.voice_id.clone();
        let tts_cancel = state.tts_cancel.clone().unwrap_or_default();
        let chunk_index = state.chunk_index.clone();
        let first_chunk_sent = state.first_chunk_sent.clone();
        drop(state);

        let ctrl = self.clone();
        tokio::spawn(async move {
            ctrl.run_tts_pump(episode_seq, rx, tts_cancel, voice_id, chunk_index, first_chunk_sent)
                .await;
        });
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Speculative LLM(+RAG) execution (spec §4.7.2)
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Run one speculative attempt: start the LLM call and, if RAG is
    /// configured, race it against retrieval. If retrieval resolves
    /// before the first token, splice its snippets into the system
    /// prompt and reissue once (Open Question resolution, DESIGN.md
    /// "RAG/LLM parallel start"). Every produced sentence is routed
    /// through [`Self::emit_sentence`], which decides whether it still
    /// belongs in the hold buffer or can stream straight to TTS.
    async fn run_speculative(
        self: Arc<Self>,
        episode_seq: u64,
        user_text: String,
        model: String,
        llm_cancel: CancelToken,
    ) {
        let mut messages = base_messages(&self.config.system_prompt, &user_text);

        let mut rag_fut: std::pin::Pin<Box<dyn std::future::Future<Output = Option<Vec<Snippet>>> + Send>> =
            if let Some(rag) = self.rag.clone().filter(|_| self.config.rag_enabled) {
                let query = user_text.clone();
                let top_k = self.config.rag_top_k;
                let timeout = self.config.rag_timeout;
                Box::pin(async move {
                    tokio::time::timeout(timeout, rag.query(&query, top_k))
                        .await
                        .ok()
                        .and_then(|r| r.ok())
                })
            } else {
                Box::pin(std::future::pending())
            };
        let mut rag_done = self.rag.is_none() || !self.config.rag_enabled;

        let mut stream = match self.llm.stream(messages.clone(), Some(model.clone()), llm_cancel.clone()).await {
            Ok(s) => s,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "LLM stream failed to start");
                self.fail_episode(episode_seq).await;
                return;
            }
        };

        let mut segmenter = SentenceSegmenter::new();
        let mut first_token_seen = false;

        loop {
            if llm_cancel.is_cancelled() {
                return;
            }

            tokio::select! {
                biased;

                snippets = &mut rag_fut, if !rag_done => {
                    rag_done = true;
                    if !first_token_seen {
                        if let Some(snippets) = snippets {
                            if !snippets.is_empty() {
                                messages = base_messages_with_rag(&self.config.system_prompt, &user_text, &snippets);
                                match self.llm.stream(messages.clone(), Some(model.clone()), llm_cancel.clone()).await {
                                    Ok(s) => {
                                        stream = s;
                                        segmenter = SentenceSegmenter::new();
                                    }
                                    Err(e) => {
                                        warn!(session_id = %self.session_id, error = %e, "LLM re-issue after RAG splice failed");
                                        self.fail_episode(episode_seq).await;
                                        return;
                                    }
                                }
                            }
                        }
                    }
                }

                event = stream.next() => {
                    match event {
                        Some(Ok(LlmEvent::Token(token))) => {
                            if !first_token_seen {
                                first_token_seen = true;
                                self.record_first_token_latency(episode_seq).await;
                            }
                            for sentence in segmenter.push(&token) {
                                if llm_cancel.is_cancelled() {
                                    return;
                                }
                                self.emit_sentence(episode_seq, sentence).await;
                            }
                        }
                        Some(Ok(LlmEvent::Done { usage })) => {
                            if let Some(usage) = usage {
                                self.record_usage(episode_seq, usage).await;
                            }
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(session_id = %self.session_id, error = %e, "LLM stream error");
                            self.fail_episode(episode_seq).await;
                            return;
                        }
                        None => break,
                    }
                }
            }
        }

        if llm_cancel.is_cancelled() {
            return;
        }
        if let Some(sentence) = segmenter.flush() {
            self.emit_sentence(episode_seq, sentence).await;
        }
        self.finish_episode_llm(episode_seq).await;
    }

    /// Route one completed sentence: buffered while still speculative,
    /// streamed straight to TTS once committed, dropped if the episode
    /// that produced it is no longer current.
    async fn emit_sentence(self: &Arc<Self>, episode_seq: u64, sentence: String) {
        let mut state = self.state.lock().await;
        if state.episode_seq != episode_seq {
            return;
        }
        match state.turn_state {
            TurnState::Speculative => state.hold_buffer.push(sentence),
            TurnState::Committed | TurnState::Speaking => {
                if let Some(tx) = state.tts_tx.clone() {
                    let _ = tx.send(sentence);
                }
            }
            _ => {}
        }
    }

    async fn finish_episode_llm(self: &Arc<Self>, episode_seq: u64) {
        let mut state = self.state.lock().await;
        if state.episode_seq != episode_seq {
            return;
        }
        state.llm_finished = true;
        if matches!(state.turn_state, TurnState::Committed | TurnState::Speaking) {
            // Dropping our handle closes the channel once the TTS pump
            // drains whatever is already queued.
            state.tts_tx = None;
        }
    }

    async fn record_first_token_latency(self: &Arc<Self>, episode_seq: u64) {
        let mut state = self.state.lock().await;
        if state.episode_seq != episode_seq {
            return;
        }
        if let Some(start) = state.final_received_at {
            state.final_to_first_token_ms = Some(start.elapsed().as_millis() as u64);
        }
    }

    async fn record_usage(self: &Arc<Self>, episode_seq: u64, usage: voice_domain::Usage) {
        let mut state = self.state.lock().await;
        if state.episode_seq != episode_seq {
            return;
        }
        state.tokens_prompt = usage.prompt_tokens;
        state.tokens_completion = usage.completion_tokens;
    }

    /// The LLM failed to start or errored mid-stream. Before commit this
    /// degrades like a silent cancel (nothing was ever surfaced); after
    /// commit it falls back to whatever partial text was already spoken,
    /// or closes the turn outright if nothing was.
    async fn fail_episode(self: &Arc<Self>, episode_seq: u64) {
        let mut state = self.state.lock().await;
        if state.episode_seq != episode_seq {
            return;
        }
        match state.turn_state {
            TurnState::Speculative => {
                if let Some(timer) = state.timer.take() {
                    timer.cancel();
                }
                state.hold_buffer.clear();
                let (to, _hook) = match state.turn_state.transition(Trigger::NewActivityOrCorrection) {
                    Ok(v) => v,
                    Err(_) => return,
                };
                self.apply_transition(&mut state, to).await;
                self.debounce_ctrl.record_turn_outcome(false);
                self.sink
                    .send(ServerMessage::from_error(
                        &voice_domain::Error::LlmUnavailable("speculative LLM call failed".into()),
                        now_ms(),
                    ))
                    .await;
                self.close_turn(&mut state, TurnOutcome::LlmFailed, true).await;
            }
            TurnState::Committed | TurnState::Speaking => {
                self.sink
                    .send(ServerMessage::from_error(
                        &voice_domain::Error::LlmUnavailable("LLM call failed mid-response".into()),
                        now_ms(),
                    ))
                    .await;
                let text = state.agent_text.clone();
                drop(state);
                if text.is_empty() {
                    let mut state = self.state.lock().await;
                    if state.episode_seq != episode_seq {
                        return;
                    }
                    let (to, _hook) = match state.turn_state.transition(Trigger::FatalOrTeardown) {
                        Ok(v) => v,
                        Err(_) => return,
                    };
                    self.apply_transition(&mut state, to).await;
                    self.close_turn(&mut state, TurnOutcome::LlmFailed, true).await;
                } else {
                    self.fallback_to_text(episode_seq, text, "llm_failed", TurnOutcome::LlmFailed)
                        .await;
                }
            }
            _ => {}
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // TTS pipelining (spec §4.7.3)
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Consume sentences as they arrive and stream each through TTS.
    /// Audio chunks are buffered one-deep so the very last physical
    /// chunk of the whole turn (which may belong to any sentence) is
    /// the one marked `is_final`, regardless of how sentences line up
    /// with individual TTS calls.
    async fn run_tts_pump(
        self: Arc<Self>,
        episode_seq: u64,
        mut rx: mpsc::UnboundedReceiver<String>,
        tts_cancel: CancelToken,
        voice_id: String,
        chunk_index: Arc<AtomicU32>,
        first_chunk_sent: Arc<AtomicBool>,
    ) {
        let mut pending: Option<Vec<u8>> = None;
        let mut any_chunk_sent = false;
        let mut agent_text = String::new();

        while let Some(sentence) = rx.recv().await {
            if tts_cancel.is_cancelled() {
                return;
            }
            if !agent_text.is_empty() {
                agent_text.push(' ');
            }
            agent_text.push_str(&sentence);
            self.append_agent_text(episode_seq, &agent_text).await;

            let mut chunk_stream = match self
                .tts
                .stream(sentence.clone(), Some(voice_id.clone()), tts_cancel.clone())
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "TTS stream failed to start");
                    if !any_chunk_sent && pending.is_none() {
                        self.fallback_to_text(episode_seq, agent_text.clone(), "tts_failed", TurnOutcome::TtsFailed)
                            .await;
                        return;
                    }
                    continue;
                }
            };

            let mut stream_failed = false;
            while let Some(chunk) = chunk_stream.next().await {
                if tts_cancel.is_cancelled() {
                    return;
                }
                match chunk {
                    Ok(chunk) => {
                        if let Some(prev) = pending.take() {
                            self.emit_audio_chunk(episode_seq, prev, false, &chunk_index, &first_chunk_sent)
                                .await;
                            any_chunk_sent = true;
                        }
                        pending = Some(chunk.audio);
                    }
                    Err(e) => {
                        warn!(session_id = %self.session_id, error = %e, "TTS chunk stream error");
                        stream_failed = true;
                        break;
                    }
                }
            }

            if stream_failed && !any_chunk_sent && pending.is_none() {
                self.fallback_to_text(episode_seq, agent_text.clone(), "tts_failed", TurnOutcome::TtsFailed)
                    .await;
                return;
            }
        }

        if tts_cancel.is_cancelled() {
            return;
        }
        if let Some(prev) = pending.take() {
            self.emit_audio_chunk(episode_seq, prev, true, &chunk_index, &first_chunk_sent).await;
            any_chunk_sent = true;
        }

        if !any_chunk_sent {
            self.complete_turn_without_audio(episode_seq).await;
        }
        // Otherwise SPEAKING is already underway; the turn closes on
        // the client's `playback_complete` or the playback watchdog.
    }

    async fn append_agent_text(self: &Arc<Self>, episode_seq: u64, agent_text: &str) {
        let mut state = self.state.lock().await;
        if state.episode_seq != episode_seq {
            return;
        }
        state.agent_text = agent_text.to_string();
    }

    async fn emit_audio_chunk(
        self: &Arc<Self>,
        episode_seq: u64,
        audio: Vec<u8>,
        is_final: bool,
        chunk_index: &Arc<AtomicU32>,
        first_chunk_sent: &Arc<AtomicBool>,
    ) {
        if !first_chunk_sent.swap(true, Ordering::AcqRel) {
            self.on_first_audio_chunk(episode_seq).await;
        }
        let idx = chunk_index.fetch_add(1, Ordering::Relaxed);
        self.sink
            .send(ServerMessage::AgentAudioChunk {
                audio: base64::engine::general_purpose::STANDARD.encode(&audio),
                chunk_index: idx,
                is_final,
            })
            .await;
    }

    /// First audio chunk of the turn: transition COMMITTED→SPEAKING and
    /// arm the playback watchdog (spec §4.1, §4.7.3).
    async fn on_first_audio_chunk(self: &Arc<Self>, episode_seq: u64) {
        let watchdog = {
            let mut state = self.state.lock().await;
            if state.episode_seq != episode_seq || state.turn_state != TurnState::Committed {
                return;
            }
            let (to, _hook) = match state.turn_state.transition(Trigger::FirstAudioChunkEmitted) {
                Ok(v) => v,
                Err(_) => return,
            };
            self.apply_transition(&mut state, to).await;
            if let Some(start) = state.final_received_at {
                state.final_to_first_audio_ms = Some(start.elapsed().as_millis() as u64);
            }
            self.config.playback_watchdog
        };

        let ctrl = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(watchdog).await;
            ctrl.on_playback_watchdog_elapsed(episode_seq).await;
        });
    }

    async fn on_playback_watchdog_elapsed(self: &Arc<Self>, episode_seq: u64) {
        let mut state = self.state.lock().await;
        if state.episode_seq != episode_seq || state.turn_state != TurnState::Speaking {
            return;
        }
        warn!(session_id = %self.session_id, "playback watchdog elapsed without client confirmation");
        let (to, _hook) = match state.turn_state.transition(Trigger::PlaybackComplete) {
            Ok(v) => v,
            Err(_) => return,
        };
        self.apply_transition(&mut state, to).await;
        self.close_turn(&mut state, TurnOutcome::Completed, true).await;
    }

    /// The LLM produced no sentences at all — an empty completion.
    /// There is no audio in flight to wait on, so close immediately.
    async fn complete_turn_without_audio(self: &Arc<Self>, episode_seq: u64) {
        let mut state = self.state.lock().await;
        if state.episode_seq != episode_seq || state.turn_state != TurnState::Committed {
            return;
        }
        let (to, _hook) = match state.turn_state.transition(Trigger::FatalOrTeardown) {
            Ok(v) => v,
            Err(_) => return,
        };
        self.apply_transition(&mut state, to).await;
        self.close_turn(&mut state, TurnOutcome::Completed, true).await;
    }

    /// A permanent TTS (or post-commit LLM) failure: surface whatever
    /// text exists as `agent_text_fallback` and close the turn (spec
    /// §8 S5 "degraded: TTS permanent failure").
    async fn fallback_to_text(self: &Arc<Self>, episode_seq: u64, text: String, reason: &str, outcome: TurnOutcome) {
        let mut state = self.state.lock().await;
        if state.episode_seq != episode_seq {
            return;
        }
        if !matches!(state.turn_state, TurnState::Committed | TurnState::Speaking) {
            return;
        }
        state.agent_text = text.clone();
        self.sink
            .send(ServerMessage::AgentTextFallback {
                text,
                reason: reason.to_string(),
            })
            .await;

        let (to, _hook) = match state.turn_state.transition(Trigger::FatalOrTeardown) {
            Ok(v) => v,
            Err(_) => return,
        };
        self.apply_transition(&mut state, to).await;
        self.close_turn(&mut state, outcome, true).await;
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Turn closure (spec §4.7.5, §6.4)
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn close_turn(self: &Arc<Self>, state: &mut SessionState, outcome: TurnOutcome, notify_client: bool) {
        let turn_id = state.turn_id.take().unwrap_or_else(|| Uuid::new_v4().to_string());
        let started_at = state.started_at.take().unwrap_or_else(Utc::now);
        let finished_at = Utc::now();
        let user_text = state.transcript.complete_text();
        let agent_text = std::mem::take(&mut state.agent_text);
        let was_interrupted = state.was_interrupted;
        let tokens_wasted = state.tokens_wasted;
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        if let Some(store) = &self.store {
            store.record(TurnRecord {
                turn_id: turn_id.clone(),
                session_id: self.session_id.clone(),
                started_at,
                finished_at: Some(finished_at),
                user_text: user_text.clone(),
                agent_text: agent_text.clone(),
                outcome,
                state_transition_log: std::mem::take(&mut state.state_log),
                was_interrupted,
                tokens_prompt: state.tokens_prompt,
                tokens_completion: state.tokens_completion,
                tokens_wasted: tokens_wasted as u32,
                latencies: TurnLatencies {
                    final_to_first_audio_ms: state.final_to_first_audio_ms,
                    final_to_first_token_ms: state.final_to_first_token_ms,
                },
            });
        }

        if notify_client {
            self.sink
                .send(ServerMessage::TurnComplete {
                    turn_id,
                    user_text,
                    agent_text,
                    duration_ms,
                    was_interrupted,
                    timestamp: now_ms(),
                })
                .await;

            let due = self
                .telemetry
                .record_turn(matches!(outcome, TurnOutcome::SpeculativelyCanceled), was_interrupted, tokens_wasted, duration_ms);
            if due {
                self.sink
                    .send(ServerMessage::Telemetry(
                        self.telemetry.snapshot(self.debounce_ctrl.current_ms()),
                    ))
                    .await;
            }
        }

        self.reset_turn_scoped(state);
    }

    fn reset_turn_scoped(&self, state: &mut SessionState) {
        state.transcript = TranscriptBuffer::new();
        state.was_interrupted = false;
        state.tokens_wasted = 0;
        state.tokens_prompt = 0;
        state.tokens_completion = 0;
        state.agent_text.clear();
        state.final_to_first_token_ms = None;
        state.final_to_first_audio_ms = None;
        state.final_received_at = None;
        state.state_log.clear();
        state.llm_finished = false;
        state.llm_cancel = None;
        state.tts_cancel = None;
        state.hold_buffer.clear();
        state.tts_tx = None;
        state.timer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use tokio::sync::mpsc as tmpsc;
    use voice_providers::{MockLlmAdapter, MockRagRetriever, MockSttAdapter, MockTtsAdapter};

    struct RecordingSink {
        tx: tmpsc::UnboundedSender<ServerMessage>,
    }

    #[async_trait]
    impl ClientSink for RecordingSink {
        async fn send(&self, message: ServerMessage) {
            let _ = self.tx.send(message);
        }
    }

    fn test_config() -> TurnControllerConfig {
        let mut debounce = voice_domain::config::DebounceConfig::default();
        debounce.initial_ms = 30;
        debounce.min_ms = 30;
        debounce.max_ms = 200;
        TurnControllerConfig {
            debounce,
            rag_enabled: false,
            rag_timeout: StdDuration::from_millis(350),
            rag_top_k: 3,
            playback_watchdog: StdDuration::from_millis(500),
            telemetry_every_n_turns: 5,
            rolling_window: 10,
            default_voice_id: "default".into(),
            default_llm_model: "default".into(),
            system_prompt: "be helpful".into(),
            audio_buffer_capacity_bytes: 320_000,
        }
    }

    async fn build_controller(
        stt_script: Vec<SttEvent>,
        llm_tokens: Vec<&str>,
        tts_chunks_per_call: usize,
    ) -> (Arc<TurnController>, tmpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = tmpsc::unbounded_channel();
        let sink: Arc<dyn ClientSink> = Arc::new(RecordingSink { tx });
        let stt: Arc<dyn SttAdapter> = Arc::new(MockSttAdapter::new(stt_script));
        let llm: Arc<dyn LlmAdapter> = Arc::new(MockLlmAdapter::new(
            llm_tokens.into_iter().map(String::from).collect(),
        ));
        let tts: Arc<dyn TtsAdapter> = Arc::new(MockTtsAdapter::new(tts_chunks_per_call));

        let controller = TurnController::new(TurnControllerDeps {
            session_id: "s1".into(),
            sample_rate_hz: 16_000,
            config: test_config(),
            stt,
            llm,
            tts,
            rag: None,
            store: None,
            sink,
        })
        .await
        .unwrap();

        (controller, rx)
    }

    async fn drain(rx: &mut tmpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = tokio::time::timeout(StdDuration::from_millis(400), rx.recv()).await {
            match msg {
                Some(m) => out.push(m),
                None => break,
            }
        }
        out
    }

    #[tokio::test]
    async fn happy_path_reaches_turn_complete_with_audio() {
        let (controller, mut rx) = build_controller(
            vec![SttEvent::Final {
                text: "book a flight".into(),
                confidence: 0.95,
            }],
            vec!["Sure, ".into(), "one moment.".into()],
            2,
        )
        .await;

        controller.on_audio_frame(vec![0u8; 10]).await;
        tokio::time::sleep(StdDuration::from_millis(300)).await;
        controller.on_playback_complete().await;

        let messages = drain(&mut rx).await;
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::AgentAudioChunk { is_final: true, .. })));
        assert!(messages.iter().any(|m| matches!(m, ServerMessage::TurnComplete { .. })));
    }

    #[tokio::test]
    async fn speculative_episode_is_canceled_without_leaking_agent_text() {
        let (controller, mut rx) = build_controller(
            vec![
                SttEvent::Final {
                    text: "book a".into(),
                    confidence: 0.9,
                },
                SttEvent::Partial {
                    text: "book a flight".into(),
                    confidence: 0.5,
                },
            ],
            vec!["irrelevant".into()],
            1,
        )
        .await;

        controller.on_audio_frame(vec![0u8; 4]).await;
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        let messages = drain(&mut rx).await;
        assert!(messages
            .iter()
            .all(|m| !matches!(m, ServerMessage::AgentAudioChunk { .. })));
        assert!(messages.iter().all(|m| !matches!(m, ServerMessage::TurnComplete { .. })));
    }

    #[tokio::test]
    async fn barge_in_during_speaking_marks_interrupted() {
        let (controller, mut rx) = build_controller(
            vec![SttEvent::Final {
                text: "tell me a long story".into(),
                confidence: 0.9,
            }],
            vec!["Once ".into(), "upon ".into(), "a time.".into()],
            5,
        )
        .await;

        controller.on_audio_frame(vec![0u8; 4]).await;
        tokio::time::sleep(StdDuration::from_millis(60)).await;
        controller.on_audio_frame(vec![1u8; 4]).await;

        let messages = drain(&mut rx).await;
        let turn_complete = messages.iter().find(|m| matches!(m, ServerMessage::TurnComplete { .. }));
        match turn_complete {
            Some(ServerMessage::TurnComplete { was_interrupted, .. }) => assert!(*was_interrupted),
            _ => panic!("expected a turn_complete with was_interrupted=true"),
        }
    }

    #[tokio::test]
    async fn tts_permanent_failure_falls_back_to_text() {
        let (tx, rx) = tmpsc::unbounded_channel();
        let sink: Arc<dyn ClientSink> = Arc::new(RecordingSink { tx });
        let stt: Arc<dyn SttAdapter> = Arc::new(MockSttAdapter::new(vec![SttEvent::Final {
            text: "hello".into(),
            confidence: 0.9,
        }]));
        let llm: Arc<dyn LlmAdapter> = Arc::new(MockLlmAdapter::new(vec!["Hi there.".into()]));
        let tts: Arc<dyn TtsAdapter> = Arc::new(MockTtsAdapter::always_failing());

        let controller = TurnController::new(TurnControllerDeps {
            session_id: "s2".into(),
            sample_rate_hz: 16_000,
            config: test_config(),
            stt,
            llm,
            tts,
            rag: None,
            store: None,
            sink,
        })
        .await
        .unwrap();

        controller.on_audio_frame(vec![0u8; 4]).await;
        let mut rx = rx;
        let messages = drain(&mut rx).await;

        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::AgentTextFallback { reason, .. } if reason == "tts_failed")));
        assert!(messages
            .iter()
            .all(|m| !matches!(m, ServerMessage::AgentAudioChunk { .. })));
        assert!(messages.iter().any(|m| matches!(m, ServerMessage::TurnComplete { .. })));
    }

    #[tokio::test]
    async fn rag_snippets_splice_in_before_first_token() {
        let (tx, rx) = tmpsc::unbounded_channel();
        let sink: Arc<dyn ClientSink> = Arc::new(RecordingSink { tx });
        let stt: Arc<dyn SttAdapter> = Arc::new(MockSttAdapter::new(vec![SttEvent::Final {
            text: "what is the policy".into(),
            confidence: 0.9,
        }]));
        let llm: Arc<dyn LlmAdapter> =
            Arc::new(MockLlmAdapter::new(vec!["Per policy.".into()]).with_delay(StdDuration::from_millis(20)));
        let tts: Arc<dyn TtsAdapter> = Arc::new(MockTtsAdapter::new(1));
        let rag: Arc<dyn RagRetriever> = Arc::new(MockRagRetriever::new(vec![Snippet {
            text: "refunds within 30 days".into(),
            score: 0.9,
        }]));

        let mut config = test_config();
        config.rag_enabled = true;

        let controller = TurnController::new(TurnControllerDeps {
            session_id: "s3".into(),
            sample_rate_hz: 16_000,
            config,
            stt,
            llm,
            tts,
            rag: Some(rag),
            store: None,
            sink,
        })
        .await
        .unwrap();

        controller.on_audio_frame(vec![0u8; 4]).await;
        let mut rx = rx;
        tokio::time::sleep(StdDuration::from_millis(300)).await;
        controller.on_playback_complete().await;

        let messages = drain(&mut rx).await;
        assert!(messages.iter().any(|m| matches!(m, ServerMessage::TurnComplete { .. })));
    }

    #[tokio::test]
    async fn audio_buffer_overflow_drops_oldest_and_warns_exactly_once() {
        let (controller, mut rx) = build_controller(vec![], vec![], 0).await;

        // Capacity is the default test capacity (320_000 bytes); the
        // second 200_000-byte frame pushes the buffer over capacity and
        // evicts exactly the first frame.
        controller.on_audio_frame(vec![0u8; 200_000]).await;
        controller.on_audio_frame(vec![0u8; 200_000]).await;

        let messages = drain(&mut rx).await;
        let overflow_warnings = messages
            .iter()
            .filter(|m| matches!(m, ServerMessage::Error { code, .. } if code == "AUDIO_BUFFER_OVERFLOW"))
            .count();
        assert_eq!(overflow_warnings, 1);
        assert_eq!(controller.audio_buffer.dropped_count(), 1);
    }
}
