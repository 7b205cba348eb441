//! Shared application state passed to every WebSocket connection and CLI
//! diagnostic (spec §6.4, SPEC_FULL.md §3 "ConnectedClient").

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use voice_domain::config::Config;
use voice_providers::{HttpLlmAdapter, HttpRagRetriever, HttpSttAdapter, HttpTtsAdapter};
use voice_providers::{LlmAdapter, RagRetriever, SttAdapter, TtsAdapter};
use voice_sessions::store::{TurnSink, TurnStore};
use voice_sessions::turn_record::TurnRecord;
use voice_sessions::SessionRegistry;

/// Append-only JSONL [`TurnSink`] (SPEC_FULL.md §2 "Transport" note:
/// "realized as an append-only JSONL TurnRecord writer"). One line per
/// closed turn; write failures bubble up to [`TurnStore`]'s retry queue.
pub struct JsonlTurnSink {
    path: PathBuf,
    file: Mutex<Option<std::fs::File>>,
}

impl JsonlTurnSink {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    fn ensure_open(&self) -> std::io::Result<()> {
        let mut guard = self.file.lock();
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            *guard = Some(file);
        }
        Ok(())
    }
}

impl TurnSink for JsonlTurnSink {
    fn write(&self, record: &TurnRecord) -> Result<(), String> {
        self.ensure_open().map_err(|e| e.to_string())?;
        let line = serde_json::to_string(record).map_err(|e| e.to_string())?;
        let mut guard = self.file.lock();
        let file = guard.as_mut().expect("ensure_open just populated this");
        writeln!(file, "{line}").map_err(|e| e.to_string())
    }
}

/// Everything a connection handler needs, cloned cheaply (every field is
/// an `Arc` or `Copy`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stt: Arc<dyn SttAdapter>,
    pub llm: Arc<dyn LlmAdapter>,
    pub tts: Arc<dyn TtsAdapter>,
    pub rag: Option<Arc<dyn RagRetriever>>,
    pub sessions: Arc<SessionRegistry>,
    pub turn_store: Arc<TurnStore>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Build every adapter and background worker from `config` (CLI
    /// `serve` and `doctor` share this path, following the reference
    /// gateway's `build_app_state`).
    pub fn build(config: Config) -> voice_domain::Result<Self> {
        let config = Arc::new(config);

        let stt: Arc<dyn SttAdapter> = Arc::new(HttpSttAdapter::new(config.stt.clone())?);
        let llm: Arc<dyn LlmAdapter> = Arc::new(HttpLlmAdapter::new(config.llm.clone())?);
        let tts: Arc<dyn TtsAdapter> = Arc::new(HttpTtsAdapter::new(config.tts.clone())?);
        let rag: Option<Arc<dyn RagRetriever>> = if config.rag.enabled {
            Some(Arc::new(HttpRagRetriever::new(
                &config.rag,
                std::env::var("VOICE_RAG_URL").unwrap_or_else(|_| "http://127.0.0.1:9003".into()),
            )?))
        } else {
            None
        };

        let sink: Arc<dyn TurnSink> = Arc::new(JsonlTurnSink::new(PathBuf::from(
            std::env::var("VOICE_TURN_LOG").unwrap_or_else(|_| "turns.jsonl".into()),
        )));
        let turn_store = Arc::new(TurnStore::spawn(
            sink,
            5,
            std::time::Duration::from_millis(500),
        ));

        Ok(Self {
            config,
            stt,
            llm,
            tts,
            rag,
            sessions: Arc::new(SessionRegistry::new()),
            turn_store,
            started_at: chrono::Utc::now(),
        })
    }
}
