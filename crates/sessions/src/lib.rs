//! Session identity, liveness, and the best-effort persistent turn store
//! (spec §3 Session, §6.4). Turn-level orchestration lives in
//! `voice-core`; this crate only tracks what must outlive one turn.

pub mod session;
pub mod store;
pub mod turn_record;

pub use session::{Session, SessionRegistry};
pub use store::{InMemorySink, TurnSink, TurnStore};
pub use turn_record::{StateTransitionLogEntry, TurnLatencies, TurnOutcome, TurnRecord};
