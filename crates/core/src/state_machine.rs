//! StateMachine (C1) — the five-state turn-taking FSM (spec §4.1).
//!
//! A pure transition table: no I/O, no locking. The controller calls
//! [`TurnState::transition`] and reacts to the returned entry hook.

use voice_domain::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    Idle,
    Listening,
    Speculative,
    Committed,
    Speaking,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "IDLE",
            TurnState::Listening => "LISTENING",
            TurnState::Speculative => "SPECULATIVE",
            TurnState::Committed => "COMMITTED",
            TurnState::Speaking => "SPEAKING",
        }
    }
}

/// The trigger that drives a transition, named after spec §4.1's table so
/// the mapping from event to allowed edge is traceable line-for-line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    FirstAudioFrame,
    ContinuedAudio,
    SilenceTimerStarted,
    NewActivityOrCorrection,
    SilenceTimerFired,
    FirstAudioChunkEmitted,
    BargeInBeforeAudio,
    BargeInDuringAudio,
    PlaybackComplete,
    FatalOrTeardown,
}

/// A side effect the controller must perform as a consequence of a
/// transition (spec §4.1 "Entry hooks of interest").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryHook {
    None,
    StartSpeculativeWork,
    ReleaseHeldSentencesToTts,
    SetCancellationSignals,
}

impl TurnState {
    /// Apply `trigger` from the current state. Returns the destination
    /// state and the entry hook to run, or `InvalidStateTransition` if
    /// the edge is not in spec §4.1's table.
    pub fn transition(self, trigger: Trigger) -> Result<(TurnState, EntryHook), Error> {
        use EntryHook::*;
        use Trigger::*;
        use TurnState::*;

        let result = match (self, trigger) {
            (Idle, FirstAudioFrame) => (Listening, None),
            (Listening, ContinuedAudio) => (Listening, None),
            (Listening, SilenceTimerStarted) => (Speculative, StartSpeculativeWork),
            (Speculative, NewActivityOrCorrection) => (Listening, SetCancellationSignals),
            (Speculative, SilenceTimerFired) => (Committed, ReleaseHeldSentencesToTts),
            (Committed, FirstAudioChunkEmitted) => (Speaking, None),
            (Committed, BargeInBeforeAudio) => (Listening, SetCancellationSignals),
            (Speaking, BargeInDuringAudio) => (Listening, SetCancellationSignals),
            (Speaking, PlaybackComplete) => (Idle, None),
            (_, FatalOrTeardown) => (Idle, SetCancellationSignals),
            _ => {
                return Err(Error::InvalidStateTransition {
                    from: self.as_str().to_string(),
                    to: format!("{trigger:?}"),
                })
            }
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_to_listening_on_first_audio() {
        let (to, hook) = TurnState::Idle.transition(Trigger::FirstAudioFrame).unwrap();
        assert_eq!(to, TurnState::Listening);
        assert_eq!(hook, EntryHook::None);
    }

    #[test]
    fn listening_to_speculative_starts_speculative_work() {
        let (to, hook) = TurnState::Listening
            .transition(Trigger::SilenceTimerStarted)
            .unwrap();
        assert_eq!(to, TurnState::Speculative);
        assert_eq!(hook, EntryHook::StartSpeculativeWork);
    }

    #[test]
    fn speculative_cancel_sets_cancellation_signals() {
        let (to, hook) = TurnState::Speculative
            .transition(Trigger::NewActivityOrCorrection)
            .unwrap();
        assert_eq!(to, TurnState::Listening);
        assert_eq!(hook, EntryHook::SetCancellationSignals);
    }

    #[test]
    fn speculative_commits_on_timer_fire() {
        let (to, hook) = TurnState::Speculative
            .transition(Trigger::SilenceTimerFired)
            .unwrap();
        assert_eq!(to, TurnState::Committed);
        assert_eq!(hook, EntryHook::ReleaseHeldSentencesToTts);
    }

    #[test]
    fn barge_in_during_speaking_returns_to_listening() {
        let (to, _) = TurnState::Speaking
            .transition(Trigger::BargeInDuringAudio)
            .unwrap();
        assert_eq!(to, TurnState::Listening);
    }

    #[test]
    fn barge_in_before_audio_from_committed() {
        let (to, _) = TurnState::Committed
            .transition(Trigger::BargeInBeforeAudio)
            .unwrap();
        assert_eq!(to, TurnState::Listening);
    }

    #[test]
    fn playback_complete_returns_to_idle() {
        let (to, hook) = TurnState::Speaking.transition(Trigger::PlaybackComplete).unwrap();
        assert_eq!(to, TurnState::Idle);
        assert_eq!(hook, EntryHook::None);
    }

    #[test]
    fn fatal_teardown_from_any_state_goes_idle() {
        for state in [
            TurnState::Idle,
            TurnState::Listening,
            TurnState::Speculative,
            TurnState::Committed,
            TurnState::Speaking,
        ] {
            let (to, _) = state.transition(Trigger::FatalOrTeardown).unwrap();
            assert_eq!(to, TurnState::Idle);
        }
    }

    #[test]
    fn disallowed_edge_is_invalid_transition() {
        let err = TurnState::Idle.transition(Trigger::SilenceTimerFired).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[test]
    fn speaking_cannot_silence_timer_start() {
        let err = TurnState::Speaking
            .transition(Trigger::SilenceTimerStarted)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }
}
