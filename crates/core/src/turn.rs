//! Per-session turn tracking.
//!
//! [`TurnTracker`] holds the transitions between `idle`, `user_speaking` and
//! `model_responding`. It is plain data; the relay wraps it in a mutex and
//! each loop calls only its own transitions.

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    UserSpeaking,
    ModelResponding,
}

/// What the inbound loop should do with a client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDecision {
    Forward,
    /// The model holds the turn and the client did not interrupt.
    Drop,
}

/// What the outbound loop should do with a backend event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDecision {
    Forward,
    /// The event belongs to a model turn the client interrupted.
    Discard,
}

#[derive(Debug, Default)]
pub struct TurnTracker {
    state: TurnState,
    /// Set by a client interrupt until the backend closes the interrupted turn.
    discarding: bool,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Audio or text from the client.
    pub fn on_user_content(&mut self) -> InputDecision {
        match self.state {
            TurnState::ModelResponding => InputDecision::Drop,
            TurnState::Idle => {
                self.state = TurnState::UserSpeaking;
                InputDecision::Forward
            }
            TurnState::UserSpeaking => InputDecision::Forward,
        }
    }

    /// The client ended its turn. The state stays `UserSpeaking` until the
    /// backend replies.
    pub fn on_end_of_turn(&mut self) -> InputDecision {
        match self.state {
            TurnState::ModelResponding => InputDecision::Drop,
            _ => InputDecision::Forward,
        }
    }

    /// The client interrupted. Returns whether a model turn was cut short.
    pub fn on_interrupt(&mut self) -> bool {
        if self.state != TurnState::ModelResponding {
            debug!(state = ?self.state, "Interrupt outside a model turn, ignoring");
            return false;
        }
        self.state = TurnState::Idle;
        self.discarding = true;
        true
    }

    /// A piece of model output arrived.
    pub fn on_model_part(&mut self) -> OutputDecision {
        if self.discarding {
            return OutputDecision::Discard;
        }
        self.state = TurnState::ModelResponding;
        OutputDecision::Forward
    }

    /// The backend finished a model turn.
    pub fn on_turn_complete(&mut self) -> OutputDecision {
        if self.discarding {
            // Closes the interrupted turn; the user may already be speaking again.
            self.discarding = false;
            return OutputDecision::Discard;
        }
        self.state = TurnState::Idle;
        OutputDecision::Forward
    }

    /// The backend stopped generating on its own after hearing the user.
    /// Forwarded as a turn completion only if the model held the turn.
    pub fn on_backend_interrupted(&mut self) -> OutputDecision {
        if self.discarding {
            self.discarding = false;
            return OutputDecision::Discard;
        }
        if self.state == TurnState::ModelResponding {
            self.state = TurnState::Idle;
            return OutputDecision::Forward;
        }
        OutputDecision::Discard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_content_starts_user_turn() {
        let mut turn = TurnTracker::new();
        assert_eq!(turn.on_user_content(), InputDecision::Forward);
        assert_eq!(turn.state(), TurnState::UserSpeaking);
        assert_eq!(turn.on_end_of_turn(), InputDecision::Forward);
        assert_eq!(turn.state(), TurnState::UserSpeaking);
    }

    #[test]
    fn test_model_turn_round_trip() {
        let mut turn = TurnTracker::new();
        turn.on_user_content();
        assert_eq!(turn.on_model_part(), OutputDecision::Forward);
        assert_eq!(turn.state(), TurnState::ModelResponding);
        assert_eq!(turn.on_turn_complete(), OutputDecision::Forward);
        assert_eq!(turn.state(), TurnState::Idle);
    }

    #[test]
    fn test_input_dropped_while_model_responds() {
        let mut turn = TurnTracker::new();
        turn.on_model_part();
        assert_eq!(turn.on_user_content(), InputDecision::Drop);
        assert_eq!(turn.on_end_of_turn(), InputDecision::Drop);
        assert_eq!(turn.state(), TurnState::ModelResponding);
    }

    #[test]
    fn test_interrupt_discards_rest_of_model_turn() {
        let mut turn = TurnTracker::new();
        turn.on_model_part();

        assert!(turn.on_interrupt());
        assert_eq!(turn.state(), TurnState::Idle);

        // New user input is accepted at once.
        assert_eq!(turn.on_user_content(), InputDecision::Forward);
        assert_eq!(turn.state(), TurnState::UserSpeaking);

        // Stale output of the interrupted turn is dropped.
        assert_eq!(turn.on_model_part(), OutputDecision::Discard);
        assert_eq!(turn.state(), TurnState::UserSpeaking);

        // Its completion is swallowed without ending the user's turn.
        assert_eq!(turn.on_turn_complete(), OutputDecision::Discard);
        assert_eq!(turn.state(), TurnState::UserSpeaking);

        // The next model turn flows again.
        assert_eq!(turn.on_model_part(), OutputDecision::Forward);
    }

    #[test]
    fn test_interrupt_while_idle_is_ignored() {
        let mut turn = TurnTracker::new();
        assert!(!turn.on_interrupt());
        assert_eq!(turn.on_model_part(), OutputDecision::Forward);
    }

    #[test]
    fn test_backend_interruption() {
        let mut turn = TurnTracker::new();
        turn.on_model_part();
        assert_eq!(turn.on_backend_interrupted(), OutputDecision::Forward);
        assert_eq!(turn.state(), TurnState::Idle);

        // Nothing to report when the model did not hold the turn.
        turn.on_user_content();
        assert_eq!(turn.on_backend_interrupted(), OutputDecision::Discard);
        assert_eq!(turn.state(), TurnState::UserSpeaking);
    }

    #[test]
    fn test_backend_interruption_closes_discarded_turn() {
        let mut turn = TurnTracker::new();
        turn.on_model_part();
        turn.on_interrupt();
        assert_eq!(turn.on_backend_interrupted(), OutputDecision::Discard);
        assert_eq!(turn.on_model_part(), OutputDecision::Forward);
    }
}
