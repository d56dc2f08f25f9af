//! Session lifecycle state machine
//!
//! One table drives every task session regardless of profile. Both terminal
//! states have no outgoing edges; a new task gets a new session.

use crate::error::SessionError;
use crate::types::SessionState;

/// Validate a state transition
///
/// # Errors
/// Returns [`SessionError::IllegalTransition`] if `to` is not reachable from
/// `from` in one step.
pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), SessionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SessionError::IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: SessionState) -> Vec<SessionState> {
    use SessionState::{Building, Collecting, Confirming, Expired, Finished, Idle, Ready};

    match from {
        Idle => vec![Collecting],
        Collecting => vec![Ready, Finished, Expired],
        Ready => vec![Confirming, Finished, Expired],
        Confirming => vec![Building, Ready, Finished, Expired],
        Building => vec![Finished, Ready, Expired],
        Finished | Expired => vec![],
    }
}

/// Check if state is terminal
#[inline]
#[must_use]
pub fn is_terminal(state: SessionState) -> bool {
    allowed_transitions(state).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let path = [
            SessionState::Idle,
            SessionState::Collecting,
            SessionState::Ready,
            SessionState::Confirming,
            SessionState::Building,
            SessionState::Finished,
        ];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_collecting_cannot_skip_to_confirming() {
        let err = validate_transition(SessionState::Collecting, SessionState::Confirming).unwrap_err();
        assert!(matches!(
            err,
            SessionError::IllegalTransition {
                from: SessionState::Collecting,
                to: SessionState::Confirming
            }
        ));
    }

    #[test]
    fn test_cancel_during_build_returns_to_ready() {
        assert!(validate_transition(SessionState::Building, SessionState::Ready).is_ok());
        assert!(validate_transition(SessionState::Confirming, SessionState::Ready).is_ok());
    }

    #[test]
    fn test_every_live_state_can_expire_and_finish() {
        for state in SessionState::ALL {
            if state == SessionState::Idle || state.is_terminal() {
                continue;
            }
            assert!(validate_transition(state, SessionState::Expired).is_ok());
            assert!(validate_transition(state, SessionState::Finished).is_ok());
        }
    }

    #[test]
    fn test_terminal_table_agrees_with_state() {
        for state in SessionState::ALL {
            assert_eq!(is_terminal(state), state.is_terminal());
        }
    }
}
