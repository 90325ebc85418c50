//! Turn ceilings and per-session counters.

use serde::{Deserialize, Serialize};

use crate::config::RheoConfig;
use crate::error::RheoError;
use crate::types::Usage;

/// Turn ceilings resolved from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLimits {
    /// Turns allowed across the session; 0 disables the ceiling.
    pub max_session_turns: usize,
    /// Turns allowed while processing one user message.
    pub max_turns_per_message: usize,
}

impl SessionLimits {
    pub fn from_config(config: &RheoConfig) -> Self {
        Self {
            max_session_turns: config.max_session_turns,
            max_turns_per_message: config.bounded_turns_per_message(),
        }
    }
}

/// Counters the session mutates once per turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub turn_count: usize,
    pub max_turns: usize,
    pub token_totals: Usage,
    /// Token count of the transcript right after the last compression.
    pub compression_watermark: Option<usize>,
    /// Set once the ceiling is hit; the session accepts no further turns.
    pub exhausted: bool,
}

impl SessionState {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            ..Self::default()
        }
    }

    /// Count a new turn, or fail once the ceiling is reached.
    pub fn begin_turn(&mut self) -> Result<usize, RheoError> {
        if self.exhausted || (self.max_turns > 0 && self.turn_count >= self.max_turns) {
            self.exhausted = true;
            return Err(RheoError::SessionLimitExceeded {
                max_turns: self.max_turns,
            });
        }
        self.turn_count += 1;
        Ok(self.turn_count)
    }

    pub fn record_usage(&mut self, usage: &Usage) {
        self.token_totals.merge(usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_is_fatal() {
        let mut state = SessionState::new(2);
        assert_eq!(state.begin_turn().unwrap(), 1);
        assert_eq!(state.begin_turn().unwrap(), 2);
        assert!(matches!(
            state.begin_turn(),
            Err(RheoError::SessionLimitExceeded { max_turns: 2 })
        ));
        assert!(state.exhausted);
        assert_eq!(state.turn_count, 2);
    }

    #[test]
    fn zero_disables_the_ceiling() {
        let mut state = SessionState::new(0);
        for _ in 0..500 {
            state.begin_turn().unwrap();
        }
        assert!(!state.exhausted);
    }

    #[test]
    fn per_message_limit_is_capped() {
        let config = RheoConfig::default().with_max_turns_per_message(1_000);
        assert_eq!(SessionLimits::from_config(&config).max_turns_per_message, 100);
    }
}
