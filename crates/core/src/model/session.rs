use std::fmt;

/// Lifecycle of a test-taking session.
///
/// `Running` is the only non-terminal state; there are no transitions out of
/// a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Running,
    TimedOut,
    Completed,
    Exited,
}

impl SessionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Running)
    }

    /// Terminal states that count as a finished attempt.
    #[must_use]
    pub fn marks_test_completed(self) -> bool {
        matches!(self, SessionState::TimedOut | SessionState::Completed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Running => "running",
            SessionState::TimedOut => "timed out",
            SessionState::Completed => "completed",
            SessionState::Exited => "exited",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_is_live() {
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::TimedOut.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Exited.is_terminal());
    }

    #[test]
    fn exit_is_not_a_completion() {
        assert!(!SessionState::Exited.marks_test_completed());
        assert!(SessionState::TimedOut.marks_test_completed());
    }
}
