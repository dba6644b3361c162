use std::fmt;

/// Lifecycle state of a [`Session`](super::Session).
///
/// ```text
/// Uninitialized ──start()──► Starting ──► Running ──stop()──► Stopped
///        ▲                      │
///        └── transport unavailable
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    Starting,
    Running,
    Stopped,
}

impl SessionState {
    #[inline]
    pub fn is_running(self) -> bool {
        self == SessionState::Running
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(SessionState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(SessionState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn test_is_running() {
        assert!(SessionState::Running.is_running());
        assert!(!SessionState::Starting.is_running());
    }
}
