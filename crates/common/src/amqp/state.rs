use std::fmt;

/// Lifecycle of the broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
    Stopped,
}

/// Something that happened to the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectRequested,
    Established,
    Lost,
    ClosedNormally,
    BudgetExhausted,
    StopRequested,
}

impl ConnectionState {
    /// Next state after `event`. Events that make no sense in the current
    /// state leave it unchanged; `Stopped` is terminal.
    pub fn on(self, event: ConnectionEvent) -> Self {
        use ConnectionEvent::*;
        use ConnectionState::*;

        match (self, event) {
            (Stopped, _) => Stopped,
            (_, StopRequested) => Stopped,
            (Disconnected | Failed, ConnectRequested) => Connecting,
            (Connecting | Reconnecting, Established) => Connected,
            (Connected, Lost) => Reconnecting,
            (Connected, ClosedNormally) => Disconnected,
            (Connecting | Reconnecting, BudgetExhausted) => Failed,
            (state, _) => state,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
