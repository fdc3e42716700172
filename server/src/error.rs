//! Error types for the server core and runtime.

/// Failures while handling an admitted client message. All of them are
/// recoverable: the offending operation becomes a no-op and the connection
/// stays open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown agent {0}")]
    UnknownAgent(String),
    #[error("agent {0} is owned by another connection")]
    NotOwner(String),
    #[error("agent {0} is dead")]
    AgentDead(String),
    #[error("food index {index} out of range ({len} foods)")]
    FoodIndexOutOfRange { index: usize, len: usize },
    #[error("segment index {index} out of range for agent {target} ({len} segments)")]
    SegmentIndexOutOfRange {
        target: String,
        index: usize,
        len: usize,
    },
    #[error("agent {0} cannot eat itself")]
    SelfTarget(String),
}

/// Fatal errors while bringing the server up.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read local address of listener: {0}")]
    LocalAddr(#[source] std::io::Error),
}
