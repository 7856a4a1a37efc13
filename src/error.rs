use serde::Serialize;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Result codes exposed to callers. The integer codes are part of the C ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, thiserror::Error)]
pub enum ErrorKind {
    #[error("invalid parameters")]
    InvalidParams,
    #[error("not connected")]
    NotConnected,
    #[error("init failed")]
    InitFailed,
    #[error("connect failed")]
    ConnectFailed,
    #[error("encode failed")]
    EncodeFailed,
    #[error("send failed")]
    SendFailed,
    #[error("allocation failed")]
    AllocFailed,
}

impl ErrorKind {
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::InitFailed => -1,
            ErrorKind::ConnectFailed => -2,
            ErrorKind::EncodeFailed => -3,
            ErrorKind::SendFailed => -4,
            ErrorKind::NotConnected => -5,
            ErrorKind::InvalidParams => -6,
            ErrorKind::AllocFailed => -7,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BridgeError {
    kind: ErrorKind,
    message: String,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotConnected, message)
    }

    /// Classifies a collaborator failure. Allocation failures keep their own kind
    /// whatever stage they happened in.
    pub fn from_backend(kind: ErrorKind, context: &str, err: anyhow::Error) -> Self {
        let kind = if err.downcast_ref::<AllocError>().is_some() {
            ErrorKind::AllocFailed
        } else {
            kind
        };
        Self::new(kind, format!("{}: {:#}", context, err))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Backends wrap resource exhaustion in this so it surfaces as `AllocFailed`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("allocation failed: {0}")]
pub struct AllocError(pub String);

pub(crate) trait BackendResultExt<T> {
    fn or_kind(self, kind: ErrorKind, context: &str) -> Result<T>;
}

impl<T> BackendResultExt<T> for anyhow::Result<T> {
    fn or_kind(self, kind: ErrorKind, context: &str) -> Result<T> {
        self.map_err(|e| BridgeError::from_backend(kind, context, e))
    }
}
