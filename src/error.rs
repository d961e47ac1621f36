use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollErrorCode {
    NotPrimary,
    NamespaceNotFound,
    NamespaceExists,
    CommandNotSupportedOnView,
    IllegalOperation,
    InvalidNamespace,
    CommandFailed,
    BadValue,
    TypeMismatch,
    DocumentValidationFailed,
    WriteConflict,
    Interrupted,
    Decode,
}

impl ScrollErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ScrollErrorCode::NotPrimary => "not_primary",
            ScrollErrorCode::NamespaceNotFound => "namespace_not_found",
            ScrollErrorCode::NamespaceExists => "namespace_exists",
            ScrollErrorCode::CommandNotSupportedOnView => "command_not_supported_on_view",
            ScrollErrorCode::IllegalOperation => "illegal_operation",
            ScrollErrorCode::InvalidNamespace => "invalid_namespace",
            ScrollErrorCode::CommandFailed => "command_failed",
            ScrollErrorCode::BadValue => "bad_value",
            ScrollErrorCode::TypeMismatch => "type_mismatch",
            ScrollErrorCode::DocumentValidationFailed => "document_validation_failed",
            ScrollErrorCode::WriteConflict => "write_conflict",
            ScrollErrorCode::Interrupted => "interrupted",
            ScrollErrorCode::Decode => "decode",
        }
    }
}

#[derive(Debug, Error)]
pub enum ScrollError {
    #[error("not primary: {0}")]
    NotPrimary(String),
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),
    #[error("namespace exists: {0}")]
    NamespaceExists(String),
    #[error("command not supported on view: {0}")]
    CommandNotSupportedOnView(String),
    #[error("illegal operation: {0}")]
    IllegalOperation(String),
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("bad value: {0}")]
    BadValue(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("document failed validation on {namespace}")]
    DocumentValidationFailed { namespace: String },
    /// Transient storage-engine conflict; absorbed by the write-conflict
    /// retry primitive and never surfaced to callers outside it.
    #[error("write conflict")]
    WriteConflict,
    #[error("operation was interrupted")]
    Interrupted,
    #[error("decode error: {0}")]
    Decode(String),
}

impl ScrollError {
    pub fn code(&self) -> ScrollErrorCode {
        match self {
            ScrollError::NotPrimary(_) => ScrollErrorCode::NotPrimary,
            ScrollError::NamespaceNotFound(_) => ScrollErrorCode::NamespaceNotFound,
            ScrollError::NamespaceExists(_) => ScrollErrorCode::NamespaceExists,
            ScrollError::CommandNotSupportedOnView(_) => ScrollErrorCode::CommandNotSupportedOnView,
            ScrollError::IllegalOperation(_) => ScrollErrorCode::IllegalOperation,
            ScrollError::InvalidNamespace(_) => ScrollErrorCode::InvalidNamespace,
            ScrollError::CommandFailed(_) => ScrollErrorCode::CommandFailed,
            ScrollError::BadValue(_) => ScrollErrorCode::BadValue,
            ScrollError::TypeMismatch(_) => ScrollErrorCode::TypeMismatch,
            ScrollError::DocumentValidationFailed { .. } => {
                ScrollErrorCode::DocumentValidationFailed
            }
            ScrollError::WriteConflict => ScrollErrorCode::WriteConflict,
            ScrollError::Interrupted => ScrollErrorCode::Interrupted,
            ScrollError::Decode(_) => ScrollErrorCode::Decode,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub fn is_write_conflict(&self) -> bool {
        matches!(self, ScrollError::WriteConflict)
    }
}

impl From<bson::ser::Error> for ScrollError {
    fn from(err: bson::ser::Error) -> Self {
        ScrollError::Decode(err.to_string())
    }
}

impl From<bson::de::Error> for ScrollError {
    fn from(err: bson::de::Error) -> Self {
        ScrollError::Decode(err.to_string())
    }
}
