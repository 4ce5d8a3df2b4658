use thiserror::Error;

/// Failure to read a member identity or unit from text or bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("unrecognized address '{0}' (expected qv1…, 0x… or label:…)")]
    UnrecognizedAddress(String),

    #[error("member identity must be {expected} bytes, found {found}")]
    WrongLength { expected: usize, found: usize },

    #[error("address prefix '{0}' does not belong to this ledger")]
    ForeignPrefix(String),

    #[error("malformed hex identity: {0}")]
    MalformedHex(String),

    #[error("malformed qv1 identity: {0}")]
    MalformedBech32(String),
}

impl From<hex::FromHexError> for TypesError {
    fn from(err: hex::FromHexError) -> Self {
        Self::MalformedHex(err.to_string())
    }
}
