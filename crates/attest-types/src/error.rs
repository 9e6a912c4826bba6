use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypesError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid device address: {0}")]
    InvalidDeviceAddress(String),

    #[error("Invalid unit id: {0}")]
    InvalidUnitId(String),

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Unknown variant for {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TypesError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TypesError>;
