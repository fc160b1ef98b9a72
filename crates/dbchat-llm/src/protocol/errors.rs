use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid function call: {0}")]
    InvalidFunctionCall(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
