use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("input error: {0}")]
    Input(String),

    #[error("malformed record in {file} line {line}: {reason}")]
    Malformed {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("duplicate transaction id '{trans_id}'")]
    DuplicateTransaction { trans_id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EtlResult<T> = Result<T, EtlError>;
