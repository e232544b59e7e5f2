use thiserror::Error;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("roster I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("roster format error: {0}")]
    Format(#[from] csv::Error),

    #[error("roster row {0} does not exist")]
    RowOutOfRange(usize),

    #[error("roster rewrite could not be persisted: {0}")]
    Persist(String),
}
