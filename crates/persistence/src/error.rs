//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Instance not found: {0}")]
    NotFound(String),

    #[error("Instance {instance_id} belongs to another user")]
    Forbidden { instance_id: String },

    #[error("Invalid title: {0}")]
    InvalidTitle(String),
}

impl From<PersistenceError> for advisor_core::Error {
    fn from(err: PersistenceError) -> Self {
        advisor_core::Error::History(err.to_string())
    }
}
