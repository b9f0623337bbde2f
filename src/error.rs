use crate::cluster::broker::BrokerId;

pub type Result<T> = std::result::Result<T, MilenaError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum MilenaError {
    /// Another broker already holds the controller record. Control flow for the
    /// election state machine, never surfaced to external callers.
    #[error("controller already exists with id {controller_id}")]
    ControllerExists { controller_id: BrokerId },

    #[error("not enough brokers ({brokers}) for replication factor {replication_factor}")]
    InsufficientBrokers {
        brokers: usize,
        replication_factor: u32,
    },

    #[error("topic {topic} already exists")]
    TopicExists { topic: String },

    #[error("no node at {path}")]
    NoNode { path: String },

    #[error("node already exists at {path}")]
    NodeExists { path: String },

    #[error("could not read configuration {file_path}: {error_msg}")]
    Config {
        file_path: String,
        error_msg: String,
    },

    #[error("{error_msg}")]
    Internal { error_msg: String },
}

impl From<serde_json::Error> for MilenaError {
    fn from(err: serde_json::Error) -> Self {
        MilenaError::Internal {
            error_msg: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for MilenaError {
    fn from(err: tokio::task::JoinError) -> Self {
        MilenaError::Internal {
            error_msg: err.to_string(),
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for MilenaError {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        MilenaError::Internal {
            error_msg: err.to_string(),
        }
    }
}
