use crate::photos::PhotoSource;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("photo not found")]
    NotFound,

    #[error("photo with id {0} already exists")]
    AlreadyExists(String),

    #[error("photo {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: PhotoSource,
        to: PhotoSource,
    },

    #[error("session expired, reauthenticate")]
    SessionExpired,

    #[error("runtime is shut down")]
    Shutdown,

    #[error("reqwest error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
