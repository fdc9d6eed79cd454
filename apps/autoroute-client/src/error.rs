use thiserror::Error;

use crate::session::AuthState;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("login already in progress ({0:?})")]
    LoginInProgress(AuthState),
    #[error("already authenticated")]
    AlreadyAuthenticated,
    #[error("route computation cannot start: {0}")]
    StartBlocked(&'static str),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("client driver has shut down")]
    DriverGone,
}

pub type Result<T> = std::result::Result<T, ClientError>;
