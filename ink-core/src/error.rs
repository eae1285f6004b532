use ink_types::ErrorKind;

/// Ways a round can fail. Every variant leaves the engine in `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    #[error("{0}")]
    InputValidation(String),
    #[error("{0}")]
    UpstreamFailure(String),
    #[error("Login required to submit an attempt")]
    AuthorizationRequired,
}

impl RoundError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoundError::InputValidation(_) => ErrorKind::InputValidation,
            RoundError::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
            RoundError::AuthorizationRequired => ErrorKind::AuthorizationRequired,
        }
    }

    pub fn upstream(err: impl std::fmt::Display) -> Self {
        RoundError::UpstreamFailure(err.to_string())
    }
}
