#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// A newer fetch started before this one completed.
    Superseded(u64),
    Transport(String),
    Status(u16),
    Parse(String),
    InvalidPayload(&'static str),
}

impl std::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceError::Superseded(generation) => {
                write!(f, "fetch generation {generation} was superseded")
            }
            ResourceError::Transport(e) => write!(f, "transport error: {e}"),
            ResourceError::Status(code) => write!(f, "remote source answered with status {code}"),
            ResourceError::Parse(e) => write!(f, "unparsable resource payload: {e}"),
            ResourceError::InvalidPayload(msg) => write!(f, "invalid resource payload: {msg}"),
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<reqwest::Error> for ResourceError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ResourceError::Status(status.as_u16()),
            None => ResourceError::Transport(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ResourceError {
    fn from(e: serde_json::Error) -> Self {
        ResourceError::Parse(e.to_string())
    }
}
