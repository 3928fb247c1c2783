use thiserror::Error;

/// Common result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("unknown service or group: {0}")]
    Unknown(String),
    #[error("sudo required for: {}", .0.join(", "))]
    SudoRequired(Vec<String>),
    #[error("{service}: command exited with {status}")]
    CommandFailed { service: String, status: String },
    #[error("{service}: process exited during launch")]
    LaunchFailed { service: String },
    #[error("Already running")]
    AlreadyRunning,
    #[error("Not running")]
    NotRunning,
    #[error("{service}: {message}")]
    Service { service: String, message: String },
    #[error("{op} group {group}: {source}")]
    Trace {
        group: String,
        op: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Service { service: service.into(), message: message.into() }
    }

    /// Wrap with the group that re-raised this error.
    pub fn traced(self, op: &'static str, group: &str) -> Self {
        Error::Trace { group: group.to_string(), op, source: Box::new(self) }
    }

    /// Innermost error beneath any trace layers.
    pub fn root(&self) -> &Error {
        let mut err = self;
        while let Error::Trace { source, .. } = err {
            err = source;
        }
        err
    }

    /// Groups that re-raised this error, innermost last.
    pub fn trail(&self) -> Vec<&str> {
        let mut groups = Vec::new();
        let mut err = self;
        while let Error::Trace { group, source, .. } = err {
            groups.push(group.as_str());
            err = source;
        }
        groups
    }
}
