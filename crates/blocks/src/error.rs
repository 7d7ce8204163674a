use thiserror::Error;

/// Errors surfaced by the block streamer façade.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamerError {
    /// `push` was called after `complete` or `abort`.
    #[error("stream already completed")]
    CompletedStream,
}

/// Errors raised when registering or resolving channel profiles.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    /// No profile with the requested name is registered.
    #[error("unknown channel profile '{0}'")]
    Unknown(String),

    /// `max_chars` is smaller than `min_chars`.
    #[error("profile '{name}': max_chars ({max_chars}) must not be smaller than min_chars ({min_chars})")]
    InvalidCharBudget {
        /// The offending profile name.
        name: String,
        /// The configured upper character bound.
        max_chars: usize,
        /// The configured lower character bound.
        min_chars: usize,
    },

    /// `max_lines` is zero.
    #[error("profile '{0}': max_lines must be at least 1")]
    InvalidLineBudget(String),

    /// `min_chars` is zero.
    #[error("profile '{0}': min_chars must be at least 1")]
    MissingMinChars(String),

    /// The profile name is empty.
    #[error("profile name must not be empty")]
    MissingName,
}
