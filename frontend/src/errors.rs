use thiserror::Error;

/// Everything that can go wrong on the way to a reply. The `Display` text is
/// what gets appended to the assistant bubble.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ChatError {
    /// Connection refused, CORS failure, body read failure.
    #[error("{0}")]
    Network(String),

    /// Non-2xx status; carries the server's message or the status line.
    #[error("HTTP {0}")]
    Http(String),

    #[error("The request was aborted.")]
    Aborted,

    #[error("Could not encode request: {0}")]
    Encode(String),
}
