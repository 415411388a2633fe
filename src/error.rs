use thiserror::Error;

/// Failure of a single generation request.
///
/// Every variant carries enough text to be logged on its own; the worker never
/// surfaces these to the interactive loop beyond a diagnostic message and the
/// optional failure callback.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// Connection refused, reset, timed out, or the body could not be read.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status code.
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response (JSON envelope, base64 payload or image bytes) was malformed.
    #[error("decode error: {0}")]
    Decode(String),

    /// The in-flight request was aborted through `cancel_current`.
    #[error("generation cancelled")]
    Cancelled,

    /// Cancellation was requested while nothing was in flight.
    #[error("no generation in flight to cancel")]
    CancellationUnsupported,

    /// The worker task has exited; the request was dropped unexecuted.
    #[error("generation worker has shut down")]
    WorkerStopped,
}

impl GenerationError {
    /// Transport-level failures: network, status code, timeout and cancellation.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::Cancelled
        )
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_timeout() {
            Self::Transport(format!("request timed out: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}
