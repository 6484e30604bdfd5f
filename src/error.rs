// Closed error taxonomy for the client. Every fatal-to-call condition has
// its own variant; soft per-item failures never surface here, they are
// logged and recorded as null in the audit record instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP client itself could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// Network-level failure: connection refused, timeout, DNS, or the
    /// body stream breaking mid-read. Distinct from a non-2xx response.
    #[error("server unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    /// The server answered with a non-2xx status, on an upload or on an
    /// artifact download.
    #[error("request failed: {status} - {body}")]
    RequestFailed { status: u16, body: String },

    /// The response body was expected to be JSON but did not parse.
    #[error("response is not valid JSON: {body}")]
    InvalidResponse { body: String },

    /// The response parsed as JSON but the top level is not an object.
    #[error("response is not a JSON object: {body}")]
    InvalidResponseType { body: String },

    /// The batch folder contains no file with a recognized image extension.
    #[error("no images found in folder: {}", .0.display())]
    NoImagesFound(PathBuf),

    /// The video path does not exist or does not end in `.mp4`.
    #[error("invalid MP4 video file: {}", .0.display())]
    InvalidVideo(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode audit record: {0}")]
    Encode(#[from] serde_json::Error),
}
