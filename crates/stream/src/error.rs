use snafu::Snafu;

use crate::ids::MessageId;

/// Fatal failures of one chat stream.
///
/// Line-level decode failures are the exception: they are reported through
/// [`StreamError::Decode`] by the decoder but swallowed by the read loop.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StreamError {
    #[snafu(display("API error ({status}): {body}"))]
    Http {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("chat response on `{stage}` has an empty body"))]
    EmptyBody { stage: &'static str },
    #[snafu(display("transport failed on `{stage}`, {source}"))]
    Transport {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to build http client on `{stage}`, {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to decode chunk line on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("image upload of type '{mime_type}' was rejected on `{stage}`"))]
    UploadRejected {
        stage: &'static str,
        mime_type: String,
    },
    #[snafu(display("cancelled"))]
    Cancelled {
        stage: &'static str,
        message_id: MessageId,
    },
    #[snafu(display("stream for message {message_id} closed before a terminal event"))]
    ChannelClosed {
        stage: &'static str,
        message_id: MessageId,
    },
}

impl StreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
