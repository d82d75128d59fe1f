use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use snafu::ResultExt;

use crate::auth::TokenProvider;
use crate::error::{
    BuildClientSnafu, EmptyBodySnafu, HttpSnafu, StreamResult, TransportSnafu,
};
use crate::request::ChatRequest;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
/// Raw response body, one item per network read.
pub type ByteStream = Pin<Box<dyn Stream<Item = StreamResult<Bytes>> + Send>>;

/// Opens the streamed response for one chat request.
pub trait ChatTransport: Send + Sync {
    fn open<'a>(&'a self, request: &'a ChatRequest) -> BoxFuture<'a, StreamResult<ByteStream>>;
}

/// `reqwest`-backed transport POSTing JSON to the chat endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> StreamResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context(BuildClientSnafu {
                stage: "build-http-client",
            })?;
        Ok(Self::with_client(client, endpoint, tokens))
    }

    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim().to_string(),
            tokens,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn open_response(&self, request: &ChatRequest) -> StreamResult<ByteStream> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(token) = self.tokens.token() {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.context(TransportSnafu {
            stage: "send-chat-request",
        })?;
        let status = response.status();

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    "chat request unauthorized; clearing token"
                );
                self.tokens.clear();
            }
            let body = response.text().await.context(TransportSnafu {
                stage: "read-error-body",
            })?;
            tracing::error!(
                endpoint = %self.endpoint,
                status = status.as_u16(),
                body = %body,
                "chat request failed"
            );
            return HttpSnafu {
                stage: "chat-http-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        if response.content_length() == Some(0) {
            return EmptyBodySnafu {
                stage: "chat-response-body",
            }
            .fail();
        }

        tracing::debug!(endpoint = %self.endpoint, status = status.as_u16(), "chat stream opened");
        let body = response.bytes_stream().map(|item| {
            item.context(TransportSnafu {
                stage: "read-chat-stream",
            })
        });
        Ok(Box::pin(body))
    }
}

impl ChatTransport for HttpTransport {
    fn open<'a>(&'a self, request: &'a ChatRequest) -> BoxFuture<'a, StreamResult<ByteStream>> {
        Box::pin(self.open_response(request))
    }
}
