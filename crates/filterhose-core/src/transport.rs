use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::config::StreamConfig;
use crate::credentials::Credentials;
use crate::errors::TransportError;
use crate::filters::FilterSnapshot;

/// Response body as delivered by the transport, chunked arbitrarily.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// One POST to the filter endpoint.
#[derive(Clone, Debug)]
pub struct StreamRequest {
    pub url: String,
    pub credentials: Credentials,
    pub form: Vec<(String, String)>,
}

impl StreamRequest {
    pub fn new(config: &StreamConfig, credentials: &Credentials, filters: &FilterSnapshot) -> Self {
        let mut form = filters.form_fields();
        if let Some(mode) = &config.tweet_mode {
            form.push(("tweet_mode".to_string(), mode.clone()));
        }
        Self {
            url: config.endpoint.clone(),
            credentials: credentials.clone(),
            form,
        }
    }

    pub fn form_value(&self, field: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.as_str())
    }
}

/// Status line plus the (possibly still open) body.
pub struct TransportResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Opens the streaming POST. Implementations own signing and HTTP details;
/// dropping the returned body aborts the connection.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self, request: &StreamRequest) -> Result<TransportResponse, TransportError>;
}
