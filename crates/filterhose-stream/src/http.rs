use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;

use filterhose_core::{Credentials, StreamRequest, StreamTransport, TransportError, TransportResponse};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Produces the `Authorization` header for a streaming request.
pub trait RequestSigner: Send + Sync {
    fn authorization(
        &self,
        method: &str,
        url: &str,
        form: &[(String, String)],
        credentials: &Credentials,
    ) -> String;
}

/// Sends a fixed, externally computed header value on every request.
///
/// The credentials are ignored. An OAuth 1.0a signature covers a nonce, a
/// timestamp and the form body, so a fixed header stops being valid after the
/// first reconnect; endpoints that need one require a signer that computes the
/// header per request from the credentials.
pub struct StaticHeaderSigner {
    value: SecretString,
}

impl StaticHeaderSigner {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: SecretString::from(value.into()),
        }
    }
}

impl RequestSigner for StaticHeaderSigner {
    fn authorization(&self, _: &str, _: &str, _: &[(String, String)], _: &Credentials) -> String {
        self.value.expose_secret().to_string()
    }
}

/// Streaming POST over reqwest. Only connect time is bounded; the body is read
/// for as long as the remote keeps it open.
pub struct HttpTransport {
    client: Client,
    signer: Arc<dyn RequestSigner>,
}

impl HttpTransport {
    pub fn new(signer: Arc<dyn RequestSigner>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self { client, signer })
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn open(&self, request: &StreamRequest) -> Result<TransportResponse, TransportError> {
        let authorization =
            self.signer
                .authorization("POST", &request.url, &request.form, &request.credentials);

        let resp = self
            .client
            .post(&request.url)
            .header("authorization", authorization)
            .form(&request.form)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())));

        Ok(TransportResponse {
            status,
            body: Box::pin(body),
        })
    }
}
