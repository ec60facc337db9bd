use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;

use filterhose_core::{ByteStream, StreamRequest, StreamTransport, TransportError, TransportResponse};

/// How a scripted body finishes once its chunks are delivered.
#[derive(Clone, Debug)]
pub enum BodyEnd {
    /// Remote closes the stream.
    Close,
    /// Stays open without sending anything more.
    Hang,
    Error(TransportError),
}

/// Pre-programmed outcome for one `open` call.
pub enum ScriptedResponse {
    /// Status with an empty body.
    Status(u16),
    /// 200 with the given chunks, then `end`.
    Body { chunks: Vec<Bytes>, end: BodyEnd },
    /// 200 whose body is fed by the test through a channel.
    Channel(mpsc::Receiver<Result<Bytes, TransportError>>),
    /// `open` itself fails.
    Fail(TransportError),
    /// `open` never resolves, like a server that accepts and then goes quiet.
    Pending,
    /// Wait, then resolve with the inner response.
    Delay(Duration, Box<ScriptedResponse>),
}

impl ScriptedResponse {
    pub fn lines(lines: &[&str], end: BodyEnd) -> Self {
        Self::Body {
            chunks: lines
                .iter()
                .map(|l| Bytes::from(format!("{l}\r\n")))
                .collect(),
            end,
        }
    }

    pub fn hang() -> Self {
        Self::Body {
            chunks: Vec::new(),
            end: BodyEnd::Hang,
        }
    }
}

/// Transport returning scripted responses in order, for deterministic tests.
///
/// Once the script runs out every call fails with a connect error.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedResponse>>,
    calls: Mutex<Vec<(Instant, StreamRequest)>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, response: ScriptedResponse) {
        self.script.lock().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.calls.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    /// When each `open` call happened.
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn open(&self, request: &StreamRequest) -> Result<TransportResponse, TransportError> {
        self.calls.lock().push((Instant::now(), request.clone()));
        let next = self.script.lock().pop_front();
        respond(next).await
    }
}

fn respond(next: Option<ScriptedResponse>) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
    Box::pin(async move {
        match next {
            None => Err(TransportError::Connect("no scripted response left".into())),
            Some(ScriptedResponse::Fail(e)) => Err(e),
            Some(ScriptedResponse::Pending) => std::future::pending().await,
            Some(ScriptedResponse::Delay(wait, inner)) => {
                tokio::time::sleep(wait).await;
                respond(Some(*inner)).await
            }
            Some(ScriptedResponse::Status(status)) => Ok(TransportResponse {
                status,
                body: Box::pin(stream::empty::<Result<Bytes, TransportError>>()),
            }),
            Some(ScriptedResponse::Body { chunks, end }) => Ok(TransportResponse {
                status: 200,
                body: scripted_body(chunks, end),
            }),
            Some(ScriptedResponse::Channel(rx)) => Ok(TransportResponse {
                status: 200,
                body: Box::pin(ReceiverStream::new(rx)),
            }),
        }
    })
}

fn scripted_body(chunks: Vec<Bytes>, end: BodyEnd) -> ByteStream {
    let head = stream::iter(chunks.into_iter().map(Ok::<Bytes, TransportError>));
    match end {
        BodyEnd::Close => Box::pin(head),
        BodyEnd::Hang => Box::pin(head.chain(stream::pending())),
        BodyEnd::Error(e) => Box::pin(head.chain(stream::once(async move { Err(e) }))),
    }
}

#[cfg(test)]
mod tests {
    use filterhose_core::{Credentials, FilterSnapshot, StreamConfig};

    use super::*;

    fn request() -> StreamRequest {
        let creds = Credentials::new("key", "secret", "token", "tokenSecret").unwrap();
        StreamRequest::new(&StreamConfig::default(), &creds, &FilterSnapshot::default())
    }

    #[tokio::test]
    async fn replays_script_then_fails() {
        let transport = ScriptedTransport::new(vec![
            ScriptedResponse::Status(420),
            ScriptedResponse::lines(&[r#"{"text":"Taco"}"#], BodyEnd::Close),
        ]);

        let first = transport.open(&request()).await.unwrap();
        assert_eq!(first.status, 420);

        let mut second = transport.open(&request()).await.unwrap();
        assert_eq!(second.status, 200);
        let chunk = second.body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"{\"text\":\"Taco\"}\r\n");
        assert!(second.body.next().await.is_none());

        let third = transport.open(&request()).await;
        assert!(matches!(third, Err(TransportError::Connect(_))));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_resolves_inner_response_later() {
        let transport = ScriptedTransport::new(vec![ScriptedResponse::Delay(
            Duration::from_secs(10),
            Box::new(ScriptedResponse::Status(503)),
        )]);
        let start = Instant::now();
        let resp = transport.open(&request()).await.unwrap();
        assert_eq!(resp.status, 503);
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_never_resolves() {
        let transport = ScriptedTransport::new(vec![ScriptedResponse::Pending]);
        let open = tokio::time::timeout(Duration::from_secs(3600), transport.open(&request())).await;
        assert!(open.is_err());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn body_can_end_with_error() {
        let transport = ScriptedTransport::new(vec![ScriptedResponse::Body {
            chunks: vec![],
            end: BodyEnd::Error(TransportError::Read("reset".into())),
        }]);
        let mut resp = transport.open(&request()).await.unwrap();
        assert_eq!(
            resp.body.next().await,
            Some(Err(TransportError::Read("reset".into())))
        );
    }
}
