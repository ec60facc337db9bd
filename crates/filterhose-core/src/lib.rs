pub mod backoff;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod filters;
pub mod transport;

pub use backoff::{BackoffClass, BackoffExhausted, BackoffPolicy, BackoffSet, Step};
pub use config::StreamConfig;
pub use credentials::Credentials;
pub use errors::{ConfigError, FailureKind, StreamError, TransportError};
pub use events::{ConnectionState, StreamEvent, StreamMessage};
pub use filters::{FilterCategory, FilterRegistry, FilterSet, FilterSnapshot};
pub use transport::{ByteStream, StreamRequest, StreamTransport, TransportResponse};
