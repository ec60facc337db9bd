pub mod client;
pub mod demux;
pub mod frame;
pub mod http;
pub mod watchdog;

mod supervisor;

pub mod mock;

pub use client::FilterStream;
pub use http::{HttpTransport, RequestSigner, StaticHeaderSigner};
pub use mock::{BodyEnd, ScriptedResponse, ScriptedTransport};
