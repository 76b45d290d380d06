//! Transport implementations shared by all client sessions.

pub mod bundled;
pub mod http;
pub mod sse_parser;
pub mod stdio;
pub mod transport;

pub use bundled::BundledTransport;
pub use http::{HttpTransport, HttpTransportConfig};
pub use sse_parser::{SseEvent, SseParser};
pub use stdio::StdioTransport;
pub use transport::Transport;
