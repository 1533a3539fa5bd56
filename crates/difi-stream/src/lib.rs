//! DIFI/VITA-49 stream engine.
//!
//! This is the "just works" layer. A [`DifiSink`] turns batches of complex
//! samples into timestamped data and context packets; a [`DifiSource`]
//! validates received packets and hands back samples with positioned
//! events (sequence gaps, context, static bit changes).
//!
//! Both are driven one step at a time by the host. Every blocking wait is
//! bounded by a configured timeout, so a step always returns.

pub mod config;
pub mod error;
pub mod event;
pub mod link;
pub mod sink;
pub mod source;

pub use config::{ContextPolicy, OperatingMode, SinkConfig, SourceConfig, DEFAULT_OUI, DEFAULT_PORT};
pub use error::{Result, StreamError};
pub use event::{ReceiveBatch, SinkEvent, StreamEvent, TaggedEvent};
pub use link::{Egress, Ingress, PacketInput, PacketOutput, TcpIngress};
pub use sink::DifiSink;
pub use source::DifiSource;
