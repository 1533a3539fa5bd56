//! DIFI/VITA-49 I/Q streaming over UDP and TCP.
//!
//! difi sends and receives complex baseband samples as DIFI signal data
//! packets, with periodic context packets describing the stream.
//!
//! # Crate Structure
//!
//! - [`transport`]: UDP and TCP sockets with bounded waits
//! - [`frame`]: header, data, context and timestamp codecs, TCP re-framing
//! - [`stream`]: the [`DifiSink`](stream::DifiSink) and
//!   [`DifiSource`](stream::DifiSource) framers
//!
//! ```no_run
//! use difi::stream::{DifiSink, SinkConfig};
//! use difi::Complex;
//!
//! let mut sink = DifiSink::connect(SinkConfig::default())?;
//! let tone = vec![Complex::new(1000i16, 0); 4000];
//! sink.work(&tone)?;
//! # Ok::<(), difi::stream::StreamError>(())
//! ```

pub use num_complex::Complex;

/// Re-export transport types.
pub mod transport {
    pub use difi_transport::*;
}

/// Re-export codec types.
pub mod frame {
    pub use difi_frame::*;
}

/// Re-export stream engine types.
pub mod stream {
    pub use difi_stream::*;
}
