//! # XmlCall
//!
//! XML-RPC method calls over a pluggable HTTP transport.
//!
//! ## Architecture
//!
//! A `Client` starts `Call`s. A call serializes params as they are pushed,
//! either into a buffer sent in one piece or straight onto an already open
//! request, and then feeds the response body to an incremental `xmlwire`
//! parser chunk by chunk. Calls run inline with `Call::finish`, or on their
//! own task with `Call::dispatch`, which returns an abortable `PendingCall`.

pub mod call;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod mock_transport;
pub mod pending;
pub mod stats;
pub mod transport;


pub use call::BinaryParam;
pub use call::Call;
pub use call::CallState;
pub use client::Client;
pub use config::ClientConfig;
pub use config::Mode;
pub use error::Error;
pub use error::Result;
pub use pending::PendingCall;
pub use stats::CallStats;
