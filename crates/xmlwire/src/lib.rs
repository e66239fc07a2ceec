//! # XmlWire
//!
//! A sans-io codec for XML-RPC: the typed value model, the request serializer,
//! a streaming base64 parameter encoder and an event-driven response parser.
//!
//! ## Architecture
//!
//! Nothing here performs I/O. Requests are produced as string fragments that a
//! caller writes wherever it likes; responses are consumed chunk by chunk
//! through `ResponseParser::feed`, which tokenizes with `quick-xml` and drives a
//! state machine one event at a time. Chunk boundaries are never assumed to
//! align with tags or text.

mod binary;
mod date;
mod error;
mod parser;
mod ser;
mod to_value;
mod tokenizer;
mod value;


pub use binary::Base64Stream;
pub use error::Error;
pub use error::Fault;
pub use error::Result;
pub use parser::Response;
pub use parser::ResponseParser;
pub use parser::Scalar;
pub use parser::State;
pub use parser::parse_response;
pub use to_value::ValueSerializer;
pub use to_value::to_value;
pub use tokenizer::XmlEvent;
pub use tokenizer::XmlTokenizer;
pub use value::Members;
pub use value::Value;

/// The `dateTime.iso8601` sub-format.
pub mod iso8601 {
    pub use crate::date::DateTime;
    pub use crate::date::decode;
    pub use crate::date::encode;
}

/// Request and response envelope helpers.
pub mod envelope {
    pub use crate::binary::EPILOGUE as BINARY_EPILOGUE;
    pub use crate::binary::PREAMBLE as BINARY_PREAMBLE;
    pub use crate::ser::CALL_EPILOGUE;
    pub use crate::ser::MAX_RECURSION_DEPTH;
    pub use crate::ser::call_preamble;
    pub use crate::ser::encode_call;
    pub use crate::ser::encode_fault;
    pub use crate::ser::encode_param;
    pub use crate::ser::encode_response;
    pub use crate::ser::encode_value;
    pub use crate::ser::write_value;
}

pub use date::DateTime;
