//! IPROTO framing: request encoding, response decoding, greeting, auth.

pub mod auth;
pub mod constant;
pub mod greeting;
pub mod request;
pub mod response;

pub use constant::{IteratorType, RequestType};
pub use greeting::{parse_greeting, Greeting};
pub use request::RequestEncoder;
pub use response::{decode_response, ErrorDesc, ErrorStack, Response, ResponseHeader};

#[cfg(test)]
mod request_test;
