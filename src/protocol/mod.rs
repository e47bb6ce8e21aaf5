//! Wire-level protocol: message types, methods, errors and the line codec.

pub mod codec;
pub mod errors;
pub mod messages;
pub mod method;
#[allow(clippy::module_inception)]
pub mod protocol;

pub use codec::{ decode, encode, MessageCodec };
pub use errors::{ error_codes, Error };
pub use method::{ Method, MethodDirection };
pub use protocol::*;
