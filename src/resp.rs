//! The RESP wire protocol: five frame kinds, decoded from a buffered async
//! reader and encoded into a flat byte buffer. See `SPEC_FULL.md` §4.1.

mod decode;
mod encode;
mod error;
mod value;

pub use decode::read_value;
pub use encode::{encode, to_bytes};
pub use error::ProtocolError;
pub use value::Value;
