//! Codec module - pluggable message encode/decode pairs.
//!
//! A [`Coder`] binds an encode/decode pair to one message type. Coders are
//! stateless: construct one per message schema and share it freely.
//!
//! - [`MsgPackCoder`] - MessagePack via `rmp-serde` (struct-as-map format)
//! - [`FnCoder`] - wraps a pair of closures for schemes the crate does not
//!   ship (protobuf, JSON, hand-rolled binary)
//!
//! # Example
//!
//! ```
//! use wirecall::codec::{Coder, MsgPackCoder};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Search { name: String }
//!
//! let coder = MsgPackCoder::<Search>::new();
//! let bytes = coder.encode(&Search { name: "foo".into() }).unwrap();
//! let back = coder.decode(&bytes).unwrap();
//! assert_eq!(back, Search { name: "foo".into() });
//! ```

mod fncoder;
mod msgpack;

pub use fncoder::FnCoder;
pub use msgpack::MsgPackCoder;

use crate::error::Result;

/// Stateless encode/decode pair bound to a specific message type.
///
/// Decode failures must surface as [`WirecallError::Decode`]
/// (crate::WirecallError::Decode), never be swallowed.
pub trait Coder: Send + Sync {
    /// The message type this coder is bound to.
    type Message;

    /// Encode a message to wire bytes.
    fn encode(&self, message: &Self::Message) -> Result<Vec<u8>>;

    /// Decode wire bytes back into a message.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Message>;
}
