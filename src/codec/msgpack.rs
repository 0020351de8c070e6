//! MessagePack coder using `rmp-serde`.
//!
//! Uses `to_vec_named` so structs serialize as maps (with field names) rather
//! than positional arrays, which keeps payloads readable by non-Rust peers.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Coder;
use crate::error::{Result, WirecallError};

/// MessagePack coder for one serde-compatible message type.
pub struct MsgPackCoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> MsgPackCoder<T> {
    /// Create a coder bound to `T`.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for MsgPackCoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MsgPackCoder<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Coder for MsgPackCoder<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    type Message = T;

    fn encode(&self, message: &T) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(message).map_err(|e| WirecallError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(|e| WirecallError::Decode(e.to_string()))
    }
}
