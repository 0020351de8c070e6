//! Closure-backed coder for externally provided encode/decode pairs.

use std::marker::PhantomData;

use super::Coder;
use crate::error::Result;

/// Coder built from an encode closure and a decode closure.
///
/// Use this to plug in serialization schemes the crate does not ship, e.g.
/// a protobuf runtime:
///
/// ```
/// use wirecall::codec::{Coder, FnCoder};
///
/// let coder = FnCoder::new(
///     |msg: &String| Ok(msg.as_bytes().to_vec()),
///     |bytes| Ok(String::from_utf8_lossy(bytes).into_owned()),
/// );
/// let bytes = coder.encode(&"hello".to_string()).unwrap();
/// assert_eq!(coder.decode(&bytes).unwrap(), "hello");
/// ```
pub struct FnCoder<M, E, D> {
    encoder: E,
    decoder: D,
    _marker: PhantomData<fn() -> M>,
}

impl<M, E, D> FnCoder<M, E, D>
where
    E: Fn(&M) -> Result<Vec<u8>> + Send + Sync,
    D: Fn(&[u8]) -> Result<M> + Send + Sync,
{
    /// Wrap an encoder and a decoder into one coder.
    pub fn new(encoder: E, decoder: D) -> Self {
        Self {
            encoder,
            decoder,
            _marker: PhantomData,
        }
    }
}

impl<M, E, D> Clone for FnCoder<M, E, D>
where
    E: Clone,
    D: Clone,
{
    fn clone(&self) -> Self {
        Self {
            encoder: self.encoder.clone(),
            decoder: self.decoder.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M, E, D> Coder for FnCoder<M, E, D>
where
    M: Send + Sync,
    E: Fn(&M) -> Result<Vec<u8>> + Send + Sync,
    D: Fn(&[u8]) -> Result<M> + Send + Sync,
{
    type Message = M;

    fn encode(&self, message: &M) -> Result<Vec<u8>> {
        (self.encoder)(message)
    }

    fn decode(&self, bytes: &[u8]) -> Result<M> {
        (self.decoder)(bytes)
    }
}
