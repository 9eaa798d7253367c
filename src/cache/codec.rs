use crate::Result;
use ohno::IntoAppError;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Payload serialization for cached values.
///
/// The memoization layer never interprets payloads; a failing codec is
/// reported to it like any other cache fault and degrades to a live fetch.
pub trait Codec<T> {
    /// Serialize a value into the payload stored in the cache.
    fn encode(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a payload fetched from the cache.
    fn decode(&self, payload: &[u8]) -> Result<T>;
}

/// The default serde_json codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl<T> Codec<T> for Json
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).into_app_err_with(|| "serializing cache payload".to_string())
    }

    fn decode(&self, payload: &[u8]) -> Result<T> {
        serde_json::from_slice(payload).into_app_err_with(|| "deserializing cache payload".to_string())
    }
}
