use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Atomic reference-counted string type used for identifiers and locale codes.
pub type ArcStr = Arc<str>;

/// Suffix appended to a permalink to obtain the identifier of its JSON twin.
pub const JSON_SUFFIX: &str = ".json";

/// Returns the JSON identifier for an HTML permalink.
///
/// Every cross-reference between documents uses this rule, the client relies
/// on it being bit-exact.
pub fn json_id(permalink: &str) -> String {
    let mut id = String::with_capacity(permalink.len() + JSON_SUFFIX.len());
    id.push_str(permalink);
    id.push_str(JSON_SUFFIX);
    id
}

/// A 32-byte BLAKE3 hash used as the fingerprint of a projected task.
///
/// The host executor compares fingerprints between runs to decide whether a
/// task is stale, so the value must only depend on the inputs of the task.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    /// Hashes the canonical JSON encoding of a value.
    pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        let mut hasher = Blake3Hasher::default();
        serde_json::to_writer(&mut hasher, value)?;
        Ok(hasher.finalize())
    }

    /// Folds several hashes into one, order matters.
    pub fn combine(parts: &[Hash32]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(&part.0);
        }
        hasher.finalize().into()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for &byte in &self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Streaming BLAKE3 hasher usable as an [`std::io::Write`] sink for
/// serializers.
#[derive(Default)]
pub(crate) struct Blake3Hasher(blake3::Hasher);

impl Blake3Hasher {
    pub(crate) fn finalize(&self) -> Hash32 {
        let bytes: [u8; 32] = self.0.finalize().into();
        Hash32::from(bytes)
    }
}

impl std::io::Write for Blake3Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
