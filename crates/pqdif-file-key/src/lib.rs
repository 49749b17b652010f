//! Opaque PQDIF file keys
//!
//! A [`FileKey`] is URL-safe base64 over the JSON object `{"name", "salt"}`.
//! It round-trips to the display name it was generated for, while the salt
//! keeps two uploads of the same file name apart. Keys are not content
//! hashes: uniqueness is checked by the caller against the keys that are
//! already stored, regenerating on collision.

mod error;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use error::{KeyError, Result};

/// Upper bound for [`generate_unique`] before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// Decoded contents of a file key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyData {
    pub name: String,
    #[serde(default)]
    pub salt: u64,
}

/// A stored file as the persistent tier lists it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub key: FileKey,
    pub name: String,
}

impl KeyEntry {
    /// Build an entry from a key, taking the name embedded in it
    pub fn from_key(key: FileKey) -> Result<Self> {
        let name = key.name()?;
        Ok(Self { key, name })
    }
}

/// Opaque file key token
///
/// Any string can be wrapped; use [`FileKey::decode`] (or `parse`) to find
/// out whether it is one of ours.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileKey(String);

impl FileKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Decode the `{name, salt}` payload
    pub fn decode(&self) -> Result<KeyData> {
        decode(&self.0)
    }

    /// Display name embedded in the key
    pub fn name(&self) -> Result<String> {
        self.decode().map(|data| data.name)
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FileKey {
    type Err = KeyError;

    /// Parse and validate a key token
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        decode(s)?;
        Ok(FileKey(s.to_string()))
    }
}

impl From<String> for FileKey {
    fn from(raw: String) -> Self {
        FileKey(raw)
    }
}

impl From<&str> for FileKey {
    fn from(raw: &str) -> Self {
        FileKey(raw.to_string())
    }
}

impl AsRef<str> for FileKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Encode key data into a key token
pub fn encode(data: &KeyData) -> FileKey {
    // Serializing a struct of a String and a u64 cannot fail
    let json = serde_json::to_vec(data).unwrap_or_default();
    FileKey(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a key token into its `{name, salt}` payload
pub fn decode(key: &str) -> Result<KeyData> {
    let bytes = URL_SAFE_NO_PAD.decode(key.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Generate a fresh key for `name` with a random salt
pub fn generate(name: &str) -> FileKey {
    generate_with(&mut fastrand::Rng::new(), name)
}

/// Generate a key drawing the salt from `rng`
pub fn generate_with(rng: &mut fastrand::Rng, name: &str) -> FileKey {
    encode(&KeyData {
        name: name.to_string(),
        salt: rng.u64(..),
    })
}

/// Generate a key that `is_taken` does not reject
///
/// Returns the first candidate for which `is_taken` answers `false`. Fails
/// with [`KeyError::Exhausted`] after `max_attempts` rejected candidates.
pub fn generate_unique<F>(name: &str, max_attempts: u32, is_taken: F) -> Result<FileKey>
where
    F: FnMut(&FileKey) -> bool,
{
    generate_unique_with(&mut fastrand::Rng::new(), name, max_attempts, is_taken)
}

/// [`generate_unique`] with an explicit salt source
pub fn generate_unique_with<F>(
    rng: &mut fastrand::Rng,
    name: &str,
    max_attempts: u32,
    mut is_taken: F,
) -> Result<FileKey>
where
    F: FnMut(&FileKey) -> bool,
{
    for _ in 0..max_attempts {
        let candidate = generate_with(rng, name);
        if !is_taken(&candidate) {
            return Ok(candidate);
        }
    }

    Err(KeyError::Exhausted {
        name: name.to_string(),
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_round_trip_name() {
        for name in ["trace.pqd", "", "with space (2).pqd", "ünïcødé/слэш.pqd"] {
            let key = generate(name);
            assert_eq!(key.name().unwrap(), name);
        }
    }

    #[test]
    fn test_encode_decode_inverse() {
        let data = KeyData {
            name: "feeder-7.pqd".to_string(),
            salt: 42,
        };
        let key = encode(&data);
        assert_eq!(key.decode().unwrap(), data);
    }

    #[test]
    fn test_key_is_url_safe() {
        let key = generate("a/b+c?d=e.pqd");
        assert!(key
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_same_name_different_keys() {
        let mut rng = fastrand::Rng::with_seed(11);
        let a = generate_with(&mut rng, "trace.pqd");
        let b = generate_with(&mut rng, "trace.pqd");
        assert_ne!(a, b);
        assert_eq!(a.name().unwrap(), b.name().unwrap());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("!!not base64!!").unwrap_err().is_malformed());

        // Valid base64, but not JSON
        let not_json = URL_SAFE_NO_PAD.encode(b"hello");
        assert!(matches!(decode(&not_json), Err(KeyError::Json(_))));

        // JSON without a name
        let nameless = URL_SAFE_NO_PAD.encode(br#"{"salt":1}"#);
        assert!(matches!(decode(&nameless), Err(KeyError::Json(_))));
    }

    #[test]
    fn test_decode_tolerates_missing_salt() {
        let key = URL_SAFE_NO_PAD.encode(br#"{"name":"old.pqd"}"#);
        let data = decode(&key).unwrap();
        assert_eq!(data.name, "old.pqd");
        assert_eq!(data.salt, 0);
    }

    #[test]
    fn test_from_str_validates() {
        assert!("garbage!".parse::<FileKey>().is_err());
        let key = generate("x.pqd");
        let parsed: FileKey = key.as_str().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_from_str_stores_trimmed_token() {
        let key = generate("x.pqd");
        let padded = format!("  {}\n", key);
        let parsed: FileKey = padded.parse().unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.as_str(), key.as_str());
    }

    #[test]
    fn test_generate_unique_retries_on_collision() {
        let mut rejected = 0;
        let key = generate_unique("trace.pqd", DEFAULT_MAX_ATTEMPTS, |_| {
            rejected += 1;
            rejected <= 3
        })
        .unwrap();

        assert_eq!(rejected, 4);
        assert_eq!(key.name().unwrap(), "trace.pqd");
    }

    #[test]
    fn test_generate_unique_skips_existing_keys() {
        // Two generators with the same seed produce the same candidates,
        // so the second must move past everything the first produced.
        let mut first = fastrand::Rng::with_seed(5);
        let existing: HashSet<FileKey> = (0..3)
            .map(|_| generate_with(&mut first, "trace.pqd"))
            .collect();

        let mut second = fastrand::Rng::with_seed(5);
        let key = generate_unique_with(&mut second, "trace.pqd", 10, |k| existing.contains(k))
            .unwrap();
        assert!(!existing.contains(&key));
    }

    #[test]
    fn test_generate_unique_exhausted() {
        let err = generate_unique("trace.pqd", 5, |_| true).unwrap_err();
        assert!(matches!(err, KeyError::Exhausted { attempts: 5, .. }));
    }

    #[test]
    fn test_key_entry_from_key() {
        let key = generate("trace.pqd");
        let entry = KeyEntry::from_key(key.clone()).unwrap();
        assert_eq!(entry.name, "trace.pqd");
        assert_eq!(entry.key, key);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["name"], "trace.pqd");
        assert_eq!(json["key"], key.as_str());

        assert!(KeyEntry::from_key(FileKey::from("%%%")).is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let key = FileKey::from("abc");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"abc\"");
        let back: FileKey = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, key);
    }
}
