//! Content-derived record identifiers
//!
//! Canonical form: the attributes are collected into a map sorted by key and
//! rendered as a compact JSON object (`{"a":"1","b":"2"}`). JSON string
//! escaping keeps the form unambiguous for any key or value. The SHA-256
//! digest of that text is hex-encoded in upper case, truncated to
//! [`DIGEST_CHARS`] characters and prefixed.
//!
//! The result depends only on the attribute set, never on insertion order,
//! randomness or the clock, so re-discovering an entity yields the same id.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Prefix for profile record identifiers
pub const PROFILE_PREFIX: &str = "P";

/// Number of hex digest characters kept (60 bits)
pub const DIGEST_CHARS: usize = 15;

/// Derives a stable identifier from `attributes`
///
/// When a key appears more than once the last value wins.
///
/// # Example
///
/// ```
/// use gallery_harvest::crawler::fingerprint;
///
/// let a = fingerprint("P", [("surname", "smith"), ("client_id", "42")]);
/// let b = fingerprint("P", [("client_id", "42"), ("surname", "smith")]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 16);
/// ```
pub fn fingerprint<'a, I>(prefix: &str, attributes: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let canonical: BTreeMap<&str, &str> = attributes.into_iter().collect();
    let digest = Sha256::digest(canonical_form(&canonical).as_bytes());
    let encoded = hex::encode_upper(digest);
    format!("{}{}", prefix, &encoded[..DIGEST_CHARS])
}

/// Renders sorted attributes as compact JSON
pub fn canonical_form(attributes: &BTreeMap<&str, &str>) -> String {
    let object: Map<String, Value> = attributes
        .iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect();
    Value::Object(object).to_string()
}
