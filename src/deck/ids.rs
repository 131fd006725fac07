//! Deterministic identifiers
//!
//! Anki treats decks and note types with the same id as the same object on
//! import, and notes with the same GUID as the same note. Deriving all three
//! from content lets separate exports merge instead of duplicating.

use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));

const ID_FLOOR: u64 = 1 << 30;

/// Characters of Anki's base91 GUID alphabet
const BASE91_TABLE: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&()*+,-./:;<=>?@[]^_`{|}~";

/// Deck or note-type id for a name, in `[2^30, 2^31)`
pub fn stable_id(name: &str) -> i64 {
    let value = leading_u64(&Sha256::digest(name.as_bytes()));
    (ID_FLOOR + value % ID_FLOOR) as i64
}

/// Note GUID from the note's field values
pub fn note_guid<S: AsRef<str>>(values: &[S]) -> String {
    let joined = values
        .iter()
        .map(|v| v.as_ref())
        .collect::<Vec<_>>()
        .join("__");
    base91(leading_u64(&Sha256::digest(joined.as_bytes())))
}

/// Duplicate-detection checksum Anki stores per note: the first 8 hex digits
/// of the SHA-1 of the sort field with HTML tags removed.
pub fn field_checksum(sort_field: &str) -> i64 {
    let stripped = strip_html(sort_field);
    let digest = Sha1::digest(stripped.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as i64
}

fn leading_u64(digest: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn base91(mut value: u64) -> String {
    let base = BASE91_TABLE.len() as u64;
    let mut out = Vec::new();
    while value > 0 {
        out.push(BASE91_TABLE[(value % base) as usize]);
        value /= base;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn strip_html(text: &str) -> String {
    HTML_TAG.replace_all(text, "").trim().to_string()
}
