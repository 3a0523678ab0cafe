//! Hexadecimal folder-name codec.
//!
//! An intermediate root is laid out as `{kind}/{typesHex}/{scopesHex}/{artifact}`.
//! Decoding those segments is how a later build recovers the classification of
//! each artifact without any separate index.

use std::collections::BTreeSet;

use super::types::{Classification, from_mask, mask_of};

/// Encode a set as a lowercase hexadecimal segment.
pub fn encode<'a, T, I>(items: I) -> String
where
  T: Classification,
  I: IntoIterator<Item = &'a T>,
{
  format!("{:x}", mask_of(items))
}

/// Decode a hexadecimal segment into the known members it names.
///
/// Returns `None` for anything that is not a classification folder: names
/// that are not plain hex, or masks with no known bit set.
pub fn decode<T: Classification>(segment: &str) -> Option<BTreeSet<T>> {
  if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_hexdigit()) {
    return None;
  }

  let mask = u32::from_str_radix(segment, 16).ok()?;
  let items = from_mask::<T>(mask);
  if items.is_empty() { None } else { Some(items) }
}
