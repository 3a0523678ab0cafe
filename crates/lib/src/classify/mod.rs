//! Classification of build artifacts.
//!
//! Every artifact flowing through the pipeline carries a set of content types
//! (what it is) and a set of scopes (where it comes from). Both are encoded as
//! bitmasks so that a set fits into a single directory-name segment.

pub mod codec;
pub mod types;

pub use codec::{decode, encode};
pub use types::{Classification, ContentType, ContentTypes, LAYOUT_VERSION, Scope, Scopes, describe, from_mask, mask_of};
