//! Shared foundational types used across the kiln graph cache.
//!
//! This crate provides the dynamic value model carried by node inputs, the
//! canonical hashable projection used to build cache keys, and the content
//! fingerprint used to display and compare those keys compactly.

#![warn(missing_docs)]

pub mod hash;
pub mod hashable;
pub mod value;

pub use hash::{ContentHash, ContentHasher};
pub use hashable::{to_hashable, Hashable, ToHashable};
pub use value::{OpaqueValue, Value};
