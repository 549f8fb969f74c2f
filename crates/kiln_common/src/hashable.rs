//! Canonical, order-independent hashable projection of [`Value`]s.
//!
//! Cache keys are built by projecting nested values into [`Hashable`]:
//! primitives pass through (integral floats as integers, so `1` and `1.0`
//! share a key), mappings become key-sorted sets of pairs, and
//! sequences become sets of `(index, element)` pairs. Anything without a
//! structural form becomes [`Hashable::Unrepresentable`], which never compares
//! equal to anything, itself included, so it can never produce a false cache hit.

use ordered_float::OrderedFloat;
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::hash::{ContentHash, ContentHasher};
use crate::value::Value;

/// The projected, hashable form of a value.
///
/// # Equality
///
/// `Unrepresentable` is irreflexive: it is unequal to every value including
/// another `Unrepresentable` and itself, and so is every `Set` that contains
/// one. Such keys can be inserted into a hash map but are never found again,
/// which turns them into guaranteed cache misses that the next garbage
/// collection pass removes.
#[derive(Clone, Debug)]
pub enum Hashable {
    /// The absent value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A float with total equality.
    Float(OrderedFloat<f64>),
    /// A string.
    Str(String),
    /// A canonically ordered set of `(key, value)` pairs.
    ///
    /// Mappings are ordered by key and sequences by index, so two sets with
    /// the same members always hold them in the same order.
    Set(Vec<(Hashable, Hashable)>),
    /// Content with no structural form.
    Unrepresentable,
}

impl Hashable {
    /// Returns `true` if no `Unrepresentable` marker occurs anywhere inside.
    pub fn is_representable(&self) -> bool {
        match self {
            Hashable::Unrepresentable => false,
            Hashable::Set(pairs) => pairs
                .iter()
                .all(|(k, v)| k.is_representable() && v.is_representable()),
            _ => true,
        }
    }

    /// Computes a stable fingerprint of this key.
    ///
    /// Returns `None` if the key contains an `Unrepresentable` marker, since
    /// such keys have no stable identity.
    pub fn fingerprint(&self) -> Option<ContentHash> {
        let mut hasher = ContentHasher::new();
        self.feed(&mut hasher).then(|| hasher.finish())
    }

    fn feed(&self, hasher: &mut ContentHasher) -> bool {
        match self {
            Hashable::Null => hasher.write_tag(0),
            Hashable::Bool(b) => {
                hasher.write_tag(1);
                hasher.write_tag(u8::from(*b));
            }
            Hashable::Int(i) => {
                hasher.write_tag(2);
                hasher.write_u64(*i as u64);
            }
            Hashable::Float(f) => {
                hasher.write_tag(3);
                hasher.write_u64(f.0.to_bits());
            }
            Hashable::Str(s) => {
                hasher.write_tag(4);
                hasher.write_bytes(s.as_bytes());
            }
            Hashable::Set(pairs) => {
                hasher.write_tag(5);
                hasher.write_u64(pairs.len() as u64);
                for (k, v) in pairs {
                    if !k.feed(hasher) || !v.feed(hasher) {
                        return false;
                    }
                }
            }
            Hashable::Unrepresentable => return false,
        }
        true
    }
}

impl PartialEq for Hashable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Hashable::Null, Hashable::Null) => true,
            (Hashable::Bool(a), Hashable::Bool(b)) => a == b,
            (Hashable::Int(a), Hashable::Int(b)) => a == b,
            (Hashable::Float(a), Hashable::Float(b)) => a == b,
            (Hashable::Str(a), Hashable::Str(b)) => a == b,
            (Hashable::Set(a), Hashable::Set(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Hashable {}

impl Hash for Hashable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Hashable::Null | Hashable::Unrepresentable => {}
            Hashable::Bool(b) => b.hash(state),
            Hashable::Int(i) => i.hash(state),
            Hashable::Float(f) => f.hash(state),
            Hashable::Str(s) => s.hash(state),
            Hashable::Set(pairs) => pairs.hash(state),
        }
    }
}

impl fmt::Display for Hashable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fingerprint() {
            Some(hash) => write!(f, "{hash}"),
            None => f.write_str("<unrepresentable>"),
        }
    }
}

impl Serialize for Hashable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Hashable::Null => serializer.serialize_unit(),
            Hashable::Bool(b) => serializer.serialize_bool(*b),
            Hashable::Int(i) => serializer.serialize_i64(*i),
            Hashable::Float(f) => serializer.serialize_f64(f.0),
            Hashable::Str(s) => serializer.serialize_str(s),
            Hashable::Set(pairs) => {
                let mut seq = serializer.serialize_seq(Some(pairs.len()))?;
                for pair in pairs {
                    seq.serialize_element(pair)?;
                }
                seq.end()
            }
            Hashable::Unrepresentable => serializer.serialize_str("<unrepresentable>"),
        }
    }
}

/// Types that can be projected into a [`Hashable`].
pub trait ToHashable {
    /// Returns the canonical hashable projection.
    fn to_hashable(&self) -> Hashable;
}

impl ToHashable for Value {
    fn to_hashable(&self) -> Hashable {
        match self {
            Value::Null => Hashable::Null,
            Value::Bool(b) => Hashable::Bool(*b),
            Value::Int(i) => Hashable::Int(*i),
            Value::Float(f) if is_integral(*f) => Hashable::Int(*f as i64),
            Value::Float(f) => Hashable::Float(OrderedFloat(*f)),
            Value::String(s) => Hashable::Str(s.clone()),
            Value::List(items) => Hashable::Set(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (Hashable::Int(i as i64), item.to_hashable()))
                    .collect(),
            ),
            Value::Map(entries) => {
                let mut sorted: Vec<&(String, Value)> = entries.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                Hashable::Set(
                    sorted
                        .into_iter()
                        .map(|(k, v)| (Hashable::Str(k.clone()), v.to_hashable()))
                        .collect(),
                )
            }
            Value::Opaque(_) => Hashable::Unrepresentable,
        }
    }
}

impl ToHashable for Hashable {
    fn to_hashable(&self) -> Hashable {
        self.clone()
    }
}

fn is_integral(f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

/// Projects a value into its canonical hashable form.
pub fn to_hashable<T: ToHashable + ?Sized>(value: &T) -> Hashable {
    value.to_hashable()
}
