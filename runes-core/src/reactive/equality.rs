//! Equality Policy
//!
//! Every state cell and derived cell carries a predicate that decides
//! whether a new value counts as a change. A write that the predicate calls
//! equal is dropped on the spot: nothing is dirtied and no wave is
//! scheduled. A recomputation that the predicate calls equal stops
//! propagation at that cell.
//!
//! The default policy is [`SameValue`]: plain values compare by value,
//! shared pointers (`Rc`, `Arc`) compare by identity, and floats compare
//! bitwise except that every NaN equals every other NaN. In particular
//! `0.0` and `-0.0` are different values.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::ops::Deref;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;

/// Value sameness: the default change test for cells.
pub trait SameValue {
    /// Check whether `self` and `other` are the same value.
    fn same_value(&self, other: &Self) -> bool;
}

macro_rules! same_value_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SameValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

same_value_by_eq!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, str, String,
);

macro_rules! same_value_float {
    ($($ty:ty),*) => {
        $(
            impl SameValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
                }
            }
        )*
    };
}

same_value_float!(f32, f64);

impl<T: ?Sized> SameValue for Rc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> SameValue for Arc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: SameValue + ?Sized> SameValue for &T {
    fn same_value(&self, other: &Self) -> bool {
        (**self).same_value(*other)
    }
}

impl<T: SameValue + ?Sized> SameValue for Box<T> {
    fn same_value(&self, other: &Self) -> bool {
        (**self).same_value(other)
    }
}

impl<T: SameValue> SameValue for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: SameValue> SameValue for [T] {
    fn same_value(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same_value(b))
    }
}

impl<T: SameValue, const N: usize> SameValue for [T; N] {
    fn same_value(&self, other: &Self) -> bool {
        self[..].same_value(&other[..])
    }
}

impl<T: SameValue> SameValue for Vec<T> {
    fn same_value(&self, other: &Self) -> bool {
        self[..].same_value(&other[..])
    }
}

macro_rules! same_value_tuple {
    ($(($($name:ident $idx:tt),+))*) => {
        $(
            impl<$($name: SameValue),+> SameValue for ($($name,)+) {
                fn same_value(&self, other: &Self) -> bool {
                    $(self.$idx.same_value(&other.$idx))&&+
                }
            }
        )*
    };
}

same_value_tuple! {
    (A 0)
    (A 0, B 1)
    (A 0, B 1, C 2)
    (A 0, B 1, C 2, D 3)
}

/// One-level comparison of a container's entries with [`SameValue`].
///
/// Used by [`Equality::shallow`] for cells holding shared collections,
/// where identity alone would report a change on every rebuilt container.
pub trait ShallowEq {
    /// Check whether both containers hold the same entries.
    fn shallow_eq(&self, other: &Self) -> bool;
}

impl<T: SameValue> ShallowEq for [T] {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl<T: SameValue> ShallowEq for Vec<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self[..].same_value(&other[..])
    }
}

impl<K: Eq + Hash, V: SameValue, S: BuildHasher> ShallowEq for HashMap<K, V, S> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|o| value.same_value(o)))
    }
}

impl<K: Ord, V: SameValue> ShallowEq for BTreeMap<K, V> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|o| value.same_value(o)))
    }
}

impl<K: Eq + Hash, V: SameValue, S: BuildHasher> ShallowEq for IndexMap<K, V, S> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|o| value.same_value(o)))
    }
}

/// The change predicate bound to a cell at creation.
///
/// # Example
///
/// ```
/// use runes_core::reactive::Equality;
///
/// let by_len = Equality::new(|a: &String, b: &String| a.len() == b.len());
/// assert!(by_len.equals(&"abc".to_string(), &"xyz".to_string()));
///
/// let default = Equality::<f64>::same_value();
/// assert!(default.equals(&f64::NAN, &f64::NAN));
/// assert!(!default.equals(&0.0, &-0.0));
/// ```
pub struct Equality<T: ?Sized> {
    predicate: Rc<dyn Fn(&T, &T) -> bool>,
}

impl<T: ?Sized + 'static> Equality<T> {
    /// Use a custom predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            predicate: Rc::new(predicate),
        }
    }

    /// The default policy.
    pub fn same_value() -> Self
    where
        T: SameValue,
    {
        Self::new(T::same_value)
    }

    /// Compare with [`PartialEq`]. Unlike [`same_value`](Self::same_value),
    /// NaN never equals NaN here, so NaN writes always propagate.
    pub fn partial_eq() -> Self
    where
        T: PartialEq,
    {
        Self::new(|a: &T, b: &T| a == b)
    }

    /// Identity first, then one level of entries with [`SameValue`].
    pub fn shallow() -> Self
    where
        T: Deref,
        T::Target: ShallowEq,
    {
        Self::new(|a: &T, b: &T| {
            let (a, b) = (a.deref(), b.deref());
            std::ptr::eq(a, b) || a.shallow_eq(b)
        })
    }

    /// Treat every write or recomputation as a change.
    pub fn always_changed() -> Self {
        Self::new(|_: &T, _: &T| false)
    }

    /// Check whether `new` is the same as `old` under this policy.
    pub fn equals(&self, old: &T, new: &T) -> bool {
        (self.predicate)(old, new)
    }
}

impl<T: ?Sized> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Rc::clone(&self.predicate),
        }
    }
}

impl<T: SameValue + ?Sized + 'static> Default for Equality<T> {
    fn default() -> Self {
        Self::same_value()
    }
}

impl<T: ?Sized> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Equality").finish_non_exhaustive()
    }
}
