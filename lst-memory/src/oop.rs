use std::fmt;

/// An object reference.
///
/// The raw word is either a tagged small integer (odd words, the value being the word
/// shifted right by one) or the index of an object in the object table, shifted left by
/// one (even words).
/// The raw word `0` designates the `nil` object, which lives at index `0`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Oop(i64);

impl Oop {
    /// The permanent `nil` object.
    pub const NIL: Oop = Oop(0);

    /// The smallest integer that fits in a tagged word.
    pub const MIN_INTEGER: i64 = i64::MIN >> 1;
    /// The largest integer that fits in a tagged word.
    pub const MAX_INTEGER: i64 = i64::MAX >> 1;

    /// Reference to the object stored at `index` in the object table.
    pub const fn from_index(index: usize) -> Self {
        Self((index as i64) << 1)
    }

    /// Tags a small integer.
    ///
    /// Values outside of [`Oop::MIN_INTEGER`]..=[`Oop::MAX_INTEGER`] lose their top bit,
    /// use [`Oop::try_from_integer`] when the value may not fit.
    pub const fn from_integer(value: i64) -> Self {
        Self(value.wrapping_shl(1) | 1)
    }

    /// Tags a small integer, if it fits.
    pub fn try_from_integer(value: i64) -> Option<Self> {
        if (Self::MIN_INTEGER..=Self::MAX_INTEGER).contains(&value) {
            Some(Self::from_integer(value))
        } else {
            None
        }
    }

    /// Rebuilds a reference from its raw word, as stored in an image.
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw word of this reference.
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Is this the `nil` object ?
    pub const fn is_nil(self) -> bool {
        self.0 == 0
    }

    /// Is this a tagged small integer ?
    pub const fn is_small_integer(self) -> bool {
        self.0 & 1 == 1
    }

    /// The value of this small integer, `None` for any other object.
    pub const fn as_small_integer(self) -> Option<i64> {
        if self.is_small_integer() {
            Some(self.0 >> 1)
        } else {
            None
        }
    }

    /// The untagged value of the raw word.
    ///
    /// Linkage slots of the process stack hold integers that may still be `nil` (a fresh
    /// stack), which this reads as `0`.
    pub const fn get_integer(self) -> i64 {
        self.0 >> 1
    }

    /// Object table index of this reference, `None` for small integers.
    pub const fn index(self) -> Option<usize> {
        if self.is_small_integer() {
            None
        } else {
            Some((self.0 >> 1) as usize)
        }
    }

    /// The identity hash, used by identity-keyed name tables and the method cache.
    pub const fn identity_hash(self) -> i64 {
        (self.0 >> 1).wrapping_abs()
    }
}

impl fmt::Debug for Oop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.as_small_integer() {
            Some(value) => write!(f, "Oop({})", value),
            None if self.is_nil() => write!(f, "Oop(nil)"),
            None => write!(f, "Oop(#{})", self.0 >> 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_tagged() {
        for value in [0, 1, -1, 42, -4096, Oop::MAX_INTEGER, Oop::MIN_INTEGER] {
            let oop = Oop::from_integer(value);
            assert!(oop.is_small_integer());
            assert_eq!(oop.as_small_integer(), Some(value));
            assert_eq!(oop.index(), None);
        }
    }

    #[test]
    fn objects_are_indices() {
        let oop = Oop::from_index(17);
        assert!(!oop.is_small_integer());
        assert_eq!(oop.index(), Some(17));
        assert_eq!(oop.as_small_integer(), None);
        assert_eq!(Oop::from_index(0), Oop::NIL);
    }

    #[test]
    fn out_of_range_integers_are_refused() {
        assert_eq!(Oop::try_from_integer(Oop::MAX_INTEGER + 1), None);
        assert_eq!(Oop::try_from_integer(Oop::MIN_INTEGER - 1), None);
    }

    #[test]
    fn nil_reads_as_zero() {
        assert_eq!(Oop::NIL.get_integer(), 0);
    }
}
