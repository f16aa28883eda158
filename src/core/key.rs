//! Variable identifiers.
//!
//! A [`Key`] names one variable in a [`Values`](crate::core::values::Values) store. It is a
//! `(tag, index)` pair, so pose number 3 is `Key::new('x', 3)` and landmark number 12 is
//! `Key::new('l', 12)`. Keys order by tag first and index second.

use std::fmt::{self, Display, Formatter};

/// Identifier of a single optimization variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    tag: char,
    index: u64,
}

impl Key {
    pub const fn new(tag: char, index: u64) -> Self {
        Self { tag, index }
    }

    pub const fn tag(&self) -> char {
        self.tag
    }

    pub const fn index(&self) -> u64 {
        self.index
    }
}

impl From<(char, u64)> for Key {
    fn from((tag, index): (char, u64)) -> Self {
        Key::new(tag, index)
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.tag, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_display() {
        assert_eq!(Key::new('x', 3).to_string(), "x3");
        assert_eq!(Key::new('l', 120).to_string(), "l120");
    }

    #[test]
    fn test_key_ordering_tag_then_index() {
        let mut keys = vec![
            Key::new('x', 2),
            Key::new('l', 7),
            Key::new('x', 0),
            Key::new('l', 1),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Key::new('l', 1),
                Key::new('l', 7),
                Key::new('x', 0),
                Key::new('x', 2)
            ]
        );
    }

    #[test]
    fn test_key_hash_and_conversion() {
        let mut set = HashSet::new();
        set.insert(Key::from(('x', 1)));
        set.insert(Key::new('x', 1));
        set.insert(Key::new('y', 1));
        assert_eq!(set.len(), 2);

        let key: Key = ('p', 9).into();
        assert_eq!(key.tag(), 'p');
        assert_eq!(key.index(), 9);
    }
}
