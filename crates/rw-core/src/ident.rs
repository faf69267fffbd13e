//! Identifiers and the fresh-identifier generator.
//!
//! Identifiers are compared and hashed by index only. Two idents that print
//! the same name are still different bindings unless they are the same
//! handle — this is what lets substitution tables key by identity rather
//! than by name.

use std::fmt;
use std::sync::Arc;

/// An opaque, globally unique variable handle.
#[derive(Clone, Debug)]
pub struct Ident {
    index: u32,
    name: Arc<str>,
}

impl Ident {
    fn new(index: u32, name: Arc<str>) -> Self {
        Self { index, name }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for Ident {}

impl std::hash::Hash for Ident {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl PartialOrd for Ident {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ident {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.index)
    }
}

/// Fresh-identifier generator.
///
/// Each pass owns one generator for the duration of its run, seeded past
/// the highest index already in use so that identifiers minted by earlier
/// stages are never reused.
#[derive(Debug, Clone)]
pub struct IdentGen {
    next: u32,
}

impl IdentGen {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Start numbering past `floor` (exclusive), so idents minted by a
    /// prior stage are never reissued.
    pub fn starting_after(floor: u32) -> Self {
        Self { next: floor + 1 }
    }

    pub fn fresh(&mut self, name: impl Into<Arc<str>>) -> Ident {
        let index = self.next;
        self.next += 1;
        Ident::new(index, name.into())
    }

    /// Mint a fresh ident that renames `base`, keeping its name for
    /// readability in debug output.
    pub fn rename_of(&mut self, base: &Ident) -> Ident {
        self.fresh(base.name.clone())
    }

    pub fn high_water_mark(&self) -> u32 {
        self.next
    }
}

impl Default for IdentGen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_idents_are_distinct_even_with_same_name() {
        let mut gen = IdentGen::new();
        let a = gen.fresh("x");
        let b = gen.fresh("x");
        assert_ne!(a, b);
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn starting_after_avoids_collisions() {
        let mut first = IdentGen::new();
        let a = first.fresh("x");
        let mut second = IdentGen::starting_after(first.high_water_mark());
        let b = second.fresh("x");
        assert_ne!(a, b);
        assert!(b.index() > a.index());
    }
}
