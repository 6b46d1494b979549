//! Bump-arena string interning.
//!
//! The compiler front-end refers to the same small set of names (type
//! names, identifiers, unit names) over and over. Rather than clone a
//! `String` at every reference site, callers intern the name once and pass
//! around a cheap, `Copy` [`Symbol`] instead.
//!
//! The interner borrows its backing [`bumpalo::Bump`] from the caller
//! (typically a `SourceMap` or a per-compilation driver) rather than owning
//! it, so there is no self-referential lifetime trickery: every interned
//! `&str` genuinely lives as long as the arena the caller already owns.

use bumpalo::Bump;
use std::collections::HashMap;

/// A cheap, `Copy` handle for an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

/// Interns strings into a bump arena, handing out stable [`Symbol`]s.
///
/// Lookups are case-sensitive; callers that need Pascal's case-insensitive
/// identifier semantics should lower-case before interning (the lexer does
/// this for keyword/type-name comparisons, matching the rest of the
/// front-end's "canonicalize at the boundary" convention).
pub struct Interner<'bump> {
    bump: &'bump Bump,
    map: HashMap<&'bump str, Symbol>,
    strings: Vec<&'bump str>,
}

impl<'bump> Interner<'bump> {
    /// Create a new interner backed by `bump`.
    pub fn new(bump: &'bump Bump) -> Self {
        Interner {
            bump,
            map: HashMap::new(),
            strings: Vec::new(),
        }
    }

    /// Intern `s`, returning its `Symbol`. Interning the same string twice
    /// returns the same `Symbol`.
    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&sym) = self.map.get(s) {
            return sym;
        }
        let allocated: &'bump str = self.bump.alloc_str(s);
        let sym = Symbol(self.strings.len() as u32);
        self.strings.push(allocated);
        self.map.insert(allocated, sym);
        sym
    }

    /// Resolve a `Symbol` back to its string slice.
    pub fn resolve(&self, sym: Symbol) -> &str {
        self.strings[sym.0 as usize]
    }

    /// Number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_string_returns_same_symbol() {
        let bump = Bump::new();
        let mut interner = Interner::new(&bump);
        let a = interner.intern("integer");
        let b = interner.intern("integer");
        assert_eq!(a, b);
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn distinct_strings_get_distinct_symbols() {
        let bump = Bump::new();
        let mut interner = Interner::new(&bump);
        let a = interner.intern("integer");
        let b = interner.intern("boolean");
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), "integer");
        assert_eq!(interner.resolve(b), "boolean");
    }

    #[test]
    fn resolve_round_trips_many_entries() {
        let bump = Bump::new();
        let mut interner = Interner::new(&bump);
        let names: Vec<&str> = vec!["foo", "bar", "baz", "quux", "foo", "bar"];
        let symbols: Vec<Symbol> = names.iter().map(|n| interner.intern(n)).collect();
        assert_eq!(interner.len(), 4);
        for (name, sym) in names.iter().zip(symbols.iter()) {
            assert_eq!(interner.resolve(*sym), *name);
        }
    }
}
