//! Pascalc Core: shared foundations for the pascalc compiler
//!
//! The compiler front-end repeatedly needs a stable, cheap-to-compare handle
//! for a name that keeps coming up: type names in the type registry,
//! identifiers in a scope, unit names in the unit cache. This crate provides
//! [`Interner`], a bump-arena-backed string interner that hands out
//! [`Symbol`]s instead of cloning `String`s everywhere.
//!
//! # Modules
//!
//! - `interner`: bump-arena string interning (`Symbol`, `Interner`)

pub mod interner;

pub use interner::{Interner, Symbol};
