//! Shared test infrastructure
//!
//! `factories` builds the small type universes the unit tests compile against, and
//! `mock` provides a scripted [`crate::compilation::CodeCompiler`].

pub mod mock;
