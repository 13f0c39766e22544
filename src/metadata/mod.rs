//! Metadata identity consumed by the compiler: tokens, module tokens and the type-system model.

pub mod token;
pub mod typesystem;
