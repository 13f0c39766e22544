// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # readytorun
//!
//! The object-emission backend of an ahead-of-time compiler for .NET ReadyToRun images.
//!
//! A ReadyToRun image carries precompiled native code next to the IL of an assembly.
//! The runtime loads the native code when the image still matches the assemblies it
//! was compiled against, and falls back to the JIT otherwise. This crate builds the
//! data structures of such an image: the header and its tables, the import sections
//! with their lazily bound cells and thunks, and the version-resilient hashes the
//! runtime uses to find precompiled methods and types.
//!
//! Code generation itself is outside of this crate. A [`compilation::CodeCompiler`]
//! produces the bytes of each method and requests every symbol it references from
//! the [`factory::NodeFactory`].
//!
//! ## Features
//!
//! - **Node factory** - one cached node per logical entity: import cells, thunks, signatures, method bodies
//! - **Dependency graph** - only nodes reachable from the roots end up in the image
//! - **Failure recovery** - methods the compiler cannot handle are left to the runtime JIT
//! - **Native format** - the hashtables, arrays and nibble streams the runtime loader reads
//! - **Profile data** - optional rooting of only the methods a training run executed
//!
//! ## Quick Start
//!
//! ```rust
//! use readytorun::prelude::*;
//!
//! struct Ret;
//! impl CodeCompiler for Ret {
//!     fn compile_method(&mut self, _: &MethodDesc, _: &mut NodeFactory) -> Result<MethodCode> {
//!         Ok(MethodCode::new(vec![0xC3]))
//!     }
//! }
//!
//! let mut app = ModuleDesc::new(ModuleId(0), "App");
//! let program = app.define_type("App", "Program", TypeKind::Class);
//! app.define_method(&program, "Main", MethodAttributes::STATIC);
//!
//! let mut compilation = ReadyToRunCompilation::new(CompilationConfig::default(), CompilationModuleGroup::new(app))?;
//! let image = compilation.run(&mut Ret)?;
//! println!("{} symbols", image.symbols.len());
//! # Ok::<(), readytorun::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - tokens and the type-system model the compiler consumes
//! - [`readytorun`] - image format constants, signatures and the header tables
//! - [`nativeformat`] - the native layout writer behind the lookup tables
//! - [`dependency`] - node ids, reachability and node data
//! - [`factory`] - the node factory and image layout
//! - [`compilation`] - configuration, driver and object writer
//! - [`profile`] - method profile data

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use readytorun::prelude::*;
///
/// let config = CompilationConfig::default().with_max_failed_methods(Some(16));
/// assert_eq!(config.target.pointer_size(), 8);
/// ```
pub mod prelude;

/// Driving a compilation: configuration, module group, driver and object writer
pub mod compilation;

/// Node identity, reachability and the data nodes emit
pub mod dependency;

/// The node factory and the layout of the final image
pub mod factory;

/// Metadata tokens and the type-system model
pub mod metadata;

/// The native layout format read by the runtime loader
pub mod nativeformat;

/// Method profile data from training runs
pub mod profile;

/// ReadyToRun image format: constants, signatures, fixups and header tables
pub mod readytorun;

/// Byte-sequence identity, nibble encoding and alignment helpers
pub mod utils;

/// `readytorun` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `readytorun` Error type
///
/// The main error type for all operations in this crate. Use [`Error::is_recoverable`]
/// to tell per-method failures from fatal ones.
///
/// # Examples
///
/// ```rust
/// use readytorun::Error;
///
/// match Error::TypeSystem("cannot load System.Foo".to_string()) {
///     err if err.is_recoverable() => println!("left to the JIT: {err}"),
///     err => panic!("{err}"),
/// }
/// ```
pub use error::Error;
