//! Driving a ReadyToRun compilation.
//!
//! This module ties the pieces together: a [`CompilationConfig`] describing the target,
//! the [`CompilationModuleGroup`] being compiled, the [`CodeCompiler`] producing method
//! bodies, and the [`ReadyToRunCompilation`] driver that walks the dependency graph and
//! hands the result to the [`ObjectWriter`].
//!
//! # Examples
//!
//! ```rust
//! use readytorun::compilation::{CodeCompiler, CompilationConfig, CompilationModuleGroup, ReadyToRunCompilation};
//! use readytorun::factory::{MethodCode, NodeFactory};
//! use readytorun::metadata::{token::ModuleId, typesystem::{MethodAttributes, MethodDesc, ModuleDesc, TypeKind}};
//!
//! struct Jit;
//! impl CodeCompiler for Jit {
//!     fn compile_method(&mut self, method: &MethodDesc, _: &mut NodeFactory) -> readytorun::Result<MethodCode> {
//!         if method.name() == "Unsupported" {
//!             return Err(readytorun::Error::RequiresRuntimeJit(method.to_string()));
//!         }
//!         Ok(MethodCode::new(vec![0xC3]))
//!     }
//! }
//!
//! let mut app = ModuleDesc::new(ModuleId(0), "App");
//! let program = app.define_type("App", "Program", TypeKind::Class);
//! app.define_method(&program, "Main", MethodAttributes::STATIC);
//! app.define_method(&program, "Unsupported", MethodAttributes::STATIC);
//!
//! let mut compilation = ReadyToRunCompilation::new(CompilationConfig::default(), CompilationModuleGroup::new(app))?;
//! compilation.run(&mut Jit)?;
//! assert_eq!(compilation.stats().failed_methods, 1);
//! # Ok::<(), readytorun::Error>(())
//! ```

mod compiler;
mod config;
mod driver;
mod group;
mod objectwriter;

pub use compiler::CodeCompiler;
pub use config::{CompilationConfig, TargetArchitecture, TargetDetails, TargetOs, DEFAULT_COMPILER_IDENTIFIER};
pub use driver::{CompilationStats, ReadyToRunCompilation};
pub use group::CompilationModuleGroup;
pub use objectwriter::{ImageRelocation, ImageSection, ImageSymbol, ObjectImage, ObjectWriter};
