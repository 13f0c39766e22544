//! The seam to the machine code generator.

use crate::{factory::MethodCode, factory::NodeFactory, metadata::typesystem::MethodDesc, Result};

/// Generates machine code for one method at a time.
///
/// The compiler requests every symbol its code refers to from the factory (entry
/// points, helper cells, dispatch cells, string literals) and returns the code with
/// relocations against the returned node ids.
///
/// Returning [`crate::Error::TypeSystem`] or [`crate::Error::RequiresRuntimeJit`] leaves
/// the method to the runtime JIT and the compilation continues; any other error aborts
/// it.
///
/// # Examples
///
/// ```rust
/// use readytorun::compilation::CodeCompiler;
/// use readytorun::factory::{MethodCode, NodeFactory};
/// use readytorun::metadata::typesystem::MethodDesc;
///
/// struct ReturnOnly;
///
/// impl CodeCompiler for ReturnOnly {
///     fn compile_method(&mut self, _method: &MethodDesc, _factory: &mut NodeFactory) -> readytorun::Result<MethodCode> {
///         Ok(MethodCode::new(vec![0xC3]))
///     }
/// }
/// ```
pub trait CodeCompiler {
    /// Compiles `method`, creating the nodes its code references through `factory`
    ///
    /// # Errors
    /// Per-method failures are reported as recoverable errors, see [`crate::Error::is_recoverable`].
    fn compile_method(&mut self, method: &MethodDesc, factory: &mut NodeFactory) -> Result<MethodCode>;
}
