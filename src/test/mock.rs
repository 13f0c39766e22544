//! A scripted code compiler.

use std::collections::HashMap;

use crate::{
    compilation::CodeCompiler,
    dependency::{Relocation, RelocationKind},
    factory::{HelperTarget, MethodCode, NodeFactory},
    metadata::typesystem::{MethodDesc, TypeDesc},
    readytorun::constants::ReadyToRunHelperId,
    Error, Result,
};

/// What the mock does for one method
#[derive(Clone, Debug)]
pub enum Outcome {
    /// `ret`
    Returns,
    /// Fails with a recoverable type-system error
    TypeSystemError,
    /// Fails asking for the runtime JIT
    RequiresJit,
    /// Fails with an unrecoverable error
    Fatal,
    /// `call` to the entry point of the method, then `ret`
    Calls(MethodDesc),
    /// `call` to the allocation helper of the type, then `ret`
    Allocates(TypeDesc),
}

/// Returns `ret` for every method without a scripted outcome
#[derive(Default)]
pub struct MockCompiler {
    script: HashMap<MethodDesc, Outcome>,
    compiled: Vec<MethodDesc>,
}

impl MockCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, method: &MethodDesc, outcome: Outcome) -> Self {
        self.script.insert(method.clone(), outcome);
        self
    }

    /// Methods that produced code, in compilation order
    pub fn compiled(&self) -> &[MethodDesc] {
        &self.compiled
    }

    fn call(target: crate::dependency::NodeId) -> MethodCode {
        // call rel32; ret
        MethodCode::new(vec![0xE8, 0, 0, 0, 0, 0xC3]).with_reloc(Relocation {
            offset: 1,
            kind: RelocationKind::Rel32,
            target,
        })
    }
}

impl CodeCompiler for MockCompiler {
    fn compile_method(&mut self, method: &MethodDesc, factory: &mut NodeFactory) -> Result<MethodCode> {
        let context = factory.signature_context();
        let code = match self.script.get(method).cloned().unwrap_or(Outcome::Returns) {
            Outcome::Returns => MethodCode::new(vec![0xC3]),
            Outcome::TypeSystemError => return Err(Error::TypeSystem(format!("cannot load {method}"))),
            Outcome::RequiresJit => return Err(Error::RequiresRuntimeJit(method.to_string())),
            Outcome::Fatal => return Err(Error::NotImplemented("mock failure".to_string())),
            Outcome::Calls(callee) => {
                Self::call(factory.method_entrypoint(&callee, None, false, false, context))
            }
            Outcome::Allocates(ty) => {
                let helper =
                    factory.ready_to_run_helper(ReadyToRunHelperId::NewHelper, HelperTarget::Type(ty), context)?;
                Self::call(helper)
            }
        };
        self.compiled.push(method.clone());
        Ok(code)
    }
}
