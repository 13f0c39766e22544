//! Symbol lookups made by the code compiler.
//!
//! Each operation is backed by its own cache keyed by the logical entity, and every
//! cache funnels into [`NodeFactory::import`], which dedupes again by section and
//! signature. Requests from different caches for the same fixup therefore share a cell.

use std::collections::HashMap;

use log::debug;

use crate::{
    dependency::NodeId,
    factory::{ImportPolicy, ImportSectionId, NodeFactory, NodeKind},
    metadata::{
        token::ModuleToken,
        typesystem::{FieldDesc, MethodDesc, TypeDesc},
    },
    readytorun::{
        constants::{
            FixupKind, GenericLookupKind, JitHelper, JitHelperMapping, ReadyToRunHelper,
            ReadyToRunHelperId,
        },
        Fixup, FixupSignature, LookupTarget, SignatureContext,
    },
    Error, Result,
};

/// Entity a [`ReadyToRunHelperId`] request is made for
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HelperTarget {
    /// A type: allocation, casts, statics, handles
    Type(TypeDesc),
    /// A method: handles, dictionaries, virtual calls
    Method(MethodDesc),
    /// A field handle
    Field(FieldDesc),
    /// Delegate construction bound to a known target
    Delegate {
        /// The delegate type
        delegate_type: TypeDesc,
        /// Method the delegate invokes
        target: MethodDesc,
    },
}

impl HelperTarget {
    fn as_type(&self, id: ReadyToRunHelperId) -> Result<&TypeDesc> {
        match self {
            HelperTarget::Type(ty) => Ok(ty),
            other => Err(malformed_error!("helper {} expects a type, got {:?}", id, other)),
        }
    }

    fn as_method(&self, id: ReadyToRunHelperId) -> Result<&MethodDesc> {
        match self {
            HelperTarget::Method(method) => Ok(method),
            other => Err(malformed_error!("helper {} expects a method, got {:?}", id, other)),
        }
    }

    fn as_field(&self, id: ReadyToRunHelperId) -> Result<&FieldDesc> {
        match self {
            HelperTarget::Field(field) => Ok(field),
            other => Err(malformed_error!("helper {} expects a field, got {:?}", id, other)),
        }
    }
}

type HelperCreator = fn(&mut NodeFactory, &HelperTarget, SignatureContext) -> Result<NodeId>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct GenericLookupKey {
    lookup_kind: GenericLookupKind,
    fixup_kind: FixupKind,
    target: LookupTarget,
    method_context: MethodDesc,
}

/// Caches of the code compiler facing lookups
#[derive(Debug, Default)]
pub(crate) struct SymbolCaches {
    helpers: HashMap<ReadyToRunHelperId, HashMap<HelperTarget, NodeId>>,
    field_addresses: HashMap<FieldDesc, NodeId>,
    extern_symbols: HashMap<JitHelper, NodeId>,
    dispatch_cells: HashMap<(MethodDesc, String), NodeId>,
    method_dictionaries: HashMap<MethodDesc, NodeId>,
    constructed_types: HashMap<TypeDesc, NodeId>,
    necessary_types: HashMap<TypeDesc, NodeId>,
    string_literals: HashMap<ModuleToken, NodeId>,
    delegate_ctors: HashMap<(TypeDesc, MethodDesc), NodeId>,
    generic_lookups: HashMap<GenericLookupKey, NodeId>,
}

fn helper_creator(id: ReadyToRunHelperId) -> Option<HelperCreator> {
    use ReadyToRunHelperId as Id;

    let creator: HelperCreator = match id {
        Id::NewHelper => create_new_object,
        Id::NewArr1 => create_new_array,
        Id::GetGCStaticBase => create_gc_static_base,
        Id::GetNonGCStaticBase => create_non_gc_static_base,
        Id::GetThreadStaticBase => create_thread_static_base,
        Id::GetThreadNonGcStaticBase => create_thread_non_gc_static_base,
        Id::IsInstanceOf => create_is_instance_of,
        Id::CastClass => create_cast_class,
        Id::TypeHandle => create_type_handle,
        Id::MethodHandle => create_method_handle,
        Id::FieldHandle => create_field_handle,
        Id::VirtualCall => create_virtual_call,
        Id::DelegateCtor => create_delegate_ctor,
        Id::CctorTrigger => create_cctor_trigger,
        Id::TypeDictionary => create_type_dictionary,
        Id::MethodDictionary => create_method_dictionary,
        Id::NecessaryTypeHandle
        | Id::MethodEntry
        | Id::VirtualDispatchCell
        | Id::ResolveVirtualFunction => return None,
    };
    Some(creator)
}

fn type_helper(
    factory: &mut NodeFactory,
    target: &HelperTarget,
    context: SignatureContext,
    id: ReadyToRunHelperId,
    kind: FixupKind,
) -> Result<NodeId> {
    let ty = target.as_type(id)?.clone();
    Ok(factory.delay_load_import(
        ImportSectionId::Helper,
        ReadyToRunHelper::DelayLoadHelper,
        FixupSignature::ty(kind, ty, context),
    ))
}

fn create_new_object(factory: &mut NodeFactory, target: &HelperTarget, context: SignatureContext) -> Result<NodeId> {
    type_helper(factory, target, context, ReadyToRunHelperId::NewHelper, FixupKind::NewObject)
}

fn create_new_array(factory: &mut NodeFactory, target: &HelperTarget, context: SignatureContext) -> Result<NodeId> {
    let ty = target.as_type(ReadyToRunHelperId::NewArr1)?;
    if !matches!(ty, TypeDesc::SzArray(_) | TypeDesc::Array { .. }) {
        return Err(malformed_error!("NewArr1 target '{}' is not an array type", ty));
    }
    type_helper(factory, target, context, ReadyToRunHelperId::NewArr1, FixupKind::NewArray)
}

fn create_gc_static_base(factory: &mut NodeFactory, target: &HelperTarget, context: SignatureContext) -> Result<NodeId> {
    type_helper(factory, target, context, ReadyToRunHelperId::GetGCStaticBase, FixupKind::StaticBaseGC)
}

fn create_non_gc_static_base(
    factory: &mut NodeFactory,
    target: &HelperTarget,
    context: SignatureContext,
) -> Result<NodeId> {
    type_helper(
        factory,
        target,
        context,
        ReadyToRunHelperId::GetNonGCStaticBase,
        FixupKind::StaticBaseNonGC,
    )
}

fn create_thread_static_base(
    factory: &mut NodeFactory,
    target: &HelperTarget,
    context: SignatureContext,
) -> Result<NodeId> {
    type_helper(
        factory,
        target,
        context,
        ReadyToRunHelperId::GetThreadStaticBase,
        FixupKind::ThreadStaticBaseGC,
    )
}

fn create_thread_non_gc_static_base(
    factory: &mut NodeFactory,
    target: &HelperTarget,
    context: SignatureContext,
) -> Result<NodeId> {
    type_helper(
        factory,
        target,
        context,
        ReadyToRunHelperId::GetThreadNonGcStaticBase,
        FixupKind::ThreadStaticBaseNonGC,
    )
}

fn create_is_instance_of(factory: &mut NodeFactory, target: &HelperTarget, context: SignatureContext) -> Result<NodeId> {
    type_helper(factory, target, context, ReadyToRunHelperId::IsInstanceOf, FixupKind::IsInstanceOf)
}

// the cast helper receives the object, so it goes through the object-taking helper
fn create_cast_class(factory: &mut NodeFactory, target: &HelperTarget, context: SignatureContext) -> Result<NodeId> {
    let ty = target.as_type(ReadyToRunHelperId::CastClass)?.clone();
    Ok(factory.delay_load_import(
        ImportSectionId::Helper,
        ReadyToRunHelper::DelayLoadHelperObj,
        FixupSignature::ty(FixupKind::ChkCast, ty, context),
    ))
}

fn create_type_handle(factory: &mut NodeFactory, target: &HelperTarget, context: SignatureContext) -> Result<NodeId> {
    let ty = target.as_type(ReadyToRunHelperId::TypeHandle)?.clone();
    Ok(factory.precode_import(FixupSignature::ty(FixupKind::TypeHandle, ty, context)))
}

fn create_method_handle(factory: &mut NodeFactory, target: &HelperTarget, context: SignatureContext) -> Result<NodeId> {
    let method = target.as_method(ReadyToRunHelperId::MethodHandle)?.clone();
    let instantiating = method.has_instantiation();
    Ok(factory.precode_import(FixupSignature::method(
        FixupKind::MethodHandle,
        method,
        None,
        false,
        instantiating,
        context,
    )))
}

fn create_field_handle(factory: &mut NodeFactory, target: &HelperTarget, context: SignatureContext) -> Result<NodeId> {
    let field = target.as_field(ReadyToRunHelperId::FieldHandle)?.clone();
    Ok(factory.precode_import(FixupSignature::field(FixupKind::FieldHandle, field, context)))
}

fn create_virtual_call(factory: &mut NodeFactory, target: &HelperTarget, context: SignatureContext) -> Result<NodeId> {
    let method = target.as_method(ReadyToRunHelperId::VirtualCall)?.clone();
    Ok(factory.delay_load_import(
        ImportSectionId::Dispatch,
        ReadyToRunHelper::DelayLoadHelperObj,
        FixupSignature::method(FixupKind::VirtualEntry, method, None, false, false, context),
    ))
}

fn create_delegate_ctor(factory: &mut NodeFactory, target: &HelperTarget, context: SignatureContext) -> Result<NodeId> {
    match target {
        HelperTarget::Delegate {
            delegate_type,
            target,
        } => Ok(factory.delegate_ctor(delegate_type, target, context)),
        other => Err(malformed_error!("helper DelegateCtor expects a delegate target, got {:?}", other)),
    }
}

fn create_cctor_trigger(factory: &mut NodeFactory, target: &HelperTarget, context: SignatureContext) -> Result<NodeId> {
    let ty = target.as_type(ReadyToRunHelperId::CctorTrigger)?.clone();
    Ok(factory.delay_load_import(
        ImportSectionId::Dispatch,
        ReadyToRunHelper::DelayLoadHelper,
        FixupSignature::ty(FixupKind::CctorTrigger, ty, context),
    ))
}

fn create_type_dictionary(factory: &mut NodeFactory, target: &HelperTarget, context: SignatureContext) -> Result<NodeId> {
    let ty = target.as_type(ReadyToRunHelperId::TypeDictionary)?.clone();
    Ok(factory.precode_import(FixupSignature::ty(FixupKind::TypeDictionary, ty, context)))
}

fn create_method_dictionary(
    factory: &mut NodeFactory,
    target: &HelperTarget,
    context: SignatureContext,
) -> Result<NodeId> {
    let method = target.as_method(ReadyToRunHelperId::MethodDictionary)?.clone();
    Ok(factory.precode_import(FixupSignature::method(
        FixupKind::MethodDictionary,
        method,
        None,
        false,
        true,
        context,
    )))
}

impl NodeFactory {
    /// Returns the symbol the code compiler calls or loads for helper `id` on `target`.
    ///
    /// [`ReadyToRunHelperId::NecessaryTypeHandle`] requests are served as
    /// [`ReadyToRunHelperId::TypeHandle`], so both share one cell.
    ///
    /// # Errors
    /// Returns [`Error::NotImplemented`] for helper ids without a ReadyToRun
    /// representation and [`Error::Malformed`] if `target` has the wrong shape.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use readytorun::compilation::{CompilationConfig, CompilationModuleGroup};
    /// use readytorun::factory::{HelperTarget, NodeFactory};
    /// use readytorun::metadata::{token::ModuleId, typesystem::{ModuleDesc, TypeKind}};
    /// use readytorun::readytorun::constants::ReadyToRunHelperId;
    ///
    /// let mut app = ModuleDesc::new(ModuleId(0), "App");
    /// let widget = app.define_type("App", "Widget", TypeKind::Class);
    /// let mut factory = NodeFactory::new(CompilationConfig::default(), CompilationModuleGroup::new(app));
    /// let context = factory.signature_context();
    ///
    /// let exact = factory.ready_to_run_helper(ReadyToRunHelperId::TypeHandle, HelperTarget::Type(widget.clone()), context)?;
    /// let necessary = factory.ready_to_run_helper(ReadyToRunHelperId::NecessaryTypeHandle, HelperTarget::Type(widget), context)?;
    /// assert_eq!(exact, necessary);
    /// # Ok::<(), readytorun::Error>(())
    /// ```
    pub fn ready_to_run_helper(
        &mut self,
        id: ReadyToRunHelperId,
        target: HelperTarget,
        context: SignatureContext,
    ) -> Result<NodeId> {
        let id = match id {
            ReadyToRunHelperId::NecessaryTypeHandle => ReadyToRunHelperId::TypeHandle,
            other => other,
        };

        if let Some(&node) = self.symbols.helpers.get(&id).and_then(|nodes| nodes.get(&target)) {
            return Ok(node);
        }

        let create = helper_creator(id).ok_or_else(|| Error::NotImplemented(format!("ReadyToRun helper {id}")))?;
        let node = create(self, &target, context)?;
        debug!("helper {id} for {target:?} -> {node}");
        self.symbols.helpers.entry(id).or_default().insert(target, node);
        Ok(node)
    }

    /// Delay-load cell holding the address of a cross-module static field
    pub fn field_address(&mut self, field: &FieldDesc, context: SignatureContext) -> NodeId {
        if let Some(&node) = self.symbols.field_addresses.get(field) {
            return node;
        }

        let node = self.delay_load_import(
            ImportSectionId::Helper,
            ReadyToRunHelper::DelayLoadHelper,
            FixupSignature::field(FixupKind::FieldAddress, field.clone(), context),
        );
        self.symbols.field_addresses.insert(field.clone(), node);
        node
    }

    /// Eager helper cell the code compiler calls for a JIT helper.
    ///
    /// # Errors
    /// Returns [`Error::RequiresRuntimeJit`] for helpers only the runtime JIT can
    /// provide and [`Error::NotImplemented`] for helpers without an equivalent.
    pub fn extern_symbol(&mut self, helper: JitHelper) -> Result<NodeId> {
        if let Some(&node) = self.symbols.extern_symbols.get(&helper) {
            return Ok(node);
        }

        let node = match helper.mapping() {
            JitHelperMapping::Helper(r2r) => self.helper_cell(r2r),
            JitHelperMapping::RequiresRuntimeJit => {
                return Err(Error::RequiresRuntimeJit(format!("JIT helper {helper}")))
            }
            JitHelperMapping::Unsupported => return Err(Error::NotImplemented(format!("JIT helper {helper}"))),
        };
        self.symbols.extern_symbols.insert(helper, node);
        Ok(node)
    }

    /// Virtual stub dispatch cell of an interface call.
    ///
    /// Each call site gets its own cell so the runtime can patch call sites
    /// independently; the key is the method together with the call site name.
    pub fn interface_dispatch_cell(
        &mut self,
        method: &MethodDesc,
        context: SignatureContext,
        unboxing: bool,
        call_site: &str,
    ) -> NodeId {
        let key = (method.clone(), call_site.to_string());
        if let Some(&node) = self.symbols.dispatch_cells.get(&key) {
            return node;
        }

        let node = self.import(
            ImportSectionId::Dispatch,
            FixupSignature::method(FixupKind::VirtualEntry, method.clone(), None, unboxing, false, context),
            ImportPolicy::DelayLoad {
                helper: ReadyToRunHelper::DelayLoadMethodCall,
                virtual_dispatch: true,
            },
            Vec::new(),
            Some(call_site.to_string()),
        );
        self.symbols.dispatch_cells.insert(key, node);
        node
    }

    /// Generic dictionary of an instantiated method
    pub fn method_generic_dictionary(&mut self, method: &MethodDesc, context: SignatureContext) -> NodeId {
        if let Some(&node) = self.symbols.method_dictionaries.get(method) {
            return node;
        }

        let node = self.precode_import(FixupSignature::method(
            FixupKind::MethodDictionary,
            method.clone(),
            None,
            false,
            true,
            context,
        ));
        self.symbols.method_dictionaries.insert(method.clone(), node);
        node
    }

    /// Type symbol of a type whose instances are allocated
    pub fn constructed_type_symbol(&mut self, ty: &TypeDesc, context: SignatureContext) -> NodeId {
        if let Some(&node) = self.symbols.constructed_types.get(ty) {
            return node;
        }

        let node = self.precode_import(FixupSignature::ty(FixupKind::TypeDictionary, ty.clone(), context));
        self.symbols.constructed_types.insert(ty.clone(), node);
        node
    }

    /// Type symbol of a type that is only referenced, never allocated
    pub fn necessary_type_symbol(&mut self, ty: &TypeDesc) -> NodeId {
        if let Some(&node) = self.symbols.necessary_types.get(ty) {
            return node;
        }

        let node = self.add_external_type(ty.clone());
        self.symbols.necessary_types.insert(ty.clone(), node);
        node
    }

    /// Cell holding the interned string of a user string token
    pub fn string_literal(&mut self, token: ModuleToken) -> NodeId {
        if let Some(&node) = self.symbols.string_literals.get(&token) {
            return node;
        }

        let context = SignatureContext::new(token.module);
        let node = self.import(
            ImportSectionId::String,
            FixupSignature::new(Fixup::String(token), context),
            ImportPolicy::Precode,
            Vec::new(),
            None,
        );
        self.symbols.string_literals.insert(token, node);
        node
    }

    /// Delay-load cell constructing a delegate of `delegate_type` bound to `target`.
    ///
    /// The target's entry point is created as a dependency, so a local target gets
    /// compiled.
    pub fn delegate_ctor(&mut self, delegate_type: &TypeDesc, target: &MethodDesc, context: SignatureContext) -> NodeId {
        let key = (delegate_type.clone(), target.clone());
        if let Some(&node) = self.symbols.delegate_ctors.get(&key) {
            return node;
        }

        let entrypoint = self.method_entrypoint(target, None, false, false, context);
        let node = self.import(
            ImportSectionId::Helper,
            FixupSignature::new(
                Fixup::DelegateCtor {
                    delegate_type: delegate_type.clone(),
                    target: target.clone(),
                },
                context,
            ),
            ImportPolicy::DelayLoad {
                helper: ReadyToRunHelper::DelayLoadHelper,
                virtual_dispatch: false,
            },
            vec![entrypoint],
            None,
        );
        self.symbols.delegate_ctors.insert(key, node);
        node
    }

    /// Cell resolving a generic dictionary slot of shared code.
    ///
    /// Type-valued lookups on a method or field target resolve the owning type.
    ///
    /// # Errors
    /// Returns [`Error::NotImplemented`] for helper ids that have no dictionary
    /// lookup form.
    pub fn generic_lookup_helper(
        &mut self,
        lookup_kind: GenericLookupKind,
        helper_id: ReadyToRunHelperId,
        target: HelperTarget,
        method_context: &MethodDesc,
        context: SignatureContext,
    ) -> Result<NodeId> {
        let fixup_kind = match helper_id {
            ReadyToRunHelperId::TypeHandle | ReadyToRunHelperId::NecessaryTypeHandle => FixupKind::TypeHandle,
            ReadyToRunHelperId::MethodHandle | ReadyToRunHelperId::MethodDictionary => FixupKind::MethodHandle,
            ReadyToRunHelperId::MethodEntry => FixupKind::MethodEntry,
            ReadyToRunHelperId::TypeDictionary => FixupKind::TypeDictionary,
            ReadyToRunHelperId::VirtualDispatchCell => FixupKind::VirtualEntry,
            ReadyToRunHelperId::FieldHandle => FixupKind::FieldHandle,
            other => return Err(Error::NotImplemented(format!("generic lookup of helper {other}"))),
        };

        let lookup_target = match (fixup_kind, target) {
            (FixupKind::TypeHandle | FixupKind::TypeDictionary, HelperTarget::Type(ty)) => LookupTarget::Type(ty),
            (FixupKind::TypeHandle | FixupKind::TypeDictionary, HelperTarget::Method(method)) => {
                LookupTarget::Type(method.owning_type().clone())
            }
            (FixupKind::TypeHandle | FixupKind::TypeDictionary, HelperTarget::Field(field)) => {
                LookupTarget::Type(field.owning_type().clone())
            }
            (FixupKind::FieldHandle, HelperTarget::Field(field)) => LookupTarget::Field(field),
            (FixupKind::MethodHandle | FixupKind::MethodEntry | FixupKind::VirtualEntry, HelperTarget::Method(method)) => {
                LookupTarget::Method(method)
            }
            (_, other) => {
                return Err(malformed_error!(
                    "generic lookup of helper {} cannot target {:?}",
                    helper_id,
                    other
                ))
            }
        };

        let key = GenericLookupKey {
            lookup_kind,
            fixup_kind,
            target: lookup_target,
            method_context: method_context.clone(),
        };
        if let Some(&node) = self.symbols.generic_lookups.get(&key) {
            return Ok(node);
        }

        let signature = FixupSignature::new(
            Fixup::GenericLookup {
                lookup_kind,
                fixup_kind,
                target: key.target.clone(),
                method_context: method_context.clone(),
            },
            context,
        );
        let node = self.delay_load_import(ImportSectionId::Helper, ReadyToRunHelper::DelayLoadHelper, signature);
        self.symbols.generic_lookups.insert(key, node);
        Ok(node)
    }

    fn add_external_type(&mut self, ty: TypeDesc) -> NodeId {
        let id = self.add_node(NodeKind::ExternalType(ty));
        debug!("external type {id}");
        id
    }
}
