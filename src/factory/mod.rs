//! The node factory: single owner of every node in the image.
//!
//! All nodes live in one arena and are addressed by [`NodeId`]. Every public lookup goes
//! through a cache keyed by the logical entity it represents, so asking twice for the same
//! entity returns the same id. Downstream code compares ids, and a second node for the
//! same entity would emit a second import cell and a second fixup for it.
//!
//! # Key Components
//!
//! - [`NodeFactory`] - arena, caches and node lookups
//! - [`NodeKind`] / [`Import`] / [`ImportThunk`] / [`MethodNode`] - node payloads
//! - [`ImportSectionId`] - the six fixed import sections
//! - [`HelperTarget`] - argument of [`NodeFactory::ready_to_run_helper`]
//!
//! The factory is split over several files: this one holds the arena and the core
//! import caches, `helpers` the symbol caches used by the code compiler, `header` the
//! fixed roots of every image, `layout` the index assignment run after marking, and
//! `data` the serialization of each node kind.

mod data;
mod header;
mod helpers;
mod layout;
mod nodes;

use std::collections::HashMap;

use log::debug;
use strum::EnumCount;

pub use helpers::HelperTarget;
pub use layout::ImageLayout;
pub use nodes::{
    Import, ImportKind, ImportSectionId, ImportThunk, MethodCode, MethodNode, MethodState, Node,
    NodeKind, ThunkKind,
};

use crate::{
    compilation::{CompilationConfig, CompilationModuleGroup, TargetArchitecture},
    dependency::NodeId,
    metadata::typesystem::{MethodDesc, TypeDesc},
    readytorun::{
        constants::{FixupKind, ReadyToRunHelper},
        FixupSignature, SignatureContext,
    },
    Error, Result,
};

/// Resolution policy requested for a new import cell
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ImportPolicy {
    Eager,
    Precode,
    DelayLoad {
        helper: ReadyToRunHelper,
        virtual_dispatch: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ImportKey {
    section: ImportSectionId,
    signature: NodeId,
    policy: ImportPolicy,
    call_site: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct MethodEntrypointKey {
    method: MethodDesc,
    constrained: Option<TypeDesc>,
    unboxing: bool,
    instantiating: bool,
    context: SignatureContext,
}

/// Nodes present in every image
#[derive(Clone, Copy, Debug)]
pub(crate) struct HeaderNodes {
    pub(crate) header: NodeId,
    pub(crate) compiler_identifier: NodeId,
    pub(crate) runtime_functions: NodeId,
    pub(crate) exception_info: NodeId,
    pub(crate) method_entry_points: NodeId,
    pub(crate) instance_entry_points: NodeId,
    pub(crate) types_table: NodeId,
    pub(crate) import_sections: NodeId,
    pub(crate) gc_info: NodeId,
    pub(crate) section_cells: [NodeId; ImportSectionId::COUNT],
    pub(crate) section_signatures: [NodeId; ImportSectionId::COUNT],
    pub(crate) gc_ref_maps: [Option<NodeId>; ImportSectionId::COUNT],
}

/// Arena and caches of all nodes of one compilation.
///
/// # Examples
///
/// ```rust
/// use readytorun::compilation::{CompilationConfig, CompilationModuleGroup};
/// use readytorun::factory::NodeFactory;
/// use readytorun::metadata::{token::ModuleId, typesystem::{MethodAttributes, ModuleDesc, TypeKind}};
///
/// let mut app = ModuleDesc::new(ModuleId(0), "App");
/// let program = app.define_type("App", "Program", TypeKind::Class);
/// let main = app.define_method(&program, "Main", MethodAttributes::STATIC);
///
/// let mut factory = NodeFactory::new(CompilationConfig::default(), CompilationModuleGroup::new(app));
/// let context = factory.signature_context();
/// let a = factory.method_entrypoint(&main, None, false, false, context);
/// let b = factory.method_entrypoint(&main, None, false, false, context);
/// assert_eq!(a, b);
/// ```
#[derive(Debug)]
pub struct NodeFactory {
    config: CompilationConfig,
    group: CompilationModuleGroup,
    nodes: Vec<Node>,
    pub(crate) header: HeaderNodes,
    module_import: NodeId,
    personality_routine: Option<NodeId>,
    filter_funclet_personality_routine: Option<NodeId>,

    signatures: HashMap<FixupSignature, NodeId>,
    imports: HashMap<ImportKey, NodeId>,
    helper_cells: HashMap<ReadyToRunHelper, NodeId>,
    thunks: HashMap<(ReadyToRunHelper, ImportSectionId, bool), NodeId>,
    method_entrypoints: HashMap<MethodEntrypointKey, NodeId>,
    compiled_methods: HashMap<MethodDesc, NodeId>,
    pub(crate) symbols: helpers::SymbolCaches,

    pub(crate) layout: Option<ImageLayout>,
}

impl NodeFactory {
    /// Creates the factory together with the nodes every image contains
    #[must_use]
    pub fn new(config: CompilationConfig, group: CompilationModuleGroup) -> Self {
        let mut nodes = Vec::new();
        let mut add = |kind: NodeKind| {
            nodes.push(Node::new(kind));
            NodeId(nodes.len() - 1)
        };

        let header = HeaderNodes {
            header: add(NodeKind::Header),
            compiler_identifier: add(NodeKind::CompilerIdentifier),
            runtime_functions: add(NodeKind::RuntimeFunctionsTable),
            exception_info: add(NodeKind::ExceptionInfoLookupTable),
            method_entry_points: add(NodeKind::MethodEntryPointTable),
            instance_entry_points: add(NodeKind::InstanceEntryPointTable),
            types_table: add(NodeKind::TypesTable),
            import_sections: add(NodeKind::ImportSectionsTable),
            gc_info: add(NodeKind::GcInfo),
            section_cells: [
                add(NodeKind::ImportSectionCells(ImportSectionId::Eager)),
                add(NodeKind::ImportSectionCells(ImportSectionId::Method)),
                add(NodeKind::ImportSectionCells(ImportSectionId::Dispatch)),
                add(NodeKind::ImportSectionCells(ImportSectionId::Helper)),
                add(NodeKind::ImportSectionCells(ImportSectionId::Precode)),
                add(NodeKind::ImportSectionCells(ImportSectionId::String)),
            ],
            section_signatures: [
                add(NodeKind::ImportSectionSignatures(ImportSectionId::Eager)),
                add(NodeKind::ImportSectionSignatures(ImportSectionId::Method)),
                add(NodeKind::ImportSectionSignatures(ImportSectionId::Dispatch)),
                add(NodeKind::ImportSectionSignatures(ImportSectionId::Helper)),
                add(NodeKind::ImportSectionSignatures(ImportSectionId::Precode)),
                add(NodeKind::ImportSectionSignatures(ImportSectionId::String)),
            ],
            gc_ref_maps: [
                None,
                Some(add(NodeKind::GcRefMap(ImportSectionId::Method))),
                Some(add(NodeKind::GcRefMap(ImportSectionId::Dispatch))),
                None,
                None,
                None,
            ],
        };

        let mut factory = NodeFactory {
            config,
            group,
            nodes,
            header,
            module_import: header.header,
            personality_routine: None,
            filter_funclet_personality_routine: None,
            signatures: HashMap::new(),
            imports: HashMap::new(),
            helper_cells: HashMap::new(),
            thunks: HashMap::new(),
            method_entrypoints: HashMap::new(),
            compiled_methods: HashMap::new(),
            symbols: helpers::SymbolCaches::default(),
            layout: None,
        };

        factory.module_import = factory.helper_cell(ReadyToRunHelper::Module);
        if factory.config.target.architecture != TargetArchitecture::X86 {
            factory.personality_routine = Some(factory.import_thunk(
                ReadyToRunHelper::PersonalityRoutine,
                ImportSectionId::Eager,
                false,
            ));
            factory.filter_funclet_personality_routine = Some(factory.import_thunk(
                ReadyToRunHelper::PersonalityRoutineFilterFunclet,
                ImportSectionId::Eager,
                false,
            ));
        }
        factory
    }

    /// The compilation options
    #[must_use]
    pub fn config(&self) -> &CompilationConfig {
        &self.config
    }

    /// The compiled modules
    #[must_use]
    pub fn group(&self) -> &CompilationModuleGroup {
        &self.group
    }

    /// Context resolving tokens against the image's own module
    #[must_use]
    pub fn signature_context(&self) -> SignatureContext {
        SignatureContext::new(self.group.primary_module().id)
    }

    /// Number of nodes created so far
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the node behind `id`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidNode`] if `id` was not created by this factory.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.index()).ok_or(Error::InvalidNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.index()).ok_or(Error::InvalidNode(id))
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(index, node)| (NodeId(index), node))
    }

    fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(kind));
        id
    }

    /// The eager import resolving to the image's module handle
    #[must_use]
    pub fn module_import(&self) -> NodeId {
        self.module_import
    }

    /// Thunk to the personality routine; `None` on x86, which does not use one
    #[must_use]
    pub fn personality_routine(&self) -> Option<NodeId> {
        self.personality_routine
    }

    /// Thunk to the filter funclet personality routine; `None` on x86
    #[must_use]
    pub fn filter_funclet_personality_routine(&self) -> Option<NodeId> {
        self.filter_funclet_personality_routine
    }

    /// The ReadyToRun header node
    #[must_use]
    pub fn header(&self) -> NodeId {
        self.header.header
    }

    /// The compiler identifier node
    #[must_use]
    pub fn compiler_identifier(&self) -> NodeId {
        self.header.compiler_identifier
    }

    /// The import sections table node
    #[must_use]
    pub fn import_sections_table(&self) -> NodeId {
        self.header.import_sections
    }

    /// The cells node of `section`
    #[must_use]
    pub fn import_section(&self, section: ImportSectionId) -> NodeId {
        self.header.section_cells[section.index()]
    }

    /// The GC ref map node of `section`; `None` unless it is a stub dispatch section
    #[must_use]
    pub fn gc_ref_map(&self, section: ImportSectionId) -> Option<NodeId> {
        self.header.gc_ref_maps[section.index()]
    }

    /// Returns the signature node for `signature`, creating it on first use
    pub fn signature(&mut self, signature: FixupSignature) -> NodeId {
        if let Some(&id) = self.signatures.get(&signature) {
            return id;
        }

        let id = self.add_node(NodeKind::Signature(signature.clone()));
        debug!("signature {id}: {signature}");
        self.signatures.insert(signature, id);
        id
    }

    /// Signature node of a method-based fixup
    pub fn method_signature(
        &mut self,
        kind: FixupKind,
        method: &MethodDesc,
        constrained: Option<&TypeDesc>,
        unboxing: bool,
        instantiating: bool,
        context: SignatureContext,
    ) -> NodeId {
        self.signature(FixupSignature::method(
            kind,
            method.clone(),
            constrained.cloned(),
            unboxing,
            instantiating,
            context,
        ))
    }

    /// Returns the import cell for `signature` in `section`, creating it on first use.
    ///
    /// Imports are unique per section, signature, policy and call site, so different
    /// caches asking for the same cell share it.
    pub(crate) fn import(
        &mut self,
        section: ImportSectionId,
        signature: FixupSignature,
        policy: ImportPolicy,
        dependencies: Vec<NodeId>,
        call_site: Option<String>,
    ) -> NodeId {
        let signature = self.signature(signature);
        let key = ImportKey {
            section,
            signature,
            policy,
            call_site: call_site.clone(),
        };
        if let Some(&id) = self.imports.get(&key) {
            return id;
        }

        let kind = match policy {
            ImportPolicy::Eager => ImportKind::Eager,
            ImportPolicy::Precode => ImportKind::Precode,
            ImportPolicy::DelayLoad {
                helper,
                virtual_dispatch,
            } => ImportKind::DelayLoad {
                thunk: self.import_thunk(helper, section, virtual_dispatch),
            },
        };

        let id = self.add_node(NodeKind::Import(Import {
            section,
            signature,
            kind,
            dependencies,
            call_site,
        }));
        debug!("import {id} in {section} ({policy:?})");
        self.imports.insert(key, id);
        id
    }

    /// Precode cell resolved before the methods listing it run
    pub(crate) fn precode_import(&mut self, signature: FixupSignature) -> NodeId {
        self.import(ImportSectionId::Precode, signature, ImportPolicy::Precode, Vec::new(), None)
    }

    /// Delay-load cell resolved through `helper` on first use
    pub(crate) fn delay_load_import(
        &mut self,
        section: ImportSectionId,
        helper: ReadyToRunHelper,
        signature: FixupSignature,
    ) -> NodeId {
        self.import(
            section,
            signature,
            ImportPolicy::DelayLoad {
                helper,
                virtual_dispatch: false,
            },
            Vec::new(),
            None,
        )
    }

    /// Eager cell holding the address of a runtime helper
    pub fn helper_cell(&mut self, helper: ReadyToRunHelper) -> NodeId {
        if let Some(&id) = self.helper_cells.get(&helper) {
            return id;
        }

        let signature = FixupSignature::helper(helper, self.signature_context());
        let id = self.import(ImportSectionId::Eager, signature, ImportPolicy::Eager, Vec::new(), None);
        self.helper_cells.insert(helper, id);
        id
    }

    /// Thunk transferring to `helper` for cells of `section`.
    ///
    /// Cells of the eager section jump straight to the helper; all other sections push
    /// their index and the module before entering the delay-load helper.
    pub fn import_thunk(&mut self, helper: ReadyToRunHelper, section: ImportSectionId, virtual_dispatch: bool) -> NodeId {
        let key = (helper, section, virtual_dispatch);
        if let Some(&id) = self.thunks.get(&key) {
            return id;
        }

        let kind = if section == ImportSectionId::Eager {
            ThunkKind::Eager
        } else if virtual_dispatch {
            ThunkKind::VirtualStubDispatch
        } else {
            ThunkKind::DelayLoad
        };
        let helper_cell = self.helper_cell(helper);
        let module_cell = self.helper_cell(ReadyToRunHelper::Module);

        let id = self.add_node(NodeKind::ImportThunk(ImportThunk {
            helper,
            section,
            kind,
            helper_cell,
            module_cell,
        }));
        debug!("thunk {id} for {helper} in {section} ({kind:?})");
        self.thunks.insert(key, id);
        id
    }

    /// Entry point import of `method`.
    ///
    /// Methods compiled into this image carry a dependency on their body so that
    /// referencing them compiles them.
    pub fn method_entrypoint(
        &mut self,
        method: &MethodDesc,
        constrained: Option<&TypeDesc>,
        unboxing: bool,
        instantiating: bool,
        context: SignatureContext,
    ) -> NodeId {
        let key = MethodEntrypointKey {
            method: method.clone(),
            constrained: constrained.cloned(),
            unboxing,
            instantiating,
            context,
        };
        if let Some(&id) = self.method_entrypoints.get(&key) {
            return id;
        }

        let dependencies = if self.group.contains_method_body(method) {
            vec![self.compiled_method(method)]
        } else {
            Vec::new()
        };
        let signature = FixupSignature::method(
            FixupKind::MethodEntry,
            method.clone(),
            constrained.cloned(),
            unboxing,
            instantiating,
            context,
        );
        let id = self.import(
            ImportSectionId::Method,
            signature,
            ImportPolicy::DelayLoad {
                helper: ReadyToRunHelper::DelayLoadMethodCall,
                virtual_dispatch: false,
            },
            dependencies,
            None,
        );
        self.method_entrypoints.insert(key, id);
        id
    }

    /// Body node of `method`.
    ///
    /// Instantiations sharing code map to the body node of their canonical form, so
    /// shared code is compiled once.
    pub fn compiled_method(&mut self, method: &MethodDesc) -> NodeId {
        let canonical = method.canonical_method();
        if let Some(&id) = self.compiled_methods.get(&canonical) {
            return id;
        }

        let id = self.add_node(NodeKind::Method(MethodNode {
            method: canonical.clone(),
            state: MethodState::Unvisited,
            code: None,
        }));
        debug!("method {id}: {canonical}");
        self.compiled_methods.insert(canonical, id);
        id
    }

    /// The mangled symbol name of `id`, computed on first request.
    ///
    /// # Errors
    /// Returns [`Error::InvalidNode`] if `id` was not created by this factory.
    pub fn mangled_name(&self, id: NodeId) -> Result<&str> {
        let node = self.node(id)?;
        if let Some(name) = node.mangled_name.get() {
            return Ok(name);
        }
        let name = self.compute_mangled_name(id)?;
        Ok(node.mangled_name.get_or_init(|| name))
    }

    /// Nodes that must be emitted because `id` is.
    ///
    /// Method bodies report the targets of their relocations, so they must be compiled
    /// before their dependencies are requested.
    ///
    /// # Errors
    /// Returns [`Error::InvalidNode`] for foreign ids.
    pub fn dependencies(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let node = self.node(id)?;
        let header = &self.header;

        let dependencies = match &node.kind {
            NodeKind::Header => {
                let mut tables = vec![
                    header.compiler_identifier,
                    header.import_sections,
                    header.runtime_functions,
                    header.method_entry_points,
                    header.exception_info,
                ];
                if self.config.emit_instance_entry_points {
                    tables.push(header.instance_entry_points);
                }
                if self.config.emit_types_table {
                    tables.push(header.types_table);
                }
                tables
            }
            NodeKind::ImportSectionsTable => header
                .section_cells
                .iter()
                .chain(header.section_signatures.iter())
                .copied()
                .chain(header.gc_ref_maps.iter().flatten().copied())
                .collect(),
            NodeKind::RuntimeFunctionsTable => vec![header.gc_info],
            NodeKind::Import(import) => {
                let mut dependencies = vec![
                    import.signature,
                    header.section_cells[import.section.index()],
                    header.section_signatures[import.section.index()],
                ];
                if let ImportKind::DelayLoad { thunk } = import.kind {
                    dependencies.push(thunk);
                }
                dependencies.extend(import.dependencies.iter().copied());
                dependencies
            }
            NodeKind::ImportThunk(thunk) => match thunk.kind {
                ThunkKind::Eager => vec![thunk.helper_cell],
                ThunkKind::DelayLoad | ThunkKind::VirtualStubDispatch => {
                    vec![thunk.helper_cell, thunk.module_cell]
                }
            },
            NodeKind::Method(method) => match &method.code {
                Some(code) => {
                    let targets: Vec<NodeId> = code
                        .relocs
                        .iter()
                        .map(|reloc| reloc.target)
                        .chain(code.fixups.iter().copied())
                        .collect();
                    for &target in &targets {
                        self.node(target)?;
                    }
                    targets
                }
                None => Vec::new(),
            },
            NodeKind::CompilerIdentifier
            | NodeKind::ExceptionInfoLookupTable
            | NodeKind::MethodEntryPointTable
            | NodeKind::InstanceEntryPointTable
            | NodeKind::TypesTable
            | NodeKind::GcInfo
            | NodeKind::ImportSectionCells(_)
            | NodeKind::ImportSectionSignatures(_)
            | NodeKind::GcRefMap(_)
            | NodeKind::Signature(_)
            | NodeKind::ExternalType(_) => Vec::new(),
        };
        Ok(dependencies)
    }

    /// The method still waiting for compilation behind `id`, marking it as compiling
    pub(crate) fn begin_compile(&mut self, id: NodeId) -> Result<Option<MethodDesc>> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Method(node) if node.state == MethodState::Unvisited => {
                node.state = MethodState::Compiling;
                Ok(Some(node.method.clone()))
            }
            _ => Ok(None),
        }
    }

    /// Records the outcome of compiling the method behind `id`
    pub(crate) fn complete_compile(&mut self, id: NodeId, outcome: std::result::Result<MethodCode, String>) -> Result<()> {
        if let Ok(code) = &outcome {
            for reloc in &code.relocs {
                self.node(reloc.target)?;
            }
            for &fixup in &code.fixups {
                if self.node(fixup)?.as_import().is_none() {
                    return Err(malformed_error!("fixup {} of node {} is not an import cell", fixup, id));
                }
            }
        }

        match &mut self.node_mut(id)?.kind {
            NodeKind::Method(node) if node.state == MethodState::Compiling => {
                match outcome {
                    Ok(code) => {
                        node.state = MethodState::Compiled;
                        node.code = Some(code);
                    }
                    Err(reason) => {
                        node.state = MethodState::Failed(reason);
                        node.code = None;
                    }
                }
                Ok(())
            }
            _ => Err(malformed_error!("node {} is not a method being compiled", id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::typesystem::MethodAttributes,
        test::factories::{corelib, factory_for},
    };

    #[test]
    fn signatures_are_cached_by_value() {
        let lib = corelib();
        let string = lib.string.clone();
        let mut factory = factory_for(lib.module);
        let context = factory.signature_context();

        let a = factory.signature(FixupSignature::ty(FixupKind::TypeHandle, string.clone(), context));
        let b = factory.signature(FixupSignature::ty(FixupKind::TypeHandle, string.clone(), context));
        let c = factory.signature(FixupSignature::ty(FixupKind::NewObject, string, context));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn module_import_is_the_module_helper_cell() {
        let lib = corelib();
        let mut factory = factory_for(lib.module);
        let module = factory.module_import();
        assert_eq!(factory.helper_cell(ReadyToRunHelper::Module), module);

        let import = factory.node(module).unwrap().as_import().unwrap();
        assert_eq!(import.section, ImportSectionId::Eager);
        assert_eq!(import.kind, ImportKind::Eager);
    }

    #[test]
    fn personality_routines_exist_except_on_x86() {
        let lib = corelib();
        let factory = factory_for(lib.module.clone());
        assert!(factory.personality_routine().is_some());
        assert!(factory.filter_funclet_personality_routine().is_some());
        assert_ne!(factory.personality_routine(), factory.filter_funclet_personality_routine());

        let config = CompilationConfig::default().with_target(crate::compilation::TargetDetails::new(
            TargetArchitecture::X86,
            crate::compilation::TargetOs::Windows,
        ));
        let factory = NodeFactory::new(config, CompilationModuleGroup::new(lib.module));
        assert!(factory.personality_routine().is_none());
    }

    #[test]
    fn local_entrypoints_depend_on_their_body() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let to_string = lib.module.define_method(&object, "ToString", MethodAttributes::VIRTUAL);
        let mut factory = factory_for(lib.module);
        let context = factory.signature_context();

        let entry = factory.method_entrypoint(&to_string, None, false, false, context);
        let body = factory.compiled_method(&to_string);
        let import = factory.node(entry).unwrap().as_import().unwrap();
        assert_eq!(import.section, ImportSectionId::Method);
        assert_eq!(import.dependencies, vec![body]);
        assert!(factory.dependencies(entry).unwrap().contains(&body));

        let unboxing = factory.method_entrypoint(&to_string, None, true, false, context);
        assert_ne!(entry, unboxing);
    }

    #[test]
    fn shared_instantiations_use_one_body() {
        let mut lib = corelib();
        let list = lib.list.clone();
        let add = lib.module.define_method(&list, "Add", MethodAttributes::empty());
        let on_string = add.on_type(list.instantiate(vec![lib.string.clone()]).unwrap());
        let on_object = add.on_type(list.instantiate(vec![lib.object.clone()]).unwrap());
        let mut factory = factory_for(lib.module);

        assert_eq!(factory.compiled_method(&on_string), factory.compiled_method(&on_object));
    }

    #[test]
    fn thunks_are_shared_per_helper_and_section() {
        let lib = corelib();
        let mut factory = factory_for(lib.module);
        let a = factory.import_thunk(ReadyToRunHelper::DelayLoadHelper, ImportSectionId::Helper, false);
        let b = factory.import_thunk(ReadyToRunHelper::DelayLoadHelper, ImportSectionId::Helper, false);
        let c = factory.import_thunk(ReadyToRunHelper::DelayLoadHelper, ImportSectionId::Dispatch, false);
        let d = factory.import_thunk(ReadyToRunHelper::DelayLoadMethodCall, ImportSectionId::Dispatch, true);
        assert_eq!(a, b);
        assert_ne!(a, c);

        match factory.node(d).unwrap().kind() {
            NodeKind::ImportThunk(thunk) => assert_eq!(thunk.kind, ThunkKind::VirtualStubDispatch),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn foreign_node_ids_are_rejected() {
        let lib = corelib();
        let factory = factory_for(lib.module);
        let foreign = NodeId::new(factory.node_count() + 10);
        assert!(matches!(factory.node(foreign), Err(Error::InvalidNode(id)) if id == foreign));
        assert!(factory.dependencies(foreign).is_err());
    }
}
