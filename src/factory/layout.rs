//! Index assignment after marking.
//!
//! Once the graph is complete every marked import gets its slot within its section
//! and every compiled method its row in the runtime functions table. Both orders
//! follow marking order, which is also the order the object writer places method
//! code in: runtime function rows must be sorted by begin address. The
//! entry-point tables, the available types table and the GC info pool are filled in
//! the same pass because they only depend on these indices.

use std::collections::HashMap;

use log::debug;
use strum::EnumCount;

use crate::{
    dependency::{DependencyGraph, NodeId},
    factory::{ImportKind, ImportSectionId, MethodCode, MethodState, NodeFactory, NodeKind},
    metadata::{token::TokenType, typesystem::hash::method_hash_code},
    readytorun::{EntryPointLayout, EntryPointTable, GcInfoPool, InstanceEntryPointTable, SignatureBuilder, TypesTable},
    utils::NibbleWriter,
    Error, Result,
};

/// Indices and table contents fixed after marking
#[derive(Debug)]
pub struct ImageLayout {
    pub(crate) section_imports: [Vec<NodeId>; ImportSectionId::COUNT],
    pub(crate) import_slots: HashMap<NodeId, usize>,
    pub(crate) methods: Vec<NodeId>,
    pub(crate) method_indices: HashMap<NodeId, u32>,
    pub(crate) gc_info: GcInfoPool,
    pub(crate) gc_info_offsets: Vec<usize>,
    pub(crate) entry_points: EntryPointTable,
    pub(crate) instance_entry_points: InstanceEntryPointTable,
    pub(crate) types: TypesTable,
}

impl ImageLayout {
    /// Marked imports of `section` in slot order
    #[must_use]
    pub fn section_imports(&self, section: ImportSectionId) -> &[NodeId] {
        &self.section_imports[section.index()]
    }

    /// Slot of an import cell within its section
    #[must_use]
    pub fn import_slot(&self, import: NodeId) -> Option<usize> {
        self.import_slots.get(&import).copied()
    }

    /// Compiled methods in runtime function order
    #[must_use]
    pub fn methods(&self) -> &[NodeId] {
        &self.methods
    }

    /// Runtime function row of a compiled method
    #[must_use]
    pub fn method_index(&self, method: NodeId) -> Option<u32> {
        self.method_indices.get(&method).copied()
    }

    /// Entry points of the primary module's methods
    #[must_use]
    pub fn entry_points(&self) -> &EntryPointTable {
        &self.entry_points
    }

    /// Entry points of all other compiled methods
    #[must_use]
    pub fn instance_entry_points(&self) -> &InstanceEntryPointTable {
        &self.instance_entry_points
    }

    /// Available types of the primary module
    #[must_use]
    pub fn types(&self) -> &TypesTable {
        &self.types
    }

    /// Deduplicated unwind and GC info
    #[must_use]
    pub fn gc_info(&self) -> &GcInfoPool {
        &self.gc_info
    }
}

impl NodeFactory {
    /// Fixes slot and method indices for the marked nodes of `graph` and fills the
    /// header tables.
    ///
    /// # Errors
    /// Returns an error if a method's signature cannot be encoded for the instance
    /// entry point table or a compiled method references a foreign node.
    pub fn finalize_layout(&mut self, graph: &DependencyGraph) -> Result<()> {
        // must match the object writer's placement order
        let marked = graph.marked_nodes();

        let mut section_imports: [Vec<NodeId>; ImportSectionId::COUNT] = Default::default();
        let mut import_slots = HashMap::new();
        let mut methods = Vec::new();

        for &id in marked {
            match &self.node(id)?.kind {
                NodeKind::Import(import) => {
                    let cells = &mut section_imports[import.section.index()];
                    import_slots.insert(id, cells.len());
                    cells.push(id);
                }
                NodeKind::Method(method) if method.state == MethodState::Compiled => methods.push(id),
                _ => {}
            }
        }

        let mut layout = ImageLayout {
            section_imports,
            import_slots,
            method_indices: HashMap::with_capacity(methods.len()),
            methods: Vec::with_capacity(methods.len()),
            gc_info: GcInfoPool::new(),
            gc_info_offsets: Vec::with_capacity(methods.len()),
            entry_points: EntryPointTable::new(EntryPointLayout::Array),
            instance_entry_points: InstanceEntryPointTable::new(),
            types: TypesTable::new(),
        };

        let primary = self.group().primary_module().id;
        let context = self.signature_context();

        for id in methods {
            let index = layout.methods.len() as u32;
            let node = self.node(id)?.as_method().ok_or(Error::InvalidNode(id))?;
            let code = node
                .code
                .as_ref()
                .ok_or_else(|| malformed_error!("compiled method {} has no code", id))?;

            let mut info = code.unwind_info.clone();
            info.extend_from_slice(&code.gc_info);
            layout.gc_info_offsets.push(layout.gc_info.add(&info));

            let fixups = self.method_fixup_blob(code, &layout)?;
            let method = &node.method;
            let hash_code = method_hash_code(method) as u32;

            let is_primary_def = method.module() == Some(primary)
                && !method.is_generic()
                && method.token().token_type() == Some(TokenType::MethodDef);
            if is_primary_def {
                layout
                    .entry_points
                    .add(method.token().rid(), index, fixups.as_deref(), None, hash_code);
            } else if self.config().emit_instance_entry_points {
                let mut signature = SignatureBuilder::new();
                signature.emit_method_signature(method, None, false, false, context)?;
                layout.instance_entry_points.add(
                    method.token().rid(),
                    index,
                    fixups.as_deref(),
                    Some(signature.as_bytes()),
                    hash_code,
                );
            }

            layout.method_indices.insert(id, index);
            layout.methods.push(id);
        }

        if self.config().emit_types_table {
            for ty in self.group().primary_module().types() {
                if let Some(definition) = ty.definition() {
                    layout.types.add(definition.token.rid(), ty);
                }
            }
        }

        debug!(
            "layout: {} methods, {} imports, {} bytes of gc info",
            layout.methods.len(),
            layout.import_slots.len(),
            layout.gc_info.len()
        );
        self.layout = Some(layout);
        Ok(())
    }

    /// The layout computed by [`NodeFactory::finalize_layout`]
    #[must_use]
    pub fn layout(&self) -> Option<&ImageLayout> {
        self.layout.as_ref()
    }

    pub(crate) fn require_layout(&self) -> Result<&ImageLayout> {
        self.layout
            .as_ref()
            .ok_or_else(|| malformed_error!("image layout requested before it was finalized"))
    }

    /// Encodes the cells the runtime must resolve before `code` first runs.
    ///
    /// The list holds the precode cells the code's relocations reach and every
    /// non-eager cell the code names as explicit fixup; eager cells are resolved when
    /// the image loads. Cells are sorted by section and slot; each section starts with
    /// its index delta and first slot, followed by slot deltas and a zero terminator,
    /// and a second zero ends the list.
    fn method_fixup_blob(&self, code: &MethodCode, layout: &ImageLayout) -> Result<Option<Vec<u8>>> {
        let reached = code.relocs.iter().map(|reloc| (reloc.target, false));
        let explicit = code.fixups.iter().map(|&fixup| (fixup, true));

        let mut fixups = Vec::new();
        for (target, is_explicit) in reached.chain(explicit) {
            let Some(import) = self.node(target)?.as_import() else {
                continue;
            };
            let listed = match import.kind {
                ImportKind::Eager => false,
                ImportKind::Precode => true,
                ImportKind::DelayLoad { .. } => is_explicit,
            };
            if !listed {
                continue;
            }
            let slot = layout
                .import_slot(target)
                .ok_or_else(|| malformed_error!("fixup {} is not marked", target))?;
            fixups.push((import.section.index() as u32, slot as u32));
        }
        if fixups.is_empty() {
            return Ok(None);
        }
        fixups.sort_unstable();
        fixups.dedup();

        let mut writer = NibbleWriter::new();
        let mut current_table = 0;
        let mut previous_slot = 0;
        for (position, &(table, slot)) in fixups.iter().enumerate() {
            if position == 0 || table != current_table {
                if position != 0 {
                    writer.write_unsigned(0);
                }
                writer.write_unsigned(table - current_table);
                writer.write_unsigned(slot);
                current_table = table;
            } else {
                writer.write_unsigned(slot - previous_slot);
            }
            previous_slot = slot;
        }
        writer.write_unsigned(0);
        writer.write_unsigned(0);

        Ok(Some(writer.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dependency::{Relocation, RelocationKind},
        factory::{HelperTarget, MethodCode},
        metadata::{
            token::{ModuleId, ModuleToken, Token},
            typesystem::MethodAttributes,
        },
        readytorun::constants::ReadyToRunHelperId,
        test::factories::{corelib, factory_for},
    };

    fn reloc(target: NodeId) -> Relocation {
        Relocation {
            offset: 0,
            kind: RelocationKind::Rel32,
            target,
        }
    }

    fn compile(factory: &mut NodeFactory, graph: &mut DependencyGraph, body: NodeId, code: MethodCode) {
        graph.mark(body);
        factory.begin_compile(body).unwrap();
        factory.complete_compile(body, Ok(code)).unwrap();
        for dependency in factory.dependencies(body).unwrap() {
            graph.mark(dependency);
        }
    }

    #[test]
    fn fixup_blob_lists_precode_cells_only() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let string = lib.string.clone();
        let method = lib.module.define_method(&object, "ToString", MethodAttributes::VIRTUAL);
        let mut factory = factory_for(lib.module);
        let context = factory.signature_context();

        let handle = factory
            .ready_to_run_helper(ReadyToRunHelperId::TypeHandle, HelperTarget::Type(string.clone()), context)
            .unwrap();
        let literal = factory.string_literal(ModuleToken::new(
            ModuleId(0),
            Token::from_parts(TokenType::String, 1),
        ));
        let allocator = factory
            .ready_to_run_helper(ReadyToRunHelperId::NewHelper, HelperTarget::Type(string), context)
            .unwrap();

        let body = factory.compiled_method(&method);
        let mut graph = DependencyGraph::new();
        let code = MethodCode::new(vec![0xC3])
            .with_reloc(reloc(handle))
            .with_reloc(reloc(literal))
            .with_reloc(reloc(allocator))
            .with_reloc(reloc(handle));
        compile(&mut factory, &mut graph, body, code);
        factory.finalize_layout(&graph).unwrap();

        let layout = factory.layout().unwrap();
        assert_eq!(layout.import_slot(handle), Some(0));
        assert_eq!(layout.import_slot(literal), Some(0));
        assert_eq!(layout.method_index(body), Some(0));

        let entry = layout.entry_points().entry(method.token().rid()).unwrap();
        let blob = layout.entry_points().fixups().get(entry.fixups.unwrap()).unwrap();
        // precode table 4 slot 0, end of table, delta 1 to table 5 slot 0, end, end
        let mut expected = NibbleWriter::new();
        for value in [4, 0, 0, 1, 0, 0, 0] {
            expected.write_unsigned(value);
        }
        assert_eq!(blob, expected.into_bytes().as_slice());
    }

    #[test]
    fn explicit_fixups_list_helper_cells() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let string = lib.string.clone();
        let method = lib.module.define_method(&object, "Equals", MethodAttributes::VIRTUAL);
        let mut factory = factory_for(lib.module);
        let context = factory.signature_context();

        let handle = factory
            .ready_to_run_helper(ReadyToRunHelperId::TypeHandle, HelperTarget::Type(string.clone()), context)
            .unwrap();
        let allocator = factory
            .ready_to_run_helper(ReadyToRunHelperId::NewHelper, HelperTarget::Type(string), context)
            .unwrap();
        let module = factory.module_import();

        let body = factory.compiled_method(&method);
        let mut graph = DependencyGraph::new();
        let code = MethodCode::new(vec![0xC3])
            .with_reloc(reloc(handle))
            .with_fixup(allocator)
            .with_fixup(module);
        compile(&mut factory, &mut graph, body, code);
        factory.finalize_layout(&graph).unwrap();

        let layout = factory.layout().unwrap();
        assert_eq!(layout.section_imports(ImportSectionId::Helper), &[allocator]);

        let entry = layout.entry_points().entry(method.token().rid()).unwrap();
        let blob = layout.entry_points().fixups().get(entry.fixups.unwrap()).unwrap();
        // helper table 3 slot 0, end, delta 1 to precode table 4 slot 0, end, end;
        // the eager module cell is resolved at load time and not listed
        let mut expected = NibbleWriter::new();
        for value in [3, 0, 0, 1, 0, 0, 0] {
            expected.write_unsigned(value);
        }
        assert_eq!(blob, expected.into_bytes().as_slice());
    }

    #[test]
    fn fixups_must_be_import_cells() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let method = lib.module.define_method(&object, "Finalize", MethodAttributes::VIRTUAL);
        let mut factory = factory_for(lib.module);

        let body = factory.compiled_method(&method);
        factory.begin_compile(body).unwrap();
        let code = MethodCode::new(vec![0xC3]).with_fixup(body);
        assert!(matches!(
            factory.complete_compile(body, Ok(code)),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn methods_without_precode_cells_have_no_fixups() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let method = lib.module.define_method(&object, "GetHashCode", MethodAttributes::VIRTUAL);
        let mut factory = factory_for(lib.module);

        let body = factory.compiled_method(&method);
        let mut graph = DependencyGraph::new();
        compile(&mut factory, &mut graph, body, MethodCode::new(vec![0x90, 0xC3]));
        factory.finalize_layout(&graph).unwrap();

        let layout = factory.layout().unwrap();
        let entry = layout.entry_points().entry(method.token().rid()).unwrap();
        assert_eq!(entry.fixups, None);
        assert!(layout.instance_entry_points().is_empty());
    }

    #[test]
    fn generic_instantiations_use_the_instance_table() {
        let mut lib = corelib();
        let list = lib.list.clone();
        let add = lib.module.define_method(&list, "Add", MethodAttributes::empty());
        let of_int = add.on_type(list.instantiate(vec![lib.int32.clone()]).unwrap());
        let mut factory = factory_for(lib.module);

        let body = factory.compiled_method(&of_int);
        let mut graph = DependencyGraph::new();
        compile(&mut factory, &mut graph, body, MethodCode::new(vec![0xC3]));
        factory.finalize_layout(&graph).unwrap();

        let layout = factory.layout().unwrap();
        assert!(layout.entry_points().is_empty());
        assert_eq!(layout.instance_entry_points().len(), 1);
        assert!(layout.instance_entry_points().entries()[0].signature.is_some());
    }

    #[test]
    fn identical_gc_info_is_shared() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let first = lib.module.define_method(&object, "A", MethodAttributes::STATIC);
        let second = lib.module.define_method(&object, "B", MethodAttributes::STATIC);
        let mut factory = factory_for(lib.module);

        let mut graph = DependencyGraph::new();
        for method in [&first, &second] {
            let body = factory.compiled_method(method);
            let code = MethodCode::new(vec![0xC3])
                .with_unwind_info(vec![1, 0, 0, 0])
                .with_gc_info(vec![0x42]);
            compile(&mut factory, &mut graph, body, code);
        }
        factory.finalize_layout(&graph).unwrap();

        let layout = factory.layout().unwrap();
        assert_eq!(layout.gc_info().data(), &[1, 0, 0, 0, 0x42]);
        assert_eq!(layout.gc_info_offsets, vec![0, 0]);
    }

    #[test]
    fn methods_are_numbered_in_marking_order() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let early = lib.module.define_method(&object, "Early", MethodAttributes::STATIC);
        let late = lib.module.define_method(&object, "Late", MethodAttributes::STATIC);
        let mut factory = factory_for(lib.module);

        // created first, reached last
        let early_body = factory.compiled_method(&early);
        let late_body = factory.compiled_method(&late);
        assert!(early_body < late_body);

        let mut graph = DependencyGraph::new();
        compile(&mut factory, &mut graph, late_body, MethodCode::new(vec![0xC3]));
        compile(&mut factory, &mut graph, early_body, MethodCode::new(vec![0xC3]));
        factory.finalize_layout(&graph).unwrap();

        let layout = factory.layout().unwrap();
        assert_eq!(layout.methods(), &[late_body, early_body]);
        assert_eq!(layout.method_index(late_body), Some(0));
    }

    #[test]
    fn types_table_lists_primary_module_types() {
        let lib = corelib();
        let count = lib.module.types().len();
        let mut factory = factory_for(lib.module);
        factory.finalize_layout(&DependencyGraph::new()).unwrap();
        assert_eq!(factory.layout().unwrap().types().len(), count);
    }
}
