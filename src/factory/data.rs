//! Serialization of every node kind.
//!
//! Table and cell nodes read the indices fixed by [`NodeFactory::finalize_layout`];
//! asking for their data earlier is an error. References between nodes are emitted
//! as relocations with the addend stored in the data, so the object writer only
//! needs symbol addresses to resolve them.

use log::debug;
use strum::IntoEnumIterator;

use crate::{
    compilation::TargetArchitecture,
    dependency::{NodeId, ObjectData, ObjectDataBuilder, RelocationKind},
    factory::{ImportKind, ImportSectionId, ImportThunk, MethodState, NodeFactory, NodeKind, ThunkKind},
    readytorun::{
        constants::{
            SectionType, IMPORT_SECTION_ENTRY_SIZE, READYTORUN_MAJOR_VERSION, READYTORUN_MINOR_VERSION,
            READYTORUN_SIGNATURE,
        },
        Fixup, GcRefMapBuilder, TransitionBlock, GCREFMAP_LOOKUP_STRIDE,
    },
    Error, Result,
};

/// Size of one exception lookup entry: method RVA and clause RVA
const EH_LOOKUP_ENTRY_SIZE: usize = 8;

impl NodeFactory {
    /// Final bytes of node `id`; `None` for nodes that own no data.
    ///
    /// Import cells are emitted by their section, external types live in other
    /// images, and methods that did not compile are left to the runtime JIT.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for table nodes requested before the layout is
    /// finalized, [`Error::NotImplemented`] for thunks and GC ref maps on ARM targets,
    /// [`Error::TypeSystem`] for calls whose arguments cannot be laid out, and signature
    /// encoding errors for signature nodes.
    pub fn get_data(&self, id: NodeId) -> Result<Option<ObjectData>> {
        let node = self.node(id)?;
        let data = match &node.kind {
            NodeKind::Header => self.header_data(id),
            NodeKind::CompilerIdentifier => {
                let mut bytes = self.config().compiler_identifier.as_bytes().to_vec();
                bytes.push(0);
                ObjectData::blob(id, bytes, 1)
            }
            NodeKind::RuntimeFunctionsTable => self.runtime_functions_data(id)?,
            NodeKind::ExceptionInfoLookupTable => self.exception_info_data(id)?,
            NodeKind::MethodEntryPointTable => {
                ObjectData::blob(id, self.require_layout()?.entry_points.get_data(), 8)
            }
            NodeKind::InstanceEntryPointTable => {
                ObjectData::blob(id, self.require_layout()?.instance_entry_points.get_data(), 8)
            }
            NodeKind::TypesTable => ObjectData::blob(id, self.require_layout()?.types.get_data(), 4),
            NodeKind::ImportSectionsTable => self.import_sections_data(id)?,
            NodeKind::GcInfo => ObjectData::blob(id, self.require_layout()?.gc_info.data().to_vec(), 4),
            NodeKind::ImportSectionCells(section) => self.section_cells_data(id, *section)?,
            NodeKind::ImportSectionSignatures(section) => self.section_signatures_data(id, *section)?,
            NodeKind::GcRefMap(section) => self.gc_ref_map_data(id, *section)?,
            NodeKind::Signature(signature) => ObjectData::blob(id, signature.encode()?, 1),
            NodeKind::ImportThunk(thunk) => self.thunk_data(id, thunk)?,
            NodeKind::Method(method) => match (&method.state, &method.code) {
                (MethodState::Compiled, Some(code)) => ObjectData {
                    data: code.code.clone(),
                    alignment: code.alignment,
                    relocs: code.relocs.clone(),
                    defined_symbols: vec![(id, 0)],
                },
                _ => return Ok(None),
            },
            NodeKind::Import(_) | NodeKind::ExternalType(_) => return Ok(None),
        };
        Ok(Some(data))
    }

    fn header_data(&self, id: NodeId) -> ObjectData {
        let mut sections = vec![
            (SectionType::CompilerIdentifier, self.header.compiler_identifier),
            (SectionType::ImportSections, self.header.import_sections),
            (SectionType::RuntimeFunctions, self.header.runtime_functions),
            (SectionType::MethodDefEntryPoints, self.header.method_entry_points),
            (SectionType::ExceptionInfo, self.header.exception_info),
        ];
        if self.config().emit_types_table {
            sections.push((SectionType::AvailableTypes, self.header.types_table));
        }
        if self.config().emit_instance_entry_points {
            sections.push((SectionType::InstanceMethodEntryPoints, self.header.instance_entry_points));
        }
        sections.sort_by_key(|&(section, _)| section as u32);

        let mut builder = ObjectDataBuilder::new(id, 4);
        builder.emit_u32(READYTORUN_SIGNATURE);
        builder.emit_u16(READYTORUN_MAJOR_VERSION);
        builder.emit_u16(READYTORUN_MINOR_VERSION);
        builder.emit_u32(0);
        builder.emit_u32(sections.len() as u32);
        for (section, node) in sections {
            builder.emit_u32(section as u32);
            builder.emit_reloc(RelocationKind::Addr32Nb, node, 0);
            builder.emit_reloc(RelocationKind::SymbolSize, node, 0);
        }
        builder.finish()
    }

    fn import_sections_data(&self, id: NodeId) -> Result<ObjectData> {
        let layout = self.require_layout()?;
        let pointer_size = self.config().target.pointer_size();

        let mut builder = ObjectDataBuilder::new(id, 4);
        for section in ImportSectionId::iter() {
            let start = builder.position();
            let populated = !layout.section_imports(section).is_empty();
            let cells = self.header.section_cells[section.index()];
            let signatures = self.header.section_signatures[section.index()];

            if populated {
                builder.emit_reloc(RelocationKind::Addr32Nb, cells, 0);
                builder.emit_reloc(RelocationKind::SymbolSize, cells, 0);
            } else {
                builder.emit_u32(0);
                builder.emit_u32(0);
            }
            builder.emit_u16(section.flags().bits());
            builder.emit_u8(section.section_type() as u8);
            builder.emit_u8(pointer_size as u8);
            if populated {
                builder.emit_reloc(RelocationKind::Addr32Nb, signatures, 0);
            } else {
                builder.emit_u32(0);
            }
            match self.header.gc_ref_maps[section.index()] {
                Some(gc_ref_map) if populated => builder.emit_reloc(RelocationKind::Addr32Nb, gc_ref_map, 0),
                _ => builder.emit_u32(0),
            }

            debug_assert_eq!(builder.position() - start, IMPORT_SECTION_ENTRY_SIZE);
        }
        Ok(builder.finish())
    }

    fn section_cells_data(&self, id: NodeId, section: ImportSectionId) -> Result<ObjectData> {
        let layout = self.require_layout()?;
        let pointer_size = self.config().target.pointer_size();

        let mut builder = ObjectDataBuilder::new(id, pointer_size);
        for &import_id in layout.section_imports(section) {
            let import = self.node(import_id)?.as_import().ok_or(Error::InvalidNode(import_id))?;
            builder.define_symbol(import_id);
            match import.kind {
                ImportKind::Eager | ImportKind::Precode => builder.emit_zeros(pointer_size),
                ImportKind::DelayLoad { thunk } => builder.emit_pointer_reloc(thunk, pointer_size),
            }
        }
        Ok(builder.finish())
    }

    fn section_signatures_data(&self, id: NodeId, section: ImportSectionId) -> Result<ObjectData> {
        let layout = self.require_layout()?;

        let mut builder = ObjectDataBuilder::new(id, 4);
        for &import_id in layout.section_imports(section) {
            let import = self.node(import_id)?.as_import().ok_or(Error::InvalidNode(import_id))?;
            builder.emit_reloc(RelocationKind::Addr32Nb, import.signature, 0);
        }
        Ok(builder.finish())
    }

    /// Lookup index followed by one ref map per cell of `section`.
    ///
    /// Entry `k` of the index holds the offset of the map of cell `k * 1024`, so the
    /// runtime scans at most one stride of maps. Cells that are not method calls get an
    /// empty map.
    fn gc_ref_map_data(&self, id: NodeId, section: ImportSectionId) -> Result<ObjectData> {
        let layout = self.require_layout()?;
        let imports = layout.section_imports(section);
        let block = TransitionBlock::for_target(&self.config().target)?;

        let index_size = (imports.len() / GCREFMAP_LOOKUP_STRIDE + 1) * 4;
        let mut offsets = vec![index_size as u32];
        let mut maps = GcRefMapBuilder::new();
        for (index, &import_id) in imports.iter().enumerate() {
            let import = self.node(import_id)?.as_import().ok_or(Error::InvalidNode(import_id))?;
            match self.node(import.signature)?.kind() {
                NodeKind::Signature(signature) => match &signature.fixup {
                    Fixup::Method { method, unboxing, .. } => block.call_ref_map(method, *unboxing, &mut maps)?,
                    _ => maps.flush(),
                },
                _ => return Err(Error::InvalidNode(import.signature)),
            }
            if (index + 1) % GCREFMAP_LOOKUP_STRIDE == 0 {
                offsets.push((index_size + maps.len()) as u32);
            }
        }
        debug!("{section}: {} GC ref map bytes for {} cells", maps.len(), imports.len());

        let mut builder = ObjectDataBuilder::new(id, 4);
        for offset in offsets {
            builder.emit_u32(offset);
        }
        builder.emit_bytes(maps.data());
        Ok(builder.finish())
    }

    fn runtime_functions_data(&self, id: NodeId) -> Result<ObjectData> {
        let layout = self.require_layout()?;
        let with_end = self.config().target.architecture == TargetArchitecture::X64;

        let mut builder = ObjectDataBuilder::new(id, 4);
        for (index, &method_id) in layout.methods.iter().enumerate() {
            let method = self.node(method_id)?.as_method().ok_or(Error::InvalidNode(method_id))?;
            let length = method.code.as_ref().map_or(0, |code| code.code.len());
            let gc_offset = layout.gc_info_offsets[index];

            builder.emit_reloc(RelocationKind::Addr32Nb, method_id, 0);
            if with_end {
                builder.emit_reloc(RelocationKind::Addr32Nb, method_id, length as i32);
            }
            builder.emit_reloc(RelocationKind::Addr32Nb, self.header.gc_info, gc_offset as i32);
        }
        Ok(builder.finish())
    }

    fn exception_info_data(&self, id: NodeId) -> Result<ObjectData> {
        let layout = self.require_layout()?;

        let mut clauses = Vec::new();
        for &method_id in &layout.methods {
            let method = self.node(method_id)?.as_method().ok_or(Error::InvalidNode(method_id))?;
            if let Some(eh_info) = method.code.as_ref().and_then(|code| code.eh_info.as_ref()) {
                clauses.push((method_id, eh_info));
            }
        }

        let mut builder = ObjectDataBuilder::new(id, 4);
        let mut blob_offset = (clauses.len() + 1) * EH_LOOKUP_ENTRY_SIZE;
        for (method_id, eh_info) in &clauses {
            builder.emit_reloc(RelocationKind::Addr32Nb, *method_id, 0);
            builder.emit_reloc(RelocationKind::Addr32Nb, id, blob_offset as i32);
            blob_offset += eh_info.len();
        }
        builder.emit_u32(u32::MAX);
        builder.emit_reloc(RelocationKind::Addr32Nb, id, blob_offset as i32);
        for (_, eh_info) in &clauses {
            builder.emit_bytes(eh_info);
        }
        Ok(builder.finish())
    }

    fn thunk_data(&self, id: NodeId, thunk: &ImportThunk) -> Result<ObjectData> {
        let indirect = match self.config().target.architecture {
            TargetArchitecture::X64 => RelocationKind::Rel32,
            TargetArchitecture::X86 => RelocationKind::HighLow,
            architecture @ (TargetArchitecture::Arm | TargetArchitecture::Arm64) => {
                return Err(Error::NotImplemented(format!("import thunks for {architecture}")))
            }
        };

        let mut builder = ObjectDataBuilder::new(id, 4);
        if thunk.kind != ThunkKind::Eager {
            if thunk.kind == ThunkKind::VirtualStubDispatch {
                // mov rax, r11
                builder.emit_bytes(&[0x49, 0x8B, 0xC3]);
            } else {
                // xor eax, eax
                builder.emit_bytes(&[0x33, 0xC0]);
            }
            // push imm8
            builder.emit_bytes(&[0x6A, thunk.section.index() as u8]);
            // push [module]
            builder.emit_bytes(&[0xFF, 0x35]);
            builder.emit_reloc(indirect, thunk.module_cell, 0);
        }
        // jmp [helper]
        builder.emit_bytes(&[0xFF, 0x25]);
        builder.emit_reloc(indirect, thunk.helper_cell, 0);
        Ok(builder.finish())
    }

    pub(super) fn compute_mangled_name(&self, id: NodeId) -> Result<String> {
        let name = match &self.node(id)?.kind {
            NodeKind::Header => "__ReadyToRunHeader".to_string(),
            NodeKind::CompilerIdentifier => "__ReadyToRunHeader_CompilerIdentifier".to_string(),
            NodeKind::RuntimeFunctionsTable => "__ReadyToRunRuntimeFunctionsTable".to_string(),
            NodeKind::ExceptionInfoLookupTable => "__ReadyToRunExceptionInfoLookupTable".to_string(),
            NodeKind::MethodEntryPointTable => "__ReadyToRunMethodEntryPointTable".to_string(),
            NodeKind::InstanceEntryPointTable => "__ReadyToRunInstanceEntryPointTable".to_string(),
            NodeKind::TypesTable => "__ReadyToRunAvailableTypesTable".to_string(),
            NodeKind::ImportSectionsTable => "__ImportSectionsTable".to_string(),
            NodeKind::GcInfo => "__ReadyToRunGCInfo".to_string(),
            NodeKind::ImportSectionCells(section) => format!("__ImportSection_{section}"),
            NodeKind::ImportSectionSignatures(section) => format!("__ImportSectionSignatures_{section}"),
            NodeKind::GcRefMap(section) => format!("__GCRefMap_{section}"),
            NodeKind::Signature(signature) => format!("__Signature_{signature}"),
            NodeKind::Import(import) => {
                let mut name = format!("__Import_{}", import.section);
                if let ImportKind::DelayLoad { thunk } = import.kind {
                    if let NodeKind::ImportThunk(thunk) = &self.node(thunk)?.kind {
                        name.push('_');
                        name.push_str(&thunk.helper.to_string());
                    }
                }
                if let NodeKind::Signature(signature) = &self.node(import.signature)?.kind {
                    name.push('_');
                    name.push_str(&signature.to_string());
                }
                if let Some(call_site) = &import.call_site {
                    name.push('@');
                    name.push_str(call_site);
                }
                name
            }
            NodeKind::ImportThunk(thunk) => {
                let mut name = format!("__ImportThunk_{}_{}", thunk.helper, thunk.section);
                if thunk.kind == ThunkKind::VirtualStubDispatch {
                    name.push_str("_VSD");
                }
                name
            }
            NodeKind::Method(method) => format!("__Method_{}", method.method),
            NodeKind::ExternalType(ty) => format!("__ExternalType_{ty}"),
        };
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compilation::{CompilationConfig, CompilationModuleGroup, TargetDetails, TargetOs},
        dependency::DependencyGraph,
        factory::{HelperTarget, MethodCode},
        metadata::typesystem::{MethodAttributes, MethodSignature},
        readytorun::constants::{ImportSectionFlags, ReadyToRunHelper, ReadyToRunHelperId},
        test::factories::{corelib, factory_for},
    };

    fn u32_at(data: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
    }

    fn rooted(factory: &NodeFactory) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        factory.attach_to_dependency_graph(&mut graph);
        while let Some(node) = graph.next_pending() {
            for dependency in factory.dependencies(node).unwrap() {
                graph.mark(dependency);
            }
        }
        graph
    }

    #[test]
    fn header_lists_sections_sorted_by_type() {
        let lib = corelib();
        let mut factory = factory_for(lib.module);
        let graph = rooted(&factory);
        factory.finalize_layout(&graph).unwrap();

        let header = factory.get_data(factory.header()).unwrap().unwrap();
        assert_eq!(u32_at(&header.data, 0), 0x0052_5452);
        assert_eq!(&header.data[4..8], &[2, 0, 2, 0]);
        assert_eq!(u32_at(&header.data, 12), 7);

        let types: Vec<u32> = (0..7).map(|i| u32_at(&header.data, 16 + i * 12)).collect();
        assert_eq!(types, vec![100, 101, 102, 103, 104, 108, 109]);
        assert_eq!(header.relocs.len(), 14);
        assert_eq!(header.relocs[0].kind, RelocationKind::Addr32Nb);
        assert_eq!(header.relocs[1].kind, RelocationKind::SymbolSize);
    }

    #[test]
    fn import_sections_table_has_six_entries() {
        let lib = corelib();
        let mut factory = factory_for(lib.module);
        let graph = rooted(&factory);
        factory.finalize_layout(&graph).unwrap();

        let table = factory.get_data(factory.import_sections_table()).unwrap().unwrap();
        assert_eq!(table.data.len(), 6 * IMPORT_SECTION_ENTRY_SIZE);

        // the eager section holds the module and personality routine helper cells
        let eager = &table.data[0..20];
        assert_eq!(u16::from_le_bytes([eager[8], eager[9]]), ImportSectionFlags::EAGER.bits());
        assert_eq!(eager[10], 0);
        assert_eq!(eager[11], 8);
        assert_eq!(table.relocs[0].target, factory.import_section(ImportSectionId::Eager));

        // the string section is empty: zero RVA, size and signatures
        let string = &table.data[100..120];
        assert_eq!(u32_at(string, 0), 0);
        assert_eq!(u32_at(string, 4), 0);
        assert_eq!(string[10], 3);
        assert_eq!(u32_at(string, 12), 0);
        assert_eq!(u32_at(string, 16), 0);
    }

    #[test]
    fn cells_point_delay_load_imports_at_their_thunk() {
        let lib = corelib();
        let string = lib.string.clone();
        let mut factory = factory_for(lib.module);
        let context = factory.signature_context();
        let allocator = factory
            .ready_to_run_helper(ReadyToRunHelperId::NewHelper, HelperTarget::Type(string), context)
            .unwrap();

        let mut graph = rooted(&factory);
        graph.mark(allocator);
        while let Some(node) = graph.next_pending() {
            for dependency in factory.dependencies(node).unwrap() {
                graph.mark(dependency);
            }
        }
        factory.finalize_layout(&graph).unwrap();

        let cells = factory
            .get_data(factory.import_section(ImportSectionId::Helper))
            .unwrap()
            .unwrap();
        assert_eq!(cells.data.len(), 8);
        assert_eq!(cells.relocs[0].kind, RelocationKind::Dir64);
        assert!(cells.defined_symbols.contains(&(allocator, 0)));

        let ImportKind::DelayLoad { thunk } = factory.node(allocator).unwrap().as_import().unwrap().kind else {
            panic!("allocator must be delay loaded");
        };
        assert_eq!(cells.relocs[0].target, thunk);
        assert_eq!(
            factory.mangled_name(allocator).unwrap(),
            "__Import_HelperImports_DelayLoadHelper_NewObject(System.String)@module#0"
        );

        let code = factory.get_data(thunk).unwrap().unwrap();
        assert_eq!(&code.data[..4], &[0x33, 0xC0, 0x6A, 0x03]);
        assert_eq!(&code.data[4..6], &[0xFF, 0x35]);
        assert_eq!(&code.data[10..12], &[0xFF, 0x25]);
        assert_eq!(code.relocs.len(), 2);
        assert_eq!(code.relocs[0].target, factory.module_import());
        assert_eq!(code.relocs[0].kind, RelocationKind::Rel32);
    }

    #[test]
    fn method_cells_point_at_their_gc_ref_maps() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let signature = MethodSignature::new(
            None,
            vec![lib.object.clone(), lib.int32.clone(), lib.string.clone()],
        );
        let update = lib
            .module
            .define_method_with_signature(&object, "Update", MethodAttributes::empty(), 0, signature);
        let mut factory = factory_for(lib.module);
        let context = factory.signature_context();
        let entry = factory.method_entrypoint(&update, None, false, false, context);

        let mut graph = rooted(&factory);
        graph.mark(entry);
        while let Some(node) = graph.next_pending() {
            for dependency in factory.dependencies(node).unwrap() {
                graph.mark(dependency);
            }
        }
        factory.finalize_layout(&graph).unwrap();

        let method_map = factory.gc_ref_map(ImportSectionId::Method).unwrap();
        let dispatch_map = factory.gc_ref_map(ImportSectionId::Dispatch).unwrap();
        assert!(graph.is_marked(method_map));
        assert!(factory.gc_ref_map(ImportSectionId::Helper).is_none());
        assert_eq!(factory.mangled_name(method_map).unwrap(), "__GCRefMap_MethodImports");

        // auxiliary data of the populated method section only
        let table = factory.get_data(factory.import_sections_table()).unwrap().unwrap();
        let auxiliary: Vec<_> = table
            .relocs
            .iter()
            .filter(|reloc| reloc.offset % IMPORT_SECTION_ENTRY_SIZE == 16)
            .collect();
        assert_eq!(auxiliary.len(), 1);
        assert_eq!(auxiliary[0].offset, IMPORT_SECTION_ENTRY_SIZE + 16);
        assert_eq!(auxiliary[0].target, method_map);
        assert_eq!(u32_at(&table.data, 2 * IMPORT_SECTION_ENTRY_SIZE + 16), 0);

        // one lookup entry, then this, the first and the third argument as references
        let map = factory.get_data(method_map).unwrap().unwrap();
        assert_eq!(map.data, vec![4, 0, 0, 0, 0x45]);
        assert_eq!(map.alignment, 4);

        let empty = factory.get_data(dispatch_map).unwrap().unwrap();
        assert_eq!(empty.data, vec![4, 0, 0, 0]);
    }

    #[test]
    fn gc_ref_map_index_has_an_entry_per_stride() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let methods: Vec<_> = (0..GCREFMAP_LOOKUP_STRIDE + 1)
            .map(|index| {
                lib.module
                    .define_method(&object, &format!("M{index}"), MethodAttributes::STATIC)
            })
            .collect();
        let mut factory = factory_for(lib.module);
        let context = factory.signature_context();

        let mut graph = rooted(&factory);
        for method in &methods {
            let entry = factory.method_entrypoint(method, None, false, false, context);
            graph.mark(entry);
        }
        while let Some(node) = graph.next_pending() {
            for dependency in factory.dependencies(node).unwrap() {
                graph.mark(dependency);
            }
        }
        factory.finalize_layout(&graph).unwrap();

        // static methods without arguments map to a single zero byte each
        let map_node = factory.gc_ref_map(ImportSectionId::Method).unwrap();
        let map = factory.get_data(map_node).unwrap().unwrap();
        assert_eq!(u32_at(&map.data, 0), 8);
        assert_eq!(u32_at(&map.data, 4), 8 + GCREFMAP_LOOKUP_STRIDE as u32);
        assert_eq!(map.data.len(), 8 + GCREFMAP_LOOKUP_STRIDE + 1);
        assert!(map.data[8..].iter().all(|&byte| byte == 0));
    }

    #[test]
    fn eager_thunks_jump_through_the_helper_cell() {
        let lib = corelib();
        let mut factory = factory_for(lib.module);
        let thunk = factory.personality_routine().unwrap();
        let code = factory.get_data(thunk).unwrap().unwrap();
        assert_eq!(code.data, vec![0xFF, 0x25, 0, 0, 0, 0]);
        assert_eq!(code.relocs[0].target, factory.helper_cell(ReadyToRunHelper::PersonalityRoutine));
        assert_eq!(factory.mangled_name(thunk).unwrap(), "__ImportThunk_PersonalityRoutine_EagerImports");
    }

    #[test]
    fn arm_thunks_are_not_implemented() {
        let lib = corelib();
        let config = CompilationConfig::default()
            .with_target(TargetDetails::new(TargetArchitecture::Arm64, TargetOs::Linux));
        let factory = NodeFactory::new(config, CompilationModuleGroup::new(lib.module));
        let thunk = factory.personality_routine().unwrap();
        assert!(matches!(factory.get_data(thunk), Err(Error::NotImplemented(_))));
    }

    #[test]
    fn tables_require_a_layout() {
        let lib = corelib();
        let factory = factory_for(lib.module);
        assert!(matches!(
            factory.get_data(factory.import_sections_table()),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn exception_lookup_is_sentinel_terminated() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let with_eh = lib.module.define_method(&object, "Guarded", MethodAttributes::STATIC);
        let without_eh = lib.module.define_method(&object, "Plain", MethodAttributes::STATIC);
        let mut factory = factory_for(lib.module);

        let mut graph = DependencyGraph::new();
        for (method, eh) in [(&with_eh, Some(vec![0xAA; 12])), (&without_eh, None)] {
            let body = factory.compiled_method(method);
            graph.mark(body);
            factory.begin_compile(body).unwrap();
            let mut code = MethodCode::new(vec![0xC3; 5]).with_unwind_info(vec![1, 2]);
            if let Some(eh) = eh {
                code = code.with_eh_info(eh);
            }
            factory.complete_compile(body, Ok(code)).unwrap();
        }
        factory.finalize_layout(&graph).unwrap();

        let eh = factory.get_data(factory.header.exception_info).unwrap().unwrap();
        assert_eq!(eh.data.len(), 16 + 12);
        assert_eq!(u32_at(&eh.data, 8), u32::MAX);
        assert_eq!(u32_at(&eh.data, 4), 16);
        assert_eq!(u32_at(&eh.data, 12), 28);
        assert_eq!(eh.relocs.len(), 3);

        let functions = factory.get_data(factory.header.runtime_functions).unwrap().unwrap();
        assert_eq!(functions.data.len(), 2 * 12);
        assert_eq!(u32_at(&functions.data, 4), 5);
    }

    #[test]
    fn compiler_identifier_is_nul_terminated() {
        let lib = corelib();
        let factory = factory_for(lib.module);
        let data = factory.get_data(factory.compiler_identifier()).unwrap().unwrap();
        assert_eq!(data.data.last(), Some(&0));
        assert_eq!(&data.data[..data.data.len() - 1], b"CoreRT Ready-To-Run Compiler");
    }
}
