//! Lays marked nodes out into sections.
//!
//! The writer produces an in-memory [`ObjectImage`]: one byte buffer per output section,
//! the symbols defined in them, and the relocations still to be applied. Packaging the
//! image into a PE or ELF container is left to the linker stage.

use std::collections::BTreeMap;

use log::debug;

use crate::{
    dependency::{DependencyGraph, NodeId, ObjectData, ObjectNodeSection, RelocationKind},
    factory::NodeFactory,
    utils::pad_to_alignment,
    Result,
};

/// Contents of one output section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSection {
    /// Which section this is
    pub kind: ObjectNodeSection,
    /// Concatenated node data, padded to each node's alignment
    pub data: Vec<u8>,
    /// Largest alignment any node in the section requires
    pub alignment: usize,
}

/// A symbol defined in the image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSymbol {
    /// Mangled name
    pub name: String,
    /// Section holding the symbol
    pub section: ObjectNodeSection,
    /// Offset within the section
    pub offset: usize,
    /// Bytes covered by the symbol
    pub size: usize,
}

/// A field still to be patched with a symbol's address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRelocation {
    /// Section holding the field
    pub section: ObjectNodeSection,
    /// Offset of the field within the section
    pub offset: usize,
    /// Encoding of the field
    pub kind: RelocationKind,
    /// Mangled name of the target symbol
    pub target: String,
}

/// Laid-out image produced by a compilation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectImage {
    /// Non-empty sections in `Text`, `ReadOnlyData`, `Data` order
    pub sections: Vec<ImageSection>,
    /// Defined symbols in emission order
    pub symbols: Vec<ImageSymbol>,
    /// Unapplied relocations in emission order
    pub relocations: Vec<ImageRelocation>,
}

impl ObjectImage {
    /// The section of the given kind, if anything was placed in it
    #[must_use]
    pub fn section(&self, kind: ObjectNodeSection) -> Option<&ImageSection> {
        self.sections.iter().find(|section| section.kind == kind)
    }

    /// The symbol named `name`
    #[must_use]
    pub fn symbol(&self, name: &str) -> Option<&ImageSymbol> {
        self.symbols.iter().find(|symbol| symbol.name == name)
    }

    /// Bytes covered by the symbol named `name`
    #[must_use]
    pub fn symbol_data(&self, name: &str) -> Option<&[u8]> {
        let symbol = self.symbol(name)?;
        let section = self.section(symbol.section)?;
        section.data.get(symbol.offset..symbol.offset + symbol.size)
    }

    /// Relocations whose field lies inside the symbol named `name`
    pub fn relocations_in<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ImageRelocation> + 'a {
        let range = self
            .symbol(name)
            .map(|symbol| (symbol.section, symbol.offset, symbol.offset + symbol.size));
        self.relocations.iter().filter(move |reloc| {
            range.is_some_and(|(section, start, end)| {
                reloc.section == section && reloc.offset >= start && reloc.offset < end
            })
        })
    }
}

/// Serializes the marked nodes of a finished dependency graph
pub struct ObjectWriter<'a> {
    factory: &'a NodeFactory,
    graph: &'a DependencyGraph,
}

impl<'a> ObjectWriter<'a> {
    /// Creates a writer; the factory's layout must already be finalized
    #[must_use]
    pub fn new(factory: &'a NodeFactory, graph: &'a DependencyGraph) -> Self {
        ObjectWriter { factory, graph }
    }

    /// Emits every marked node that owns data, in marking order within each section.
    ///
    /// # Errors
    /// Propagates errors of [`NodeFactory::get_data`] and [`NodeFactory::mangled_name`].
    pub fn emit(&self) -> Result<ObjectImage> {
        let table_section = self.factory.config().target.table_section();
        let mut placed: BTreeMap<ObjectNodeSection, Vec<(NodeId, ObjectData)>> = BTreeMap::new();

        for &id in self.graph.marked_nodes() {
            let Some(section) = self.factory.node(id)?.section(table_section) else {
                continue;
            };
            if let Some(data) = self.factory.get_data(id)? {
                placed.entry(section).or_default().push((id, data));
            }
        }

        let mut image = ObjectImage::default();
        for (kind, nodes) in placed {
            let mut section = ImageSection {
                kind,
                data: Vec::new(),
                alignment: 1,
            };

            for (id, node_data) in nodes {
                pad_to_alignment(&mut section.data, node_data.alignment);
                section.alignment = section.alignment.max(node_data.alignment);
                let base = section.data.len();

                self.emit_symbols(&mut image, kind, base, id, &node_data)?;
                for reloc in &node_data.relocs {
                    image.relocations.push(ImageRelocation {
                        section: kind,
                        offset: base + reloc.offset,
                        kind: reloc.kind,
                        target: self.factory.mangled_name(reloc.target)?.to_string(),
                    });
                }
                section.data.extend_from_slice(&node_data.data);
            }

            debug!("section {kind}: {} bytes", section.data.len());
            image.sections.push(section);
        }

        Ok(image)
    }

    fn emit_symbols(
        &self,
        image: &mut ObjectImage,
        section: ObjectNodeSection,
        base: usize,
        owner: NodeId,
        data: &ObjectData,
    ) -> Result<()> {
        for &(symbol, offset) in &data.defined_symbols {
            let size = if symbol == owner {
                data.len()
            } else {
                data.defined_symbols
                    .iter()
                    .map(|&(_, other)| other)
                    .filter(|&other| other > offset)
                    .min()
                    .unwrap_or(data.len())
                    - offset
            };

            image.symbols.push(ImageSymbol {
                name: self.factory.mangled_name(symbol)?.to_string(),
                section,
                offset: base + offset,
                size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        factory::ImportSectionId,
        readytorun::constants::READYTORUN_SIGNATURE,
        test::factories::{corelib, factory_for},
    };

    fn emit_empty_image() -> (NodeFactory, ObjectImage) {
        let lib = corelib();
        let mut factory = factory_for(lib.module);
        let mut graph = DependencyGraph::new();
        factory.attach_to_dependency_graph(&mut graph);
        while let Some(node) = graph.next_pending() {
            for dependency in factory.dependencies(node).unwrap() {
                graph.mark(dependency);
            }
        }
        factory.finalize_layout(&graph).unwrap();
        let image = ObjectWriter::new(&factory, &graph).emit().unwrap();
        (factory, image)
    }

    #[test]
    fn header_is_first_in_table_section() {
        let (factory, image) = emit_empty_image();
        let header = image.symbol(factory.mangled_name(factory.header()).unwrap()).unwrap();
        assert_eq!(header.section, ObjectNodeSection::ReadOnlyData);
        assert_eq!(header.offset, 0);

        let data = image.symbol_data(factory.mangled_name(factory.header()).unwrap()).unwrap();
        assert_eq!(&data[0..4], &READYTORUN_SIGNATURE.to_le_bytes());
    }

    #[test]
    fn symbols_are_aligned() {
        let (_, image) = emit_empty_image();
        for symbol in &image.symbols {
            let section = image.section(symbol.section).unwrap();
            assert!(symbol.offset + symbol.size <= section.data.len());
        }
        assert!(image.section(ObjectNodeSection::Text).is_some());
        assert!(image.section(ObjectNodeSection::Data).is_some());
    }

    #[test]
    fn header_relocations_reference_sections() {
        let (factory, image) = emit_empty_image();
        let header_name = factory.mangled_name(factory.header()).unwrap().to_string();
        let targets: Vec<_> = image
            .relocations_in(&header_name)
            .map(|reloc| reloc.target.clone())
            .collect();
        let imports_table = factory.mangled_name(factory.import_sections_table()).unwrap();
        assert!(targets.iter().any(|target| target == imports_table));
    }

    #[test]
    fn module_import_cell_is_defined() {
        let (factory, image) = emit_empty_image();
        let module = image.symbol(factory.mangled_name(factory.module_import()).unwrap()).unwrap();
        assert_eq!(module.section, ObjectNodeSection::Data);
        assert_eq!(module.size, 8);

        let eager = factory.mangled_name(factory.import_section(ImportSectionId::Eager)).unwrap();
        assert_eq!(image.symbol(eager).unwrap().offset, module.offset);
    }
}
