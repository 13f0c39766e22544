//! Fixed roots of every image.

use log::debug;
use strum::IntoEnumIterator;

use crate::{
    dependency::DependencyGraph,
    factory::{ImportSectionId, NodeFactory},
};

impl NodeFactory {
    /// Roots the nodes every image contains.
    ///
    /// The header pulls in the tables it lists; the import sections and their
    /// signature tables are rooted directly so that all six sections are laid out
    /// even when no cell lands in them. The module import and, outside of x86, the
    /// personality routine thunks are needed by code the compiler emits implicitly.
    pub fn attach_to_dependency_graph(&self, graph: &mut DependencyGraph) {
        graph.add_root(self.header.header, "ReadyToRun header");
        graph.add_root(self.header.import_sections, "Import sections table");

        for section in ImportSectionId::iter() {
            graph.add_root(self.header.section_cells[section.index()], "Import section");
            graph.add_root(self.header.section_signatures[section.index()], "Import section signatures");
        }

        graph.add_root(self.module_import(), "Module import");
        if let Some(thunk) = self.personality_routine() {
            graph.add_root(thunk, "Personality routine");
        }
        if let Some(thunk) = self.filter_funclet_personality_routine() {
            graph.add_root(thunk, "Filter funclet personality routine");
        }

        debug!("attached {} roots", graph.roots().len());
    }
}
