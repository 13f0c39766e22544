//! Node kinds held by the factory arena.

use std::{cell::OnceCell, fmt};

use strum::{EnumCount, EnumIter};

use crate::{
    dependency::{NodeId, ObjectNodeSection, Relocation},
    metadata::typesystem::{MethodDesc, TypeDesc},
    readytorun::{
        constants::{ImportSectionFlags, ImportSectionType, ReadyToRunHelper},
        FixupSignature,
    },
};

/// The fixed import sections of every image, in table order.
///
/// The discriminant is the section's index in the import sections table, which is the
/// value delay-load thunks push and method fixup lists refer to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, EnumCount)]
pub enum ImportSectionId {
    /// Cells resolved when the image is loaded
    Eager = 0,
    /// Method entry points, resolved on first call
    Method = 1,
    /// Virtual stub dispatch cells and virtual calls
    Dispatch = 2,
    /// Delay-load helper cells: allocators, casts, static bases
    Helper = 3,
    /// Handles resolved before the referencing method first runs
    Precode = 4,
    /// String literals, resolved before the referencing method first runs
    String = 5,
}

impl ImportSectionId {
    /// Index in the import sections table
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Symbol-friendly section name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ImportSectionId::Eager => "EagerImports",
            ImportSectionId::Method => "MethodImports",
            ImportSectionId::Dispatch => "DispatchImports",
            ImportSectionId::Helper => "HelperImports",
            ImportSectionId::Precode => "PrecodeImports",
            ImportSectionId::String => "StringImports",
        }
    }

    /// Section type written to the import sections table
    #[must_use]
    pub const fn section_type(self) -> ImportSectionType {
        match self {
            ImportSectionId::Method | ImportSectionId::Dispatch => ImportSectionType::StubDispatch,
            ImportSectionId::String => ImportSectionType::StringHandle,
            ImportSectionId::Eager | ImportSectionId::Helper | ImportSectionId::Precode => {
                ImportSectionType::Unknown
            }
        }
    }

    /// Flags written to the import sections table
    #[must_use]
    pub const fn flags(self) -> ImportSectionFlags {
        match self {
            ImportSectionId::Eager => ImportSectionFlags::EAGER,
            ImportSectionId::String => ImportSectionFlags::empty(),
            ImportSectionId::Method
            | ImportSectionId::Dispatch
            | ImportSectionId::Helper
            | ImportSectionId::Precode => ImportSectionFlags::PCODE,
        }
    }

    /// Calls through cells of this section stop in a transition block whose arguments
    /// the runtime reports from a GC ref map
    #[must_use]
    pub const fn has_gc_ref_map(self) -> bool {
        matches!(self.section_type(), ImportSectionType::StubDispatch)
    }

    /// Cells of this section appear in the fixup lists of the methods using them
    #[must_use]
    pub const fn emit_precode(self) -> bool {
        matches!(self, ImportSectionId::Precode | ImportSectionId::String)
    }
}

impl fmt::Display for ImportSectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an import cell gets its value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// Filled by the loader before any code runs
    Eager,
    /// Filled before the first execution of a method listing it as fixup
    Precode,
    /// Initially points at a thunk that resolves the cell on first use
    DelayLoad {
        /// Thunk the cell initially points at
        thunk: NodeId,
    },
}

/// A pointer-sized cell in one of the import sections
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Import {
    /// Section holding the cell
    pub section: ImportSectionId,
    /// Signature node describing what the cell resolves to
    pub signature: NodeId,
    /// Resolution policy
    pub kind: ImportKind,
    /// Further nodes that must be emitted with the cell, such as a local method body
    pub dependencies: Vec<NodeId>,
    /// Call site owning a dispatch cell
    pub call_site: Option<String>,
}

/// How an import thunk reaches its helper
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThunkKind {
    /// Jumps straight through the helper cell
    Eager,
    /// Pushes the section index and module before jumping to a delay-load helper
    DelayLoad,
    /// Like [`ThunkKind::DelayLoad`], passing the dispatch cell from `r11`
    VirtualStubDispatch,
}

/// Stub code shared by all cells resolved through the same helper and section
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportThunk {
    /// Runtime helper the thunk transfers to
    pub helper: ReadyToRunHelper,
    /// Section whose cells use the thunk
    pub section: ImportSectionId,
    /// Code shape
    pub kind: ThunkKind,
    /// Eager cell holding the helper's address
    pub helper_cell: NodeId,
    /// Eager cell holding the module handle
    pub module_cell: NodeId,
}

/// Compilation state of a method body node
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MethodState {
    /// Reachable but not compiled yet
    Unvisited,
    /// Handed to the code compiler
    Compiling,
    /// Code available
    Compiled,
    /// Left to the runtime JIT; holds the reason
    Failed(String),
}

/// Output of the code compiler for one method
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodCode {
    /// Machine code
    pub code: Vec<u8>,
    /// References from the code to factory nodes
    pub relocs: Vec<Relocation>,
    /// Encoded GC info
    pub gc_info: Vec<u8>,
    /// Encoded unwind info, stored in front of the GC info
    pub unwind_info: Vec<u8>,
    /// Encoded exception handling clauses
    pub eh_info: Option<Vec<u8>>,
    /// Import cells the runtime must resolve before the code first runs, in addition to
    /// the precode cells its relocations reach
    pub fixups: Vec<NodeId>,
    /// Required code alignment
    pub alignment: usize,
}

impl MethodCode {
    /// Code without relocations, GC or EH info
    #[must_use]
    pub fn new(code: Vec<u8>) -> Self {
        MethodCode {
            code,
            relocs: Vec::new(),
            gc_info: Vec::new(),
            unwind_info: Vec::new(),
            eh_info: None,
            fixups: Vec::new(),
            alignment: 16,
        }
    }

    /// Adds a relocation
    #[must_use]
    pub fn with_reloc(mut self, reloc: Relocation) -> Self {
        self.relocs.push(reloc);
        self
    }

    /// Sets the GC info
    #[must_use]
    pub fn with_gc_info(mut self, gc_info: Vec<u8>) -> Self {
        self.gc_info = gc_info;
        self
    }

    /// Sets the unwind info
    #[must_use]
    pub fn with_unwind_info(mut self, unwind_info: Vec<u8>) -> Self {
        self.unwind_info = unwind_info;
        self
    }

    /// Sets the exception handling clauses
    #[must_use]
    pub fn with_eh_info(mut self, eh_info: Vec<u8>) -> Self {
        self.eh_info = Some(eh_info);
        self
    }

    /// Requires `import` to be resolved before the code first runs
    #[must_use]
    pub fn with_fixup(mut self, import: NodeId) -> Self {
        self.fixups.push(import);
        self
    }
}

/// A method body node
#[derive(Clone, Debug)]
pub struct MethodNode {
    /// Canonical method whose body the node holds
    pub method: MethodDesc,
    /// Compilation state
    pub state: MethodState,
    /// Compiled code once `state` is [`MethodState::Compiled`]
    pub code: Option<MethodCode>,
}

/// Every kind of node the factory creates
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// The ReadyToRun header
    Header,
    /// Identifier string of the producing compiler
    CompilerIdentifier,
    /// One runtime function entry per compiled method
    RuntimeFunctionsTable,
    /// Exception clauses of compiled methods
    ExceptionInfoLookupTable,
    /// Entry points of non-generic methods, by rid
    MethodEntryPointTable,
    /// Entry points of generic instantiations, by hash
    InstanceEntryPointTable,
    /// Available types, by hash
    TypesTable,
    /// The 20-byte descriptors of the import sections
    ImportSectionsTable,
    /// Unwind and GC info of compiled methods
    GcInfo,
    /// Cells of one import section
    ImportSectionCells(ImportSectionId),
    /// Signature RVAs of one import section
    ImportSectionSignatures(ImportSectionId),
    /// Argument GC ref maps of one stub dispatch section, one per cell
    GcRefMap(ImportSectionId),
    /// An import cell, emitted inside its section's cells
    Import(Import),
    /// An encoded fixup signature
    Signature(FixupSignature),
    /// Helper transfer stub
    ImportThunk(ImportThunk),
    /// A method body
    Method(MethodNode),
    /// A type symbol resolved outside of this image
    ExternalType(TypeDesc),
}

/// An arena slot: the node kind with its lazily computed mangled name
#[derive(Debug)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) mangled_name: OnceCell<String>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            mangled_name: OnceCell::new(),
        }
    }

    /// The node's payload
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Import payload, if this is an import cell
    #[must_use]
    pub fn as_import(&self) -> Option<&Import> {
        match &self.kind {
            NodeKind::Import(import) => Some(import),
            _ => None,
        }
    }

    /// Method payload, if this is a method body
    #[must_use]
    pub fn as_method(&self) -> Option<&MethodNode> {
        match &self.kind {
            NodeKind::Method(method) => Some(method),
            _ => None,
        }
    }

    /// Section the node's data is placed in; `None` for nodes without own data
    #[must_use]
    pub fn section(&self, table_section: ObjectNodeSection) -> Option<ObjectNodeSection> {
        match &self.kind {
            NodeKind::Method(method) => {
                (method.state == MethodState::Compiled).then_some(ObjectNodeSection::Text)
            }
            NodeKind::ImportThunk(_) => Some(ObjectNodeSection::Text),
            NodeKind::ImportSectionCells(_) => Some(ObjectNodeSection::Data),
            NodeKind::Import(_) | NodeKind::ExternalType(_) => None,
            NodeKind::Header
            | NodeKind::CompilerIdentifier
            | NodeKind::RuntimeFunctionsTable
            | NodeKind::ExceptionInfoLookupTable
            | NodeKind::MethodEntryPointTable
            | NodeKind::InstanceEntryPointTable
            | NodeKind::TypesTable
            | NodeKind::ImportSectionsTable
            | NodeKind::GcInfo
            | NodeKind::ImportSectionSignatures(_)
            | NodeKind::GcRefMap(_)
            | NodeKind::Signature(_) => Some(table_section),
        }
    }
}
