//! Which modules are compiled into the image.

use std::collections::HashSet;

use crate::metadata::{
    token::ModuleId,
    typesystem::{MethodDesc, ModuleDesc, TypeDesc},
};

/// The set of input modules whose method bodies the image contains.
///
/// The first module is the image's own module: its `MethodDef` rids index the method
/// entry point table and its types populate the available types table. Further modules
/// are compiled into the same image and are reached through the instance entry point
/// table. Modules listed only in the version bubble may be referenced by compiled code
/// but are never compiled.
///
/// # Examples
///
/// ```rust
/// use readytorun::compilation::CompilationModuleGroup;
/// use readytorun::metadata::{token::ModuleId, typesystem::{MethodAttributes, ModuleDesc, TypeKind}};
///
/// let mut app = ModuleDesc::new(ModuleId(1), "App");
/// let program = app.define_type("App", "Program", TypeKind::Class);
/// let main = app.define_method(&program, "Main", MethodAttributes::STATIC);
///
/// let group = CompilationModuleGroup::new(app);
/// assert!(group.contains_method_body(&main));
/// assert_eq!(group.compilation_roots().count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct CompilationModuleGroup {
    modules: Vec<ModuleDesc>,
    version_bubble: HashSet<ModuleId>,
}

impl CompilationModuleGroup {
    /// Creates a group compiling `module` into its own image
    #[must_use]
    pub fn new(module: ModuleDesc) -> Self {
        let mut version_bubble = HashSet::new();
        version_bubble.insert(module.id);
        CompilationModuleGroup {
            modules: vec![module],
            version_bubble,
        }
    }

    /// Adds another module whose bodies are compiled into the image
    #[must_use]
    pub fn with_module(mut self, module: ModuleDesc) -> Self {
        self.version_bubble.insert(module.id);
        self.modules.push(module);
        self
    }

    /// Adds a module that versions with the image without being compiled into it
    #[must_use]
    pub fn with_version_bubble_module(mut self, module: ModuleId) -> Self {
        self.version_bubble.insert(module);
        self
    }

    /// The image's own module
    #[must_use]
    pub fn primary_module(&self) -> &ModuleDesc {
        &self.modules[0]
    }

    /// All compiled modules, the primary one first
    #[must_use]
    pub fn modules(&self) -> &[ModuleDesc] {
        &self.modules
    }

    /// Returns `true` if `module` is compiled into the image
    #[must_use]
    pub fn contains_module(&self, module: ModuleId) -> bool {
        self.modules.iter().any(|m| m.id == module)
    }

    /// Returns `true` if `module` versions together with the image
    #[must_use]
    pub fn versions_with_module(&self, module: ModuleId) -> bool {
        self.version_bubble.contains(&module)
    }

    /// Returns `true` if the definition of `ty` belongs to a compiled module
    #[must_use]
    pub fn contains_type(&self, ty: &TypeDesc) -> bool {
        ty.definition()
            .is_some_and(|def| self.contains_module(def.module))
    }

    /// Returns `true` if the body of `method` is compiled into the image.
    ///
    /// The method must have a body, be closed over all its type parameters and be
    /// defined in one of the compiled modules.
    #[must_use]
    pub fn contains_method_body(&self, method: &MethodDesc) -> bool {
        method.has_body() && !method.is_open_generic() && self.contains_type(method.owning_type())
    }

    /// Methods compiled regardless of whether anything references them
    pub fn compilation_roots(&self) -> impl Iterator<Item = &MethodDesc> {
        self.modules
            .iter()
            .flat_map(ModuleDesc::methods)
            .filter(|method| self.contains_method_body(method))
    }
}
