//! The compilation driver.
//!
//! [`ReadyToRunCompilation`] owns the node factory and the dependency graph for one
//! image. It roots the fixed header nodes and the methods of the compilation group,
//! then drains the graph: every pending method is handed to the [`CodeCompiler`], and
//! the dependencies of every processed node are marked in turn. Methods the compiler
//! cannot handle are skipped and left to the runtime JIT.

use log::{debug, info, warn};

use crate::{
    compilation::{CodeCompiler, CompilationConfig, CompilationModuleGroup, ObjectImage, ObjectWriter},
    dependency::{DependencyGraph, NodeId},
    factory::NodeFactory,
    profile::ProfileDataManager,
    Error, Result,
};

/// Counters of a finished compilation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilationStats {
    /// Methods rooted before the graph was drained
    pub rooted_methods: usize,
    /// Methods that produced code
    pub compiled_methods: usize,
    /// Methods left to the runtime JIT
    pub failed_methods: usize,
    /// Nodes reached from the roots
    pub marked_nodes: usize,
}

/// One ReadyToRun compilation of a module group.
///
/// # Examples
///
/// ```rust
/// use readytorun::compilation::{CodeCompiler, CompilationConfig, CompilationModuleGroup, ReadyToRunCompilation};
/// use readytorun::factory::{MethodCode, NodeFactory};
/// use readytorun::metadata::{token::ModuleId, typesystem::{MethodAttributes, MethodDesc, ModuleDesc, TypeKind}};
///
/// struct Ret;
/// impl CodeCompiler for Ret {
///     fn compile_method(&mut self, _: &MethodDesc, _: &mut NodeFactory) -> readytorun::Result<MethodCode> {
///         Ok(MethodCode::new(vec![0xC3]))
///     }
/// }
///
/// let mut app = ModuleDesc::new(ModuleId(0), "App");
/// let program = app.define_type("App", "Program", TypeKind::Class);
/// app.define_method(&program, "Main", MethodAttributes::STATIC);
///
/// let mut compilation = ReadyToRunCompilation::new(CompilationConfig::default(), CompilationModuleGroup::new(app))?;
/// let image = compilation.run(&mut Ret)?;
/// assert_eq!(compilation.stats().compiled_methods, 1);
/// assert!(!image.sections.is_empty());
/// # Ok::<(), readytorun::Error>(())
/// ```
#[derive(Debug)]
pub struct ReadyToRunCompilation {
    factory: NodeFactory,
    graph: DependencyGraph,
    stats: CompilationStats,
}

impl ReadyToRunCompilation {
    /// Sets up a compilation without profile data.
    ///
    /// # Errors
    /// See [`ReadyToRunCompilation::with_profile`].
    pub fn new(config: CompilationConfig, group: CompilationModuleGroup) -> Result<Self> {
        Self::with_profile(config, group, &ProfileDataManager::default())
    }

    /// Sets up a compilation, rooting the header nodes and the group's methods.
    ///
    /// With profile-guided compilation enabled only the methods `profile` reports as
    /// executed are rooted.
    ///
    /// # Errors
    /// Returns [`Error::NotImplemented`] for targets without stub code support (see
    /// [`TargetDetails::emits_stub_code`]) and an error if the profile data cannot be
    /// loaded.
    ///
    /// [`TargetDetails::emits_stub_code`]: crate::compilation::TargetDetails::emits_stub_code
    pub fn with_profile(
        config: CompilationConfig,
        group: CompilationModuleGroup,
        profile: &ProfileDataManager,
    ) -> Result<Self> {
        if !config.target.emits_stub_code() {
            return Err(Error::NotImplemented(format!(
                "ReadyToRun compilation for {}",
                config.target.architecture
            )));
        }

        let profile_guided = config.profile_guided;
        let roots: Vec<_> = group.compilation_roots().cloned().collect();

        let mut factory = NodeFactory::new(config, group);
        let mut graph = DependencyGraph::new();
        factory.attach_to_dependency_graph(&mut graph);

        let mut stats = CompilationStats::default();
        for method in roots {
            if profile_guided && !profile.is_executed(&method)? {
                debug!("skipping unprofiled method {method}");
                continue;
            }
            let node = factory.compiled_method(&method);
            graph.add_root(node, "Compilation root");
            stats.rooted_methods += 1;
        }

        info!("rooted {} methods", stats.rooted_methods);
        Ok(ReadyToRunCompilation { factory, graph, stats })
    }

    /// The node factory of this compilation
    #[must_use]
    pub fn factory(&self) -> &NodeFactory {
        &self.factory
    }

    /// The dependency graph of this compilation
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Counters collected so far
    #[must_use]
    pub fn stats(&self) -> CompilationStats {
        self.stats
    }

    /// Compiles every reachable method and lays out the image.
    ///
    /// # Errors
    /// Returns the first unrecoverable error of `compiler`, [`Error::TooManyFailures`]
    /// once the failure budget is exceeded, and any layout or serialization error.
    pub fn run(&mut self, compiler: &mut dyn CodeCompiler) -> Result<ObjectImage> {
        while let Some(node) = self.graph.next_pending() {
            self.compile_node(node, compiler)?;
            for dependency in self.factory.dependencies(node)? {
                self.graph.mark(dependency);
            }
        }
        self.stats.marked_nodes = self.graph.marked_nodes().len();

        self.factory.finalize_layout(&self.graph)?;
        let image = ObjectWriter::new(&self.factory, &self.graph).emit()?;

        info!(
            "compiled {} methods, {} left to the runtime, {} nodes, {} symbols",
            self.stats.compiled_methods,
            self.stats.failed_methods,
            self.stats.marked_nodes,
            image.symbols.len()
        );
        Ok(image)
    }

    fn compile_node(&mut self, node: NodeId, compiler: &mut dyn CodeCompiler) -> Result<()> {
        let Some(method) = self.factory.begin_compile(node)? else {
            return Ok(());
        };

        match compiler.compile_method(&method, &mut self.factory) {
            Ok(code) => {
                debug!("compiled {method}: {} bytes", code.code.len());
                self.factory.complete_compile(node, Ok(code))?;
                self.stats.compiled_methods += 1;
            }
            Err(error) if error.is_recoverable() => {
                warn!("{method} was not compiled: {error}");
                self.factory.complete_compile(node, Err(error.to_string()))?;
                self.stats.failed_methods += 1;

                if let Some(limit) = self.factory.config().max_failed_methods {
                    if self.stats.failed_methods > limit {
                        return Err(Error::TooManyFailures(self.stats.failed_methods));
                    }
                }
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compilation::TargetDetails,
        dependency::RelocationKind,
        factory::MethodState,
        metadata::typesystem::MethodAttributes,
        profile::{MethodProfileData, MethodProfilingDataFlags, RecordedProfile},
        test::{
            factories::corelib,
            mock::{MockCompiler, Outcome},
        },
    };

    #[test]
    fn failed_method_does_not_stop_compilation() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let first = lib.module.define_method(&object, "A", MethodAttributes::STATIC);
        let second = lib.module.define_method(&object, "B", MethodAttributes::STATIC);
        let third = lib.module.define_method(&object, "C", MethodAttributes::STATIC);

        let mut compiler = MockCompiler::new().with(&second, Outcome::TypeSystemError);
        let mut compilation =
            ReadyToRunCompilation::new(CompilationConfig::default(), CompilationModuleGroup::new(lib.module))
                .unwrap();
        compilation.run(&mut compiler).unwrap();

        let stats = compilation.stats();
        assert_eq!(stats.rooted_methods, 3);
        assert_eq!(stats.compiled_methods, 2);
        assert_eq!(stats.failed_methods, 1);

        let factory = compilation.factory();
        let layout = factory.layout().unwrap();
        assert_eq!(layout.methods().len(), 2);
        assert_eq!(layout.entry_points().entries().count(), 2);
        assert!(layout.entry_points().entry(second.token().rid()).is_none());
        assert!(layout.entry_points().entry(first.token().rid()).is_some());
        assert!(layout.entry_points().entry(third.token().rid()).is_some());
    }

    #[test]
    fn failure_budget_aborts() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let a = lib.module.define_method(&object, "A", MethodAttributes::STATIC);
        let b = lib.module.define_method(&object, "B", MethodAttributes::STATIC);

        let mut compiler = MockCompiler::new()
            .with(&a, Outcome::RequiresJit)
            .with(&b, Outcome::RequiresJit);
        let config = CompilationConfig::default().with_max_failed_methods(Some(1));
        let mut compilation = ReadyToRunCompilation::new(config, CompilationModuleGroup::new(lib.module)).unwrap();
        assert!(matches!(compilation.run(&mut compiler), Err(Error::TooManyFailures(2))));
    }

    #[test]
    fn fatal_errors_propagate() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let a = lib.module.define_method(&object, "A", MethodAttributes::STATIC);

        let mut compiler = MockCompiler::new().with(&a, Outcome::Fatal);
        let mut compilation =
            ReadyToRunCompilation::new(CompilationConfig::default(), CompilationModuleGroup::new(lib.module))
                .unwrap();
        assert!(matches!(compilation.run(&mut compiler), Err(Error::NotImplemented(_))));
    }

    #[test]
    fn callees_are_compiled_on_demand() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let caller = lib.module.define_method(&object, "Caller", MethodAttributes::STATIC);
        let callee = lib.module.define_method(&object, "Callee", MethodAttributes::STATIC);

        let mut compiler = MockCompiler::new().with(&caller, Outcome::Calls(callee.clone()));
        let config = CompilationConfig::default().with_profile_guided(true);
        let profile = ProfileDataManager::new(RecordedProfile::new(vec![MethodProfileData::new(
            caller.clone(),
            MethodProfilingDataFlags::READ_METHOD_CODE,
            1,
        )]));
        let mut compilation =
            ReadyToRunCompilation::with_profile(config, CompilationModuleGroup::new(lib.module), &profile).unwrap();
        assert_eq!(compilation.stats().rooted_methods, 1);

        compilation.run(&mut compiler).unwrap();
        assert_eq!(compilation.stats().compiled_methods, 2);
        assert!(compiler.compiled().contains(&callee));
    }

    #[test]
    fn helper_references_land_in_the_image() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let string = lib.string.clone();
        let method = lib.module.define_method(&object, "Alloc", MethodAttributes::STATIC);

        let mut compiler = MockCompiler::new().with(&method, Outcome::Allocates(string));
        let mut compilation =
            ReadyToRunCompilation::new(CompilationConfig::default(), CompilationModuleGroup::new(lib.module))
                .unwrap();
        let image = compilation.run(&mut compiler).unwrap();

        let factory = compilation.factory();
        let node = factory.layout().unwrap().methods()[0];
        let state = &factory.node(node).unwrap().as_method().unwrap().state;
        assert_eq!(*state, MethodState::Compiled);

        let name = factory.mangled_name(node).unwrap();
        let relocs: Vec<_> = image.relocations_in(name).collect();
        assert_eq!(relocs.len(), 1);
        assert_eq!(relocs[0].kind, RelocationKind::Rel32);
        assert!(relocs[0].target.contains("NewObject"));
    }

    #[test]
    fn x86_images_have_no_personality_routines() {
        let mut lib = corelib();
        let object = lib.object.clone();
        lib.module.define_method(&object, "A", MethodAttributes::STATIC);

        let config = CompilationConfig::default().with_target(TargetDetails::new(
            crate::compilation::TargetArchitecture::X86,
            crate::compilation::TargetOs::Windows,
        ));
        let mut compilation = ReadyToRunCompilation::new(config, CompilationModuleGroup::new(lib.module)).unwrap();
        compilation.run(&mut MockCompiler::new()).unwrap();
        assert!(compilation.factory().personality_routine().is_none());
        assert_eq!(compilation.stats().compiled_methods, 1);
    }

    #[test]
    fn arm_targets_are_rejected_up_front() {
        let lib = corelib();
        let config = CompilationConfig::default().with_target(TargetDetails::new(
            crate::compilation::TargetArchitecture::Arm64,
            crate::compilation::TargetOs::Linux,
        ));
        assert!(matches!(
            ReadyToRunCompilation::new(config, CompilationModuleGroup::new(lib.module)),
            Err(Error::NotImplemented(_))
        ));
    }
}
