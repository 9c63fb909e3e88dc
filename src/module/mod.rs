// This module implements the build orchestrator. A Module collects Function statements in
// its own IR arena, takes a unique library name from the session, and moves through
// Empty -> SourceEmitted -> DirectCompiled | SynthesisLinked -> Loaded. compile_to_source
// optionally runs the vectorizable-region selector (and through it the expression
// synthesizer) over every function, emits host C source and header, and, when the IR
// holds at least one synthesized call, the ABI shim. The presence of synthesized calls
// picks the build path: none means one C compiler call, any means the LLVM link path with
// the oracle output. compile runs the chosen BuildPlan step by step (each step is checked
// by exit status and the first failure aborts), verifies that every packed entry point is
// exported, and loads the library. A previously loaded handle is released before any
// rebuild starts, so a Module never holds more than one live handle and a failed rebuild
// leaves none. Requesting synthesis also drops any loaded library and returns the module
// to Empty; rewritten functions and their requests are committed only once every function
// has been through the oracle, so a failed request leaves the IR as it was. Functions are
// invoked by name through the packed `int fn(void**)` entry.

//! Build orchestration: from IR functions to a loaded shared object.

pub mod loader;
pub mod toolchain;

pub use loader::{exported_symbols, verify_exports, LoadedLibrary, PackedFn};
pub use toolchain::{
    run_checked, ArtifactPaths, BuildPath, BuildPlan, CommandRunner, SystemRunner, ToolInvocation,
    LEGALIZE_FLAG, OPT_PASSES,
};

use crate::codegen::{emit_c, emit_shims, packed_entry_name, synthesized_sites, ShimModule};
use crate::core::{BuildConfig, CompilationSession, CompileError, CompileResult};
use crate::ir::{IrArena, IrPrinter, StmtId, StmtKind};
use crate::opt::{ExprOptimizer, LoopOptimizer};
use crate::synth::{oracle_output, SynthesisOracle, SynthesisRequest};
use std::ffi::c_void;
use std::fs;

/// Where a module is in its build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Empty,
    SourceEmitted { mutated: bool },
    DirectCompiled,
    SynthesisLinked,
    Loaded { path: BuildPath },
}

/// The unit of compilation.
pub struct Module<'s, 'arena> {
    session: &'s CompilationSession<'arena>,
    config: BuildConfig,
    library: &'arena str,
    paths: ArtifactPaths,
    ir: IrArena,
    functions: Vec<StmtId>,
    source: String,
    header: String,
    user_source: bool,
    shim: Option<ShimModule>,
    entry_points: Vec<String>,
    requests: Vec<SynthesisRequest<'arena>>,
    mutated: bool,
    state: ModuleState,
    handle: Option<LoadedLibrary>,
}

impl<'s, 'arena> Module<'s, 'arena> {
    pub fn new(session: &'s CompilationSession<'arena>, config: BuildConfig) -> Self {
        Self::with_ir(session, config, IrArena::new())
    }

    /// Module whose functions live in an existing arena.
    pub fn with_ir(session: &'s CompilationSession<'arena>, config: BuildConfig, ir: IrArena) -> Self {
        let library = session.fresh_library_name();
        let paths = ArtifactPaths::new(&config.tmpdir, library);
        log::debug!("new module {} under {}", library, config.tmpdir.display());
        Self {
            session,
            config,
            library,
            paths,
            ir,
            functions: Vec::new(),
            source: String::new(),
            header: String::new(),
            user_source: false,
            shim: None,
            entry_points: Vec::new(),
            requests: Vec::new(),
            mutated: false,
            state: ModuleState::Empty,
            handle: None,
        }
    }

    pub fn ir(&self) -> &IrArena {
        &self.ir
    }

    pub fn ir_mut(&mut self) -> &mut IrArena {
        &mut self.ir
    }

    /// Append a Function statement built in this module's arena.
    pub fn add_function(&mut self, function: StmtId) -> CompileResult<()> {
        if !matches!(self.ir.stmt(function), StmtKind::Function { .. }) {
            return Err(CompileError::InvalidState {
                reason: "only Function statements can be added to a module".to_string(),
            });
        }
        self.functions.push(function);
        Ok(())
    }

    /// Functions in their current (possibly rewritten) form.
    pub fn functions(&self) -> &[StmtId] {
        &self.functions
    }

    /// Install hand-written source; emission and synthesis are skipped.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.header.clear();
        self.user_source = true;
        self.shim = None;
        self.mutated = false;
        self.entry_points = self.function_names().into_iter().map(|n| packed_entry_name(&n)).collect();
        self.state = ModuleState::SourceEmitted { mutated: false };
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn shim(&self) -> Option<&ShimModule> {
        self.shim.as_ref()
    }

    pub fn library_name(&self) -> &'arena str {
        self.library
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Whether the IR holds synthesized calls.
    pub fn mutated(&self) -> bool {
        self.mutated
    }

    /// Every synthesis request this module issued, in issue order.
    pub fn requests(&self) -> &[SynthesisRequest<'arena>] {
        &self.requests
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    /// Packed entry points the built library must export.
    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    /// Textual dump of every function.
    pub fn print_ir(&self) -> String {
        self.functions
            .iter()
            .map(|&f| IrPrinter::print_stmt(&self.ir, f))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn function_names(&self) -> Vec<String> {
        self.functions
            .iter()
            .filter_map(|&f| match self.ir.stmt(f) {
                StmtKind::Function { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Run synthesis (when an oracle is given) and write the host source,
    /// header and shim.
    pub fn compile_to_source(&mut self, oracle: Option<&mut dyn SynthesisOracle>) -> CompileResult<()> {
        if self.user_source {
            self.write_artifacts()?;
            return Ok(());
        }
        if self.functions.is_empty() {
            return Err(CompileError::InvalidState {
                reason: format!("module {} has no functions", self.library),
            });
        }

        if let Some(oracle) = oracle {
            // A failed synthesis must not leave the previous build callable.
            if let Some(previous) = self.handle.take() {
                log::debug!("releasing {} before synthesis", previous.path().display());
            }
            self.state = ModuleState::Empty;

            let exprs = ExprOptimizer::new(
                self.session,
                oracle,
                self.library,
                &self.config.tmpdir,
                self.config.synthesis.clone(),
            );
            let mut selector = LoopOptimizer::new(exprs);
            let mut rewritten = Vec::with_capacity(self.functions.len());
            for &function in &self.functions {
                rewritten.push(selector.optimize(&mut self.ir, function)?);
            }
            self.functions = rewritten;
            log::info!(
                "{}: {} vectorized loops, rewrites: {}",
                self.library,
                selector.vector_loops(),
                selector.mutated()
            );
            self.requests.extend(selector.into_inner().into_requests());
        }

        self.mutated = !synthesized_sites(&self.ir, &self.functions).is_empty();
        let c = emit_c(&self.ir, &self.functions, self.library, self.config.openmp)?;
        self.source = c.source;
        self.header = c.header;
        self.entry_points = c.entry_points;
        self.shim = if self.mutated {
            let shim_path = self.paths.shim();
            let file_name = shim_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Some(emit_shims(&self.ir, &self.functions, &file_name)?)
        } else {
            None
        };

        self.write_artifacts()?;
        self.state = ModuleState::SourceEmitted { mutated: self.mutated };
        Ok(())
    }

    fn write_artifacts(&self) -> CompileResult<()> {
        fs::create_dir_all(&self.config.tmpdir)?;
        fs::write(self.paths.source(), &self.source)?;
        fs::write(self.paths.header(), &self.header)?;
        log::info!("wrote {}", self.paths.source().display());
        if let Some(shim) = &self.shim {
            fs::write(self.paths.shim(), &shim.text)?;
            log::info!("wrote {}", self.paths.shim().display());
        }
        Ok(())
    }

    /// The tool invocations `compile` would run.
    pub fn build_plan(&self) -> CompileResult<BuildPlan> {
        if self.state == ModuleState::Empty {
            return Err(CompileError::InvalidState {
                reason: "source must be emitted before planning a build".to_string(),
            });
        }
        if self.mutated {
            let toolchain = self.config.synthesis_toolchain()?;
            let oracle_ll = oracle_output(&self.config.tmpdir, self.library);
            Ok(BuildPlan::synthesis_linked(&self.config, &toolchain, &self.paths, &oracle_ll))
        } else {
            Ok(BuildPlan::direct(&self.config, &self.paths))
        }
    }

    /// Build and load the shared object with the system's tools.
    pub fn compile(&mut self) -> CompileResult<()> {
        self.compile_with(&mut SystemRunner)
    }

    /// Build and load the shared object, starting processes through `runner`.
    pub fn compile_with(&mut self, runner: &mut dyn CommandRunner) -> CompileResult<()> {
        if let Some(previous) = self.handle.take() {
            log::debug!("releasing {}", previous.path().display());
            drop(previous);
            self.state = ModuleState::SourceEmitted { mutated: self.mutated };
        }

        let plan = self.build_plan()?;
        plan.execute(runner, self.session)?;
        self.state = match plan.path {
            BuildPath::Direct => ModuleState::DirectCompiled,
            BuildPath::SynthesisLinked => ModuleState::SynthesisLinked,
        };

        verify_exports(&plan.artifact, &self.entry_points)?;
        self.handle = Some(LoadedLibrary::open(&plan.artifact)?);
        self.session.record_library_loaded();
        self.state = ModuleState::Loaded { path: plan.path };
        Ok(())
    }

    /// Invoke function `name` through its packed entry point.
    ///
    /// # Safety
    /// `args` must hold one valid pointer per output then input of the
    /// function, after four reserved slots when it has a return slot.
    pub unsafe fn call_func_packed_raw(&self, name: &str, args: &mut [*mut c_void]) -> CompileResult<i32> {
        let handle = self.handle.as_ref().ok_or_else(|| CompileError::InvalidState {
            reason: format!("module {} is not loaded", self.library),
        })?;
        handle.call_packed(&packed_entry_name(name), args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::TestContext;
    use crate::ir::{Datatype, LoopKind};
    use crate::synth::DryRunOracle;

    fn vec_add(module: &mut Module<'_, '_>) {
        let ir = module.ir_mut();
        let a = ir.ptr_var("a", Datatype::Int32);
        let b = ir.ptr_var("b", Datatype::Int32);
        let out = ir.ptr_var("out", Datatype::Int32);
        let i = ir.var("i", Datatype::Int32);
        let n = ir.param("n", Datatype::Int32);
        let zero = ir.literal_int(0, Datatype::Int32);
        let one = ir.literal_int(1, Datatype::Int32);
        let la = ir.load(a, i);
        let lb = ir.load(b, i);
        let sum = ir.add(la, lb);
        let store = ir.store(out, i, sum);
        let body = ir.for_loop(i, zero, n, one, store, LoopKind::Vectorized, 4);
        let function = ir.function("vec_add", body, vec![a, b, n], vec![out]);
        module.add_function(function).unwrap();
    }

    #[test]
    fn test_planning_requires_source() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let dir = tempfile::tempdir().unwrap();
        let module = Module::new(&session, BuildConfig::default().with_tmpdir(dir.path()));
        assert_eq!(module.state(), ModuleState::Empty);
        assert!(matches!(module.build_plan(), Err(CompileError::InvalidState { .. })));
    }

    #[test]
    fn test_without_oracle_takes_direct_path() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let dir = tempfile::tempdir().unwrap();
        let mut module = Module::new(&session, BuildConfig::default().with_tmpdir(dir.path()));
        vec_add(&mut module);
        module.compile_to_source(None).unwrap();

        assert_eq!(module.state(), ModuleState::SourceEmitted { mutated: false });
        assert!(module.shim().is_none());
        assert!(module.paths().source().exists());
        assert!(!module.paths().shim().exists());
        assert_eq!(module.build_plan().unwrap().path, BuildPath::Direct);
    }

    #[test]
    fn test_synthesis_requires_toolchain() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let dir = tempfile::tempdir().unwrap();
        let mut module = Module::new(&session, BuildConfig::default().with_tmpdir(dir.path()));
        vec_add(&mut module);
        let mut oracle = DryRunOracle::default();
        module.compile_to_source(Some(&mut oracle)).unwrap();

        assert!(module.mutated());
        assert!(module.paths().shim().exists());
        assert!(matches!(
            module.build_plan(),
            Err(CompileError::MissingEnv { var: "HYDRIDE_ROOT" })
        ));
    }

    #[test]
    fn test_user_source_bypasses_emission() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let dir = tempfile::tempdir().unwrap();
        let mut module = Module::new(&session, BuildConfig::default().with_tmpdir(dir.path()));
        vec_add(&mut module);
        module.set_source("int _shim_vec_add(void** args) { return 0; }\n");
        let mut oracle = DryRunOracle::default();
        module.compile_to_source(Some(&mut oracle)).unwrap();

        assert!(oracle.specs.is_empty());
        assert!(module.source().starts_with("int _shim_vec_add"));
        assert_eq!(module.entry_points(), &["_shim_vec_add".to_string()]);
        assert_eq!(module.build_plan().unwrap().path, BuildPath::Direct);
    }

    #[test]
    fn test_call_before_load_is_rejected() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let module = Module::new(&session, BuildConfig::default());
        let result = unsafe { module.call_func_packed_raw("vec_add", &mut []) };
        assert!(matches!(result, Err(CompileError::InvalidState { .. })));
    }
}
