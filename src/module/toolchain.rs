// This module owns every external process the backend starts. A ToolInvocation is one
// fully rendered command (tool tag, program, arguments); a BuildPlan is the ordered list
// of invocations that turns a module's emitted artifacts into a shared object, built for
// either the direct path (one C compiler call) or the synthesis-linked path (emit host
// LLVM IR, legalize the oracle output, link host code with shim and oracle code, run the
// cross-module pass pipeline, compile to a shared object). Plans are plain values so the
// chosen path can be inspected without running anything. Processes are started through
// the CommandRunner trait; SystemRunner blocks on std::process and maps a non-zero exit
// status to ToolFailed and a spawn failure to ToolSpawn. Nothing is retried.

//! External tool invocations and build plans.

use crate::core::{BuildConfig, CompilationSession, CompileError, CompileResult, SynthesisToolchain, ToolCommand};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Cross-module passes that erase the shim boundary.
pub const OPT_PASSES: &str = "default<O3>,adce,aggressive-instcombine,always-inline";

/// Flag selecting the x86 legalizer in the low-level code generator.
pub const LEGALIZE_FLAG: &str = "-x86-hydride-legalize";

/// One external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Short tag used in diagnostics and statistics.
    pub tool: &'static str,
    pub program: String,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(tool: &'static str, program: impl Into<String>) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Start from a configured command, keeping its leading arguments.
    pub fn from_command(tool: &'static str, command: &ToolCommand) -> Self {
        Self {
            tool,
            program: command.program.clone(),
            args: command.args.clone(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Append whitespace-separated flags.
    pub fn flags(mut self, flags: &str) -> Self {
        self.args.extend(flags.split_whitespace().map(str::to_string));
        self
    }

    /// Command line as a shell would print it.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| quote(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(part: &str) -> String {
    if !part.is_empty() && !part.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', "'\\''"))
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Starts external processes.
pub trait CommandRunner {
    /// Run `invocation` to completion; a non-zero exit is an error.
    fn run(&mut self, invocation: &ToolInvocation) -> CompileResult<()>;
}

/// Runs commands as blocking child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, invocation: &ToolInvocation) -> CompileResult<()> {
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .status()
            .map_err(|source| CompileError::ToolSpawn {
                command: invocation.command_line(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(CompileError::ToolFailed {
                tool: invocation.tool,
                command: invocation.command_line(),
                code: status.code(),
            })
        }
    }
}

/// Log, count and run one invocation.
pub fn run_checked(
    runner: &mut dyn CommandRunner,
    session: &CompilationSession<'_>,
    invocation: &ToolInvocation,
) -> CompileResult<()> {
    log::info!("{}", invocation);
    session.record_tool_invocation(invocation.tool);
    runner.run(invocation).map_err(|err| {
        log::warn!("{} failed: {}", invocation.tool, err);
        err
    })
}

/// Which way a module is turned into a shared object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPath {
    /// No expression was synthesized: compile the C source directly.
    Direct,
    /// At least one synthesized call: link host, shim and oracle code.
    SynthesisLinked,
}

/// Paths of every artifact of one module build, all under `<tmpdir>/<library>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub prefix: PathBuf,
}

impl ArtifactPaths {
    pub fn new(tmpdir: &Path, library: &str) -> Self {
        Self {
            prefix: tmpdir.join(library),
        }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut path = self.prefix.clone().into_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }

    pub fn source(&self) -> PathBuf {
        self.with_suffix(".c")
    }

    pub fn header(&self) -> PathBuf {
        self.with_suffix(".h")
    }

    pub fn shim(&self) -> PathBuf {
        self.with_suffix("_shim.ll")
    }

    pub fn host_ll(&self) -> PathBuf {
        self.with_suffix(".ll")
    }

    pub fn legalized_ll(&self) -> PathBuf {
        self.with_suffix("_legalized.ll")
    }

    pub fn linked_ll(&self) -> PathBuf {
        self.with_suffix("_linked.ll")
    }

    pub fn linked_opt_ll(&self) -> PathBuf {
        self.with_suffix("_linked_opt.ll")
    }

    pub fn shared_object(&self) -> PathBuf {
        self.with_suffix(".so")
    }
}

/// Ordered tool invocations producing one shared object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub path: BuildPath,
    pub steps: Vec<ToolInvocation>,
    pub artifact: PathBuf,
}

impl BuildPlan {
    /// `cc <flags> -shared -fPIC <prefix>.c -o <prefix>.so -lm`
    pub fn direct(config: &BuildConfig, paths: &ArtifactPaths) -> Self {
        let mut cc = ToolInvocation::new("cc", config.cc.clone()).flags(config.effective_cflags());
        if config.openmp {
            cc = cc.arg("-fopenmp");
        }
        let cc = cc
            .arg("-shared")
            .arg("-fPIC")
            .path(&paths.source())
            .arg("-o")
            .path(&paths.shared_object())
            .arg("-lm");
        Self {
            path: BuildPath::Direct,
            steps: vec![cc],
            artifact: paths.shared_object(),
        }
    }

    /// Host IR, legalized oracle IR, shim IR: link, optimize, compile.
    pub fn synthesis_linked(
        config: &BuildConfig,
        toolchain: &SynthesisToolchain,
        paths: &ArtifactPaths,
        oracle_ll: &Path,
    ) -> Self {
        let mut emit = ToolInvocation::new("clang", config.clang.clone()).arg("-std=c99");
        emit = if config.debug {
            emit.arg("-g").arg("-O0").arg("-Xclang").arg("-disable-O0-optnone")
        } else {
            emit.arg("-O3").arg("-Xclang").arg("-disable-llvm-passes")
        };
        if config.openmp {
            emit = emit.arg("-fopenmp");
        }
        let emit = emit
            .arg("-S")
            .arg("-emit-llvm")
            .path(&paths.source())
            .arg("-o")
            .path(&paths.host_ll());

        let legalize = ToolInvocation::new("legalizer", config.python.clone())
            .path(&toolchain.lowlevel_codegen_script())
            .path(oracle_ll)
            .path(&toolchain.legalizer_path)
            .path(&toolchain.intrinsics_ll)
            .arg(LEGALIZE_FLAG)
            .path(&paths.legalized_ll());

        let link = ToolInvocation::new("llvm-link", config.llvm_link.clone())
            .arg("-S")
            .path(&paths.host_ll())
            .path(&paths.shim())
            .path(&paths.legalized_ll())
            .arg("-o")
            .path(&paths.linked_ll());

        let optimize = ToolInvocation::new("opt", config.opt.clone())
            .arg(format!("-passes={}", OPT_PASSES))
            .arg("-S")
            .path(&paths.linked_ll())
            .arg("-o")
            .path(&paths.linked_opt_ll());

        let mut compile = ToolInvocation::new("clang", config.clang.clone())
            .arg("-shared")
            .arg("-fPIC")
            .path(&paths.linked_opt_ll())
            .arg("-o")
            .path(&paths.shared_object())
            .arg("-lm");
        if config.openmp {
            compile = compile.arg("-fopenmp");
        }

        Self {
            path: BuildPath::SynthesisLinked,
            steps: vec![emit, legalize, link, optimize, compile],
            artifact: paths.shared_object(),
        }
    }

    /// Run every step in order, stopping at the first failure.
    pub fn execute(
        &self,
        runner: &mut dyn CommandRunner,
        session: &CompilationSession<'_>,
    ) -> CompileResult<()> {
        log::info!("building {} via {:?} path ({} steps)", self.artifact.display(), self.path, self.steps.len());
        for step in &self.steps {
            run_checked(runner, session, step)?;
        }
        Ok(())
    }

    pub fn uses_tool(&self, tool: &str) -> bool {
        self.steps.iter().any(|step| step.tool == tool)
    }
}

impl fmt::Display for BuildPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {:?} build of {}", self.path, self.artifact.display())?;
        for step in &self.steps {
            writeln!(f, "{}", step)?;
        }
        Ok(())
    }
}
