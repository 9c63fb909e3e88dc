//! Build configuration.
//!
//! [`BuildConfig`] collects every knob of the backend: which external tools
//! to run, the flags to pass them, where artifacts go, and the parameters of
//! the synthesis directive. [`BuildConfig::from_env`] reads the environment
//! variables the generated-code toolchain has always honoured; `with_*`
//! setters override individual fields.

use crate::core::error::{CompileError, CompileResult};
use std::path::{Path, PathBuf};

/// Default flags for the direct compile path in release mode.
pub const RELEASE_CFLAGS: &str = "-O3 -ffast-math -std=c99";

/// Default flags for the direct compile path in debug mode.
pub const DEBUG_CFLAGS: &str = "-g -O0 -std=c99";

/// Program plus fixed leading arguments, e.g. `sh -c '...'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn with_args<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Parameters of the synthesis directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisConfig {
    /// Search depth for the oracle's enumerative search.
    pub depth: u32,
    /// Solver tag, rendered as a quoted symbol.
    pub solver: String,
    /// Target ISA tag.
    pub target_isa: String,
    /// Oracle memory limit in MiB.
    pub memory_limit_mb: u64,
    /// Solver bit width (`current-bitwidth`), if any.
    pub bitwidth: Option<u32>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            depth: 2,
            solver: "z3".to_string(),
            target_isa: "x86".to_string(),
            memory_limit_mb: 20000,
            bitwidth: None,
        }
    }
}

/// Toolchain paths the synthesis-linked path cannot run without.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisToolchain {
    pub hydride_root: PathBuf,
    pub legalizer_path: PathBuf,
    pub intrinsics_ll: PathBuf,
}

impl SynthesisToolchain {
    /// Location of the low-level code generator script.
    pub fn lowlevel_codegen_script(&self) -> PathBuf {
        self.hydride_root
            .join("codegen-generator")
            .join("tools")
            .join("low-level-codegen")
            .join("RoseLowLevelCodeGen.py")
    }
}

/// Complete backend configuration.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// C compiler for the direct path.
    pub cc: String,
    /// Flag override for the direct path; `None` uses the mode default.
    pub cflags: Option<String>,
    /// Debug mode selects unoptimized, symbol-carrying builds.
    pub debug: bool,
    /// Emit OpenMP pragmas and link with `-fopenmp`.
    pub openmp: bool,
    /// Directory for every generated artifact.
    pub tmpdir: PathBuf,
    pub clang: String,
    pub llvm_link: String,
    pub opt: String,
    pub python: String,
    /// Synthesis oracle launcher; the specification path is appended.
    pub oracle: ToolCommand,
    pub hydride_root: Option<PathBuf>,
    pub legalizer_path: Option<PathBuf>,
    pub intrinsics_ll: Option<PathBuf>,
    pub synthesis: SynthesisConfig,
    /// Seed for the session's name generator.
    pub seed: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cc: "cc".to_string(),
            cflags: None,
            debug: false,
            openmp: false,
            tmpdir: std::env::temp_dir(),
            clang: "clang".to_string(),
            llvm_link: "llvm-link".to_string(),
            opt: "opt".to_string(),
            python: "python3".to_string(),
            oracle: ToolCommand::new("racket"),
            hydride_root: None,
            legalizer_path: None,
            intrinsics_ll: None,
            synthesis: SynthesisConfig::default(),
            seed: 0,
        }
    }
}

impl BuildConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(cc) = non_empty("TACO_CC") {
            config.cc = cc;
        }
        config.cflags = non_empty("TACO_CFLAGS");
        if let Some(dir) = non_empty("TACO_TMPDIR") {
            config.tmpdir = PathBuf::from(dir);
        }
        if let Some(clang) = non_empty("VSYNTH_CLANG") {
            config.clang = clang;
        }
        if let Some(link) = non_empty("VSYNTH_LLVM_LINK") {
            config.llvm_link = link;
        }
        if let Some(opt) = non_empty("VSYNTH_OPT") {
            config.opt = opt;
        }
        if let Some(python) = non_empty("VSYNTH_PYTHON") {
            config.python = python;
        }
        if let Some(oracle) = non_empty("VSYNTH_ORACLE") {
            let mut parts = oracle.split_whitespace().map(str::to_string);
            if let Some(program) = parts.next() {
                config.oracle = ToolCommand { program, args: parts.collect() };
            }
        }
        config.hydride_root = non_empty("HYDRIDE_ROOT").map(PathBuf::from);
        config.legalizer_path = non_empty("LEGALIZER_PATH").map(PathBuf::from);
        config.intrinsics_ll = non_empty("INTRINSICS_LL").map(PathBuf::from);
        config.synthesis.bitwidth = non_empty("HL_SYNTH_BW")
            .and_then(|bw| bw.trim().parse::<u32>().ok())
            .filter(|bw| *bw > 0);
        if let Some(seed) = non_empty("VSYNTH_SEED").and_then(|s| s.trim().parse().ok()) {
            config.seed = seed;
        }
        config
    }

    pub fn with_tmpdir(mut self, dir: impl AsRef<Path>) -> Self {
        self.tmpdir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_openmp(mut self, openmp: bool) -> Self {
        self.openmp = openmp;
        self
    }

    pub fn with_cc(mut self, cc: impl Into<String>) -> Self {
        self.cc = cc.into();
        self
    }

    pub fn with_oracle(mut self, oracle: ToolCommand) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_synthesis(mut self, synthesis: SynthesisConfig) -> Self {
        self.synthesis = synthesis;
        self
    }

    pub fn with_synthesis_toolchain(
        mut self,
        hydride_root: impl Into<PathBuf>,
        legalizer_path: impl Into<PathBuf>,
        intrinsics_ll: impl Into<PathBuf>,
    ) -> Self {
        self.hydride_root = Some(hydride_root.into());
        self.legalizer_path = Some(legalizer_path.into());
        self.intrinsics_ll = Some(intrinsics_ll.into());
        self
    }

    /// Flags for the direct path, before `-shared -fPIC`.
    pub fn effective_cflags(&self) -> &str {
        match &self.cflags {
            Some(flags) => flags,
            None if self.debug => DEBUG_CFLAGS,
            None => RELEASE_CFLAGS,
        }
    }

    /// Check that every path needed by the synthesis-linked path is present.
    pub fn synthesis_toolchain(&self) -> CompileResult<SynthesisToolchain> {
        let hydride_root = self
            .hydride_root
            .clone()
            .ok_or(CompileError::MissingEnv { var: "HYDRIDE_ROOT" })?;
        let legalizer_path = self
            .legalizer_path
            .clone()
            .ok_or(CompileError::MissingEnv { var: "LEGALIZER_PATH" })?;
        let intrinsics_ll = self
            .intrinsics_ll
            .clone()
            .ok_or(CompileError::MissingEnv { var: "INTRINSICS_LL" })?;
        Ok(SynthesisToolchain { hydride_root, legalizer_path, intrinsics_ll })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = BuildConfig::from_lookup(|_| None);
        assert_eq!(config.cc, "cc");
        assert_eq!(config.effective_cflags(), RELEASE_CFLAGS);
        assert_eq!(config.oracle, ToolCommand::new("racket"));
        assert_eq!(config.synthesis.depth, 2);
        assert!(config.synthesis.bitwidth.is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let config = BuildConfig::from_lookup(lookup(&[
            ("TACO_CC", "gcc"),
            ("TACO_CFLAGS", "-O1"),
            ("HL_SYNTH_BW", "16"),
            ("VSYNTH_ORACLE", "racket -W debug"),
            ("VSYNTH_SEED", "42"),
        ]));
        assert_eq!(config.cc, "gcc");
        assert_eq!(config.effective_cflags(), "-O1");
        assert_eq!(config.synthesis.bitwidth, Some(16));
        assert_eq!(config.oracle, ToolCommand::with_args("racket", ["-W", "debug"]));
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_debug_mode_flags() {
        let config = BuildConfig::default().with_debug(true);
        assert_eq!(config.effective_cflags(), DEBUG_CFLAGS);
    }

    #[test]
    fn test_zero_bitwidth_is_ignored() {
        let config = BuildConfig::from_lookup(lookup(&[("HL_SYNTH_BW", "0")]));
        assert!(config.synthesis.bitwidth.is_none());
    }

    #[test]
    fn test_missing_synthesis_toolchain() {
        let config = BuildConfig::from_lookup(lookup(&[("HYDRIDE_ROOT", "/opt/hydride")]));
        match config.synthesis_toolchain() {
            Err(CompileError::MissingEnv { var }) => assert_eq!(var, "LEGALIZER_PATH"),
            other => panic!("expected MissingEnv, got {:?}", other),
        }

        let complete = config.with_synthesis_toolchain("/opt/hydride", "/opt/legal.so", "/opt/intrin.ll");
        let toolchain = complete.synthesis_toolchain().unwrap();
        assert!(toolchain
            .lowlevel_codegen_script()
            .ends_with("codegen-generator/tools/low-level-codegen/RoseLowLevelCodeGen.py"));
    }
}
