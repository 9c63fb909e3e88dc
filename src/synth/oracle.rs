//! The synthesis oracle seam.
//!
//! [`RacketOracle`] writes the request's specification next to the other
//! build artifacts and runs the configured launcher on it. Success means exit
//! status 0 *and* a saved synthesis map; an oracle that exits cleanly without
//! one found no instruction sequence, which is reported as
//! [`CompileError::NoSolution`].

use super::SynthesisRequest;
use crate::core::{CompilationSession, CompileError, CompileResult, ToolCommand};
use crate::module::toolchain::{run_checked, CommandRunner, SystemRunner, ToolInvocation};
use std::fs;
use std::path::PathBuf;

/// Result of a solved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisOutcome {
    /// External symbol the oracle's code defines.
    pub call_name: String,
    /// Saved synthesis map.
    pub hash_path: PathBuf,
}

pub trait SynthesisOracle {
    fn synthesize(
        &mut self,
        session: &CompilationSession<'_>,
        request: &SynthesisRequest<'_>,
    ) -> CompileResult<SynthesisOutcome>;
}

/// Runs the Rosette oracle as a subprocess.
pub struct RacketOracle<R: CommandRunner = SystemRunner> {
    command: ToolCommand,
    runner: R,
}

impl RacketOracle<SystemRunner> {
    pub fn new(command: ToolCommand) -> Self {
        Self::with_runner(command, SystemRunner)
    }
}

impl<R: CommandRunner> RacketOracle<R> {
    pub fn with_runner(command: ToolCommand, runner: R) -> Self {
        Self { command, runner }
    }
}

impl<R: CommandRunner> SynthesisOracle for RacketOracle<R> {
    fn synthesize(
        &mut self,
        session: &CompilationSession<'_>,
        request: &SynthesisRequest<'_>,
    ) -> CompileResult<SynthesisOutcome> {
        fs::create_dir_all(&request.out_dir)?;
        let spec_path = request.spec_path();
        fs::write(&spec_path, &request.spec)?;
        log::info!("wrote synthesis specification to {}", spec_path.display());

        // A map left over from an earlier build would mask a failed search.
        let hash_path = request.hash_path();
        if hash_path.exists() {
            fs::remove_file(&hash_path)?;
        }

        let invocation = ToolInvocation::from_command("oracle", &self.command).path(&spec_path);
        run_checked(&mut self.runner, session, &invocation)?;

        if !hash_path.exists() {
            return Err(CompileError::NoSolution {
                expr_id: request.expr_id,
                log_path: hash_path,
            });
        }
        Ok(SynthesisOutcome {
            call_name: request.call_name(),
            hash_path,
        })
    }
}

/// Accepts every request without running anything, keeping the rendered
/// specifications. Used for dry runs that only inspect generated artifacts.
#[derive(Debug, Default)]
pub struct DryRunOracle {
    pub specs: Vec<(String, String)>,
}

impl SynthesisOracle for DryRunOracle {
    fn synthesize(
        &mut self,
        _session: &CompilationSession<'_>,
        request: &SynthesisRequest<'_>,
    ) -> CompileResult<SynthesisOutcome> {
        let call_name = request.call_name();
        log::debug!("dry run: accepting {}", call_name);
        self.specs.push((call_name.clone(), request.spec.clone()));
        Ok(SynthesisOutcome {
            call_name,
            hash_path: request.hash_path(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::TestContext;

    fn request<'a>(library: &'a str, dir: &std::path::Path) -> SynthesisRequest<'a> {
        SynthesisRequest {
            library,
            expr_id: 0,
            lanes: 4,
            out_dir: dir.to_path_buf(),
            spec: "#lang rosette\n".to_string(),
            slots: &[],
        }
    }

    #[test]
    fn test_nonzero_exit_is_fatal() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let dir = tempfile::tempdir().unwrap();
        let mut oracle = RacketOracle::new(ToolCommand::with_args("sh", ["-c", "exit 2"]));

        match oracle.synthesize(&session, &request("lib0", dir.path())) {
            Err(CompileError::ToolFailed { tool, code, .. }) => {
                assert_eq!(tool, "oracle");
                assert_eq!(code, Some(2));
            }
            other => panic!("expected ToolFailed, got {:?}", other),
        }
        // The specification is written before the oracle runs.
        assert!(dir.path().join("lib0_0.rkt").exists());
    }

    #[test]
    fn test_clean_exit_without_map_is_no_solution() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let dir = tempfile::tempdir().unwrap();
        let mut oracle = RacketOracle::new(ToolCommand::with_args("sh", ["-c", "exit 0"]));

        assert!(matches!(
            oracle.synthesize(&session, &request("lib0", dir.path())),
            Err(CompileError::NoSolution { expr_id: 0, .. })
        ));
    }

    #[test]
    fn test_saved_map_means_solved() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let dir = tempfile::tempdir().unwrap();
        let script = r#"touch "$(dirname "$0")/hydride_hash_$(basename "$0")""#;
        let mut oracle = RacketOracle::new(ToolCommand::with_args("sh", ["-c", script]));

        let outcome = oracle.synthesize(&session, &request("lib0", dir.path())).unwrap();
        assert_eq!(outcome.call_name, "hydride_node_lib0_0");
        assert!(outcome.hash_path.exists());
        assert_eq!(session.stats().tool_counts["oracle"], 1);
    }
}
