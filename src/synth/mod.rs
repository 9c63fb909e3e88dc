// This module groups everything that talks to the external synthesis oracle: the register
// slot table that fixes operand order for one request, the emitter that renders a
// candidate expression as a Rosette program, and the oracle seam itself. A request is
// identified by (library name, expression id); every on-disk artifact of the request
// (specification, solved-map log, oracle bitcode) and the generated external symbol are
// derived from that pair by the naming helpers below, so concurrent sessions with
// distinct library names never share a path.

//! Synthesis requests and the oracle seam.

pub mod oracle;
pub mod register_map;
pub mod rosette;

pub use oracle::{DryRunOracle, RacketOracle, SynthesisOracle, SynthesisOutcome};
pub use register_map::{RegisterSlot, RegisterSlotTable, SlotKind};
pub use rosette::{emit_spec, is_renderable, SpecParams};

use std::path::{Path, PathBuf};

/// External symbol produced for request `expr_id` of `library`.
pub fn call_name(library: &str, expr_id: usize) -> String {
    format!("hydride_node_{}_{}", library, expr_id)
}

/// Name under which the oracle saves the solved synthesis map.
pub fn hash_name(library: &str, expr_id: usize) -> String {
    format!("synth_hash_{}_{}", library, expr_id)
}

/// File the oracle writes the solved synthesis map to. Its presence after a
/// successful oracle run is the evidence that a solution was found.
pub fn hash_path(dir: &Path, library: &str, expr_id: usize) -> PathBuf {
    dir.join(format!("hydride_hash_{}_{}.rkt", library, expr_id))
}

/// Name of the oracle's own synthesis log.
pub fn log_name(library: &str, expr_id: usize) -> String {
    format!("hydride_log_{}_{}", library, expr_id)
}

/// Path of the emitted specification file.
pub fn spec_path(dir: &Path, library: &str, expr_id: usize) -> PathBuf {
    dir.join(format!("{}_{}.rkt", library, expr_id))
}

/// Stem handed to the oracle's LLVM compiler; it appends `.ll`.
pub fn bitcode_stem(dir: &Path, library: &str) -> PathBuf {
    dir.join(format!("{}_hydride", library))
}

/// Textual LLVM IR the oracle produces for every request of `library`.
pub fn oracle_output(dir: &Path, library: &str) -> PathBuf {
    dir.join(format!("{}_hydride.ll", library))
}

/// One synthesis request. Created once per eligible expression and never
/// reused.
#[derive(Debug, Clone)]
pub struct SynthesisRequest<'arena> {
    pub library: &'arena str,
    pub expr_id: usize,
    pub lanes: u32,
    pub out_dir: PathBuf,
    /// Rendered Rosette program.
    pub spec: String,
    pub slots: &'arena [RegisterSlot],
}

impl<'arena> SynthesisRequest<'arena> {
    pub fn call_name(&self) -> String {
        call_name(self.library, self.expr_id)
    }

    pub fn spec_path(&self) -> PathBuf {
        spec_path(&self.out_dir, self.library, self.expr_id)
    }

    pub fn hash_path(&self) -> PathBuf {
        hash_path(&self.out_dir, self.library, self.expr_id)
    }
}
