//! vsynth - synthesis-aware backend for a tensor-algebra compiler.
//!
//! vsynth takes the loop IR a tensor-algebra frontend lowers to and turns it
//! into a loadable shared object. Inside loops scheduled as vectorized, integer
//! vector expressions can be handed to an external synthesis oracle; the
//! instruction sequences it finds are linked back in through a generated ABI
//! shim, and the whole module is compiled through LLVM so the shim boundary
//! disappears. Modules without synthesized code take a plain C compiler path.
//!
//! # Primary Usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use vsynth::{BuildConfig, CompilationSession, Kernel, Module, RacketOracle};
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let config = BuildConfig::from_env();
//! let mut oracle = RacketOracle::new(config.oracle.clone());
//!
//! let mut module = Module::new(&session, config);
//! let function = Kernel::VecAdd.build(module.ir_mut(), 4);
//! module.add_function(function)?;
//! module.compile_to_source(Some(&mut oracle))?;
//! module.compile()?;
//! let status = unsafe { module.call_func_packed_raw("vec_add", &mut args)? };
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - arena-backed IR nodes, visitors and printer
//! - [`opt`] - vectorizable-region selector and expression synthesizer
//! - [`synth`] - register slots, Rosette specifications, the oracle seam
//! - [`codegen`] - host C source and the LLVM ABI shim
//! - [`module`] - build plans, external tools, loading and invocation
//! - [`core`] - session, configuration and errors shared by all of the above

pub mod codegen;
pub mod core;
pub mod ir;
pub mod kernels;
pub mod module;
pub mod opt;
pub mod synth;

pub use crate::core::{
    BuildConfig, CompilationSession, CompileError, CompileResult, SessionStats, SynthesisConfig,
    ToolCommand,
};
pub use crate::ir::{Datatype, ExprId, IrArena, IrPrinter, LoopKind, StmtId};
pub use crate::kernels::Kernel;
pub use crate::module::{BuildPath, BuildPlan, Module, ModuleState};
pub use crate::synth::{DryRunOracle, RacketOracle, SynthesisOracle};
