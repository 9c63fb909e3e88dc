// This module serves as the central hub for vsynth's shared infrastructure, used by every
// stage of the backend from IR rewriting through dynamic loading. It exports and organizes
// the subsystems that carry no knowledge of any particular pass: session management
// (arena-based allocation, the seeded library-name generator, the expression-id counter
// and compilation statistics), the error taxonomy with its CompileResult alias, and the
// environment-driven build configuration naming every external tool and flag. Test
// helpers for arena-backed sessions live here as well.

//! Core vsynth infrastructure.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based memory allocation using `bumpalo`
//! - Deterministic library names and expression ids
//! - Compilation statistics
//!
//! ## Errors (`error`)
//! - One `thiserror` enum for every fatal condition
//!
//! ## Configuration (`config`)
//! - Tool names, flags and paths read from the environment

pub mod config;
pub mod error;
pub mod session;
pub mod test_utils;

pub use config::{BuildConfig, SynthesisConfig, SynthesisToolchain, ToolCommand};
pub use error::{CompileError, CompileResult};
pub use session::{CompilationSession, SessionStats, LIBNAME_LEN};
