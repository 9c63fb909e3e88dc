// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession is the explicit home of every piece of state that used to be
// process-wide in a synthesis-enabled build: the seeded generator that names generated
// libraries, the strictly increasing expression-id counter that names synthesis requests
// and their external symbols, interned strings for those names, and compilation
// statistics. Register-slot tables and other per-request data are copied into the arena
// once finalized so they share the session lifetime. Interior mutability (RefCell/Cell)
// lets passes hold a shared reference to the session while recording into it. Two
// sessions created with the same seed produce the same library names and ids, which
// keeps builds reproducible; distinct seeds allow parallel sessions without any shared
// mutable counters.

//! Arena-based compilation session management.
//!
//! All naming and counting for one compilation request flows through a
//! [`CompilationSession`]; there are no global counters.

use bumpalo::Bump;
use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::{Cell, RefCell};
use std::fmt;

/// Alphabet for generated library names. Omits characters that are easy to
/// misread (`l`, `o`) and the underscore, which is reserved as a separator.
const LIBNAME_CHARS: &[u8] = b"abcdefghijkmnpqrstuvwxyz0123456789";

/// Length of generated library names.
pub const LIBNAME_LEN: usize = 12;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for compilation objects.
    arena: &'arena Bump,

    /// Seeded generator for library names.
    rng: RefCell<StdRng>,

    /// Next synthesis expression id.
    next_expr_id: Cell<usize>,

    /// Session statistics for debugging and reporting.
    stats: RefCell<SessionStats>,

    /// String interning for generated names.
    interned_strings: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena and seed 0.
    pub fn new(arena: &'arena Bump) -> Self {
        Self::with_seed(arena, 0)
    }

    /// Create a session whose generated names are derived from `seed`.
    pub fn with_seed(arena: &'arena Bump, seed: u64) -> Self {
        Self {
            arena,
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
            next_expr_id: Cell::new(0),
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    /// Allocate a slice in the session arena.
    pub fn alloc_slice<T>(&self, slice: &[T]) -> &'arena [T]
    where
        T: Clone,
    {
        self.arena.alloc_slice_clone(slice)
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Draw a fresh library name from the session generator.
    pub fn fresh_library_name(&self) -> &'arena str {
        let mut rng = self.rng.borrow_mut();
        let name: String = (0..LIBNAME_LEN)
            .map(|_| LIBNAME_CHARS[rng.gen_range(0..LIBNAME_CHARS.len())] as char)
            .collect();
        drop(rng);
        self.intern_str(&name)
    }

    /// Allocate the next synthesis expression id. Ids are strictly increasing
    /// for the lifetime of the session.
    pub fn next_expr_id(&self) -> usize {
        let id = self.next_expr_id.get();
        self.next_expr_id.set(id + 1);
        id
    }

    /// Number of expression ids handed out so far.
    pub fn expr_ids_issued(&self) -> usize {
        self.next_expr_id.get()
    }

    /// Record a synthesis request sent to the oracle.
    pub fn record_synthesis_request(&self) {
        self.stats.borrow_mut().synthesis_requests += 1;
    }

    /// Record an expression replaced by an external call.
    pub fn record_rewrite(&self, symbol: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.rewrites += 1;
        stats.last_symbol = symbol.to_string();
    }

    /// Record a vectorized store whose value was left unsynthesized.
    pub fn record_skipped_store(&self) {
        self.stats.borrow_mut().skipped_stores += 1;
    }

    /// Record an external tool invocation.
    pub fn record_tool_invocation(&self, tool: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.tool_invocations += 1;
        *stats.tool_counts.entry(tool.to_string()).or_insert(0) += 1;
    }

    /// Record a shared object loaded into the process.
    pub fn record_library_loaded(&self) {
        self.stats.borrow_mut().libraries_loaded += 1;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Requests sent to the synthesis oracle.
    pub synthesis_requests: usize,

    /// Expressions replaced by external calls.
    pub rewrites: usize,

    /// Vectorized stores left unsynthesized (ineligible values).
    pub skipped_stores: usize,

    /// External tools run.
    pub tool_invocations: usize,

    /// Count of each tool run.
    pub tool_counts: std::collections::BTreeMap<String, usize>,

    /// Shared objects loaded.
    pub libraries_loaded: usize,

    /// Most recent generated external symbol.
    pub last_symbol: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Synthesis requests: {}", self.synthesis_requests)?;
        writeln!(f, "  Expressions rewritten: {}", self.rewrites)?;
        writeln!(f, "  Stores skipped: {}", self.skipped_stores)?;
        writeln!(f, "  Tool invocations: {}", self.tool_invocations)?;
        writeln!(f, "  Libraries loaded: {}", self.libraries_loaded)?;

        if !self.last_symbol.is_empty() {
            writeln!(f, "  Last synthesized symbol: {}", self.last_symbol)?;
        }

        if !self.tool_counts.is_empty() {
            writeln!(f, "  Tool breakdown:")?;
            let mut sorted: Vec<_> = self.tool_counts.iter().collect();
            sorted.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

            for (tool, count) in sorted {
                writeln!(f, "    {}: {}", tool, count)?;
            }
        }

        Ok(())
    }
}
