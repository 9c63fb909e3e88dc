//! Sessions for unit tests.
//!
//! A context owns the arena; sessions borrow it with the default seed, so
//! library names and expression ids come out the same on every run.

#[cfg(test)]
pub mod test {
    use super::super::session::CompilationSession;
    use bumpalo::Bump;

    #[derive(Default)]
    pub struct TestContext {
        arena: Bump,
    }

    impl TestContext {
        pub fn new() -> Self {
            Self::default()
        }

        /// Session borrowing this context's arena.
        pub fn create_session(&self) -> CompilationSession<'_> {
            CompilationSession::new(&self.arena)
        }

        /// Bytes handed out by the arena so far.
        pub fn memory_used(&self) -> usize {
            self.arena.allocated_bytes()
        }
    }
}
