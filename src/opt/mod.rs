//! IR rewriting passes that feed the synthesis oracle.
//!
//! [`LoopOptimizer`] finds vectorized innermost loops and hands each store's
//! value to [`ExprOptimizer`], which replaces eligible expressions by calls
//! to oracle-produced functions.

pub mod expr_optimizer;
pub mod lanes;
pub mod loop_optimizer;

pub use expr_optimizer::{ExprOptimizer, SkipReason};
pub use lanes::{scale_increment, LaneAnnotator};
pub use loop_optimizer::{LoopOptimizer, VectorContext};
