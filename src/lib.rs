pub mod dofn;
pub mod error;
pub mod graph;
pub mod handle;
pub mod interpreter;
pub mod mscr;
pub mod op;
pub mod optimizer;
pub mod plan;
pub mod stats;
pub mod testing;
pub mod type_token;
pub mod workflow;

pub use dofn::{
    combine_per_key_fn, compose, filter_fn, flat_map_fn, map_fn, pair_grouper, DoFn, Grouper,
    SFBound,
};
pub use error::{Error, Result};
pub use graph::Graph;
pub use handle::{CollectionId, OpId};
pub use interpreter::Interpreter;
pub use mscr::{mscr_blocks, Mscr, OutputChannel};
pub use op::DeferredOp;
pub use optimizer::Optimizer;
pub use plan::ExecutionStep;
pub use stats::OptimizeStats;
pub use type_token::{element, Element, TypeTag};
pub use workflow::Workflow;
