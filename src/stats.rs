//! Rewrite and plan statistics.
//!
//! The optimizer counts each rewrite it applies and the shape of the plan
//! it emits. Counters can be printed or exported as JSON for pipeline
//! tooling; the optimizer itself never reads them back.
//!
//! # Example
//!
//! ```no_run
//! use steelflume::{Graph, Optimizer};
//! # fn main() -> steelflume::Result<()> {
//! # let (mut graph, inputs, outputs) = (Graph::new(), vec![], vec![]);
//! let mut opt = Optimizer::new();
//! let _plan = opt.optimize(&mut graph, &inputs, &outputs)?;
//! opt.stats().print();
//! if let Ok(json) = opt.stats().to_json() {
//!     println!("{json}");
//! }
//! # Ok(())
//! # }
//! ```

use serde::Serialize;

/// Counters accumulated across `optimize` calls until taken.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizeStats {
    /// `Flatten` ops pushed below their ParallelDo consumer.
    pub flattens_sunk: usize,
    /// Producer–consumer ParallelDo pairs collapsed into composed ops.
    pub producer_fusions: usize,
    /// Sibling groups merged into `MultipleParallelDo` fan-outs.
    pub sibling_fusions: usize,
    /// Dead ops and fan-out branches detached.
    pub ops_pruned: usize,
    /// MSCR units formed by the last call.
    pub mscr_count: usize,
    /// Stages in the last emitted plan.
    pub stage_count: usize,
}

impl OptimizeStats {
    /// Render the counters as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Print the counters to stdout, one per line.
    pub fn print(&self) {
        println!("flattens_sunk: {}", self.flattens_sunk);
        println!("producer_fusions: {}", self.producer_fusions);
        println!("sibling_fusions: {}", self.sibling_fusions);
        println!("ops_pruned: {}", self.ops_pruned);
        println!("mscr_count: {}", self.mscr_count);
        println!("stage_count: {}", self.stage_count);
    }
}
