//! Staged execution plans.
//!
//! The scheduler arranges MSCR units into a forward-linked chain of
//! [`ExecutionStep`]s. Stages run in order; within a stage the units are
//! independent and an executor may run them in parallel. Steps own their
//! units—the plan is the sole handle an executor needs.

use crate::error::{Error, Result};
use crate::handle::CollectionId;
use crate::mscr::Mscr;
use std::collections::HashMap;
use tracing::debug;

/// One stage of the plan: a set of MSCRs that may run concurrently, plus
/// the link to the next stage.
#[derive(Debug, Default)]
pub struct ExecutionStep {
    pub mscr_steps: Vec<Mscr>,
    pub next_step: Option<Box<ExecutionStep>>,
}

impl ExecutionStep {
    /// Number of stages in the chain starting here.
    pub fn len(&self) -> usize {
        1 + self.next_step.as_deref().map_or(0, ExecutionStep::len)
    }

    /// Whether the whole chain carries no MSCRs.
    pub fn is_empty(&self) -> bool {
        self.stages().all(|s| s.mscr_steps.is_empty())
    }

    /// Iterate over the stages front to back.
    pub fn stages(&self) -> Stages<'_> {
        Stages(Some(self))
    }
}

/// Iterator over the stages of a plan.
pub struct Stages<'a>(Option<&'a ExecutionStep>);

impl<'a> Iterator for Stages<'a> {
    type Item = &'a ExecutionStep;

    fn next(&mut self) -> Option<Self::Item> {
        let step = self.0?;
        self.0 = step.next_step.as_deref();
        Some(step)
    }
}

/// Arrange MSCRs into stages respecting inter-unit dependencies.
///
/// A unit depends on another when one of its input collections is a
/// channel output of the other. Stage 0 holds the beginning units (those
/// fed directly by user inputs) with no dependencies; each later stage
/// holds every unit whose dependencies are all scheduled. A pass that
/// schedules nothing while units remain means the dependency graph has a
/// cycle.
pub(crate) fn schedule(mscrs: Vec<Mscr>, inputs: &[CollectionId]) -> Result<ExecutionStep> {
    let n = mscrs.len();

    // which unit produces which boundary collection
    let mut owner: HashMap<CollectionId, usize> = HashMap::new();
    for (i, m) in mscrs.iter().enumerate() {
        for &out in m.output_channels.keys() {
            owner.insert(out, i);
        }
    }
    let mut deps: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut beginning = vec![false; n];
    for (i, m) in mscrs.iter().enumerate() {
        for &c in &m.inputs {
            if inputs.contains(&c) {
                beginning[i] = true;
            }
            if let Some(&j) = owner.get(&c) {
                if j != i && !deps[i].contains(&j) {
                    deps[i].push(j);
                }
            }
        }
    }

    let mut scheduled = vec![false; n];
    let mut stages: Vec<Vec<usize>> = Vec::new();
    let first: Vec<usize> = (0..n)
        .filter(|&i| beginning[i] && deps[i].is_empty())
        .collect();
    let mut done = first.len();
    for &i in &first {
        scheduled[i] = true;
    }
    if !first.is_empty() || n == 0 {
        stages.push(first);
    }
    while done < n {
        let next: Vec<usize> = (0..n)
            .filter(|&i| !scheduled[i] && deps[i].iter().all(|&j| scheduled[j]))
            .collect();
        if next.is_empty() {
            return Err(Error::InvariantViolated(
                "mscr dependency graph contains a cycle",
            ));
        }
        for &i in &next {
            scheduled[i] = true;
        }
        done += next.len();
        stages.push(next);
    }
    debug!(mscrs = n, stages = stages.len(), "plan staged");

    // assemble the forward-linked chain back to front
    let mut slots: Vec<Option<Mscr>> = mscrs.into_iter().map(Some).collect();
    let mut next_step: Option<Box<ExecutionStep>> = None;
    for stage in stages.into_iter().rev() {
        next_step = Some(Box::new(ExecutionStep {
            mscr_steps: stage
                .into_iter()
                .map(|i| slots[i].take().expect("each unit scheduled once"))
                .collect(),
            next_step,
        }));
    }
    Ok(match next_step {
        Some(step) => *step,
        None => ExecutionStep::default(),
    })
}
