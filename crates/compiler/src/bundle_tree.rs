//! The message bundle tree
//!
//! A prefix trie over the parsing instructions of every bundle in scope.
//! Each node holds the plans that have reached it; expansion folds each
//! plan forward by one instruction, merging plans that agree on their next
//! step:
//!
//! - keyword steps land in `incomplete` (or the case-insensitive twin),
//!   keyed by the expected spelling;
//! - everything else lands in `actions`, keyed by the encoded
//!   instruction (a `Branch` contributes two successor nodes, target and
//!   fall-through);
//! - plans whose program is exhausted land in `complete`.
//!
//! Expansion is lazy: only nodes the parser actually reaches are ever
//! expanded, so the cost of a huge scope is proportional to what the
//! source really touches. Per-bundle checks encode their owning bundle in
//! the operand, so grammatical prefilters and type filters are consulted
//! against exactly the right bundle when the parser interprets them.

use crate::splitter::ParsingOperation;
use avail_core::BundleId;
use avail_runtime::runtime::Runtime;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub type NodeRef = Arc<RwLock<TreeNode>>;

/// A bundle whose instruction program has advanced to `pc` (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanInProgress {
    pub bundle: BundleId,
    pub pc: usize,
}

#[derive(Default)]
pub struct TreeNode {
    /// Plans awaiting one step of expansion.
    unexpanded: Vec<PlanInProgress>,
    /// Bundles whose message completes at this node.
    pub complete: Vec<BundleId>,
    /// Expected keyword spelling -> successor.
    pub incomplete: HashMap<String, NodeRef>,
    /// Lowercased spelling -> successor, for `⁇` parts.
    pub incomplete_case_insensitive: HashMap<String, NodeRef>,
    /// Encoded non-keyword instruction -> successor tuple (two nodes for
    /// a branch: fall-through first, target second).
    pub actions: HashMap<i64, (ParsingOperation, Vec<NodeRef>)>,
}

impl TreeNode {
    fn add_plan(&mut self, plan: PlanInProgress) {
        if !self.unexpanded.contains(&plan) {
            self.unexpanded.push(plan);
        }
    }
}

pub struct BundleTree {
    pub root: NodeRef,
}

impl BundleTree {
    /// A tree over the given bundles, all at instruction zero.
    pub fn new(bundles: impl IntoIterator<Item = BundleId>) -> BundleTree {
        let mut root = TreeNode::default();
        for bundle in bundles {
            root.add_plan(PlanInProgress { bundle, pc: 0 });
        }
        BundleTree {
            root: Arc::new(RwLock::new(root)),
        }
    }
}

/// Fold every deferred plan in `node` forward by one instruction.
/// Idempotent between mutations; cheap when nothing is pending.
pub fn expand(node: &NodeRef, runtime: &Runtime) {
    let mut guard = node.write().expect("bundle tree lock poisoned");
    if guard.unexpanded.is_empty() {
        return;
    }
    let plans = std::mem::take(&mut guard.unexpanded);
    for plan in plans {
        let bundle = runtime.bundle(plan.bundle);
        if plan.pc >= bundle.instructions.len() {
            if !guard.complete.contains(&plan.bundle) {
                guard.complete.push(plan.bundle);
            }
            continue;
        }
        let encoded = bundle.instructions[plan.pc];
        let Some(operation) = ParsingOperation::decode(encoded) else {
            // An undecodable instruction is a corrupted bundle; skip the
            // plan rather than wedging the whole scope.
            tracing::warn!(
                target: "avail::parser",
                bundle = %plan.bundle,
                pc = plan.pc,
                "undecodable parsing instruction"
            );
            continue;
        };
        match operation {
            ParsingOperation::ParsePart { part } => {
                let spelling = bundle.message_parts[part - 1].clone();
                let successor = guard
                    .incomplete
                    .entry(spelling)
                    .or_insert_with(|| Arc::new(RwLock::new(TreeNode::default())))
                    .clone();
                successor
                    .write()
                    .expect("bundle tree lock poisoned")
                    .add_plan(PlanInProgress {
                        bundle: plan.bundle,
                        pc: plan.pc + 1,
                    });
            }
            ParsingOperation::ParsePartCaseInsensitively { part } => {
                let spelling = bundle.message_parts[part - 1].to_lowercase();
                let successor = guard
                    .incomplete_case_insensitive
                    .entry(spelling)
                    .or_insert_with(|| Arc::new(RwLock::new(TreeNode::default())))
                    .clone();
                successor
                    .write()
                    .expect("bundle tree lock poisoned")
                    .add_plan(PlanInProgress {
                        bundle: plan.bundle,
                        pc: plan.pc + 1,
                    });
            }
            ParsingOperation::Jump { target } => {
                let successors = guard
                    .actions
                    .entry(encoded)
                    .or_insert_with(|| {
                        (operation, vec![Arc::new(RwLock::new(TreeNode::default()))])
                    })
                    .1
                    .clone();
                successors[0]
                    .write()
                    .expect("bundle tree lock poisoned")
                    .add_plan(PlanInProgress {
                        bundle: plan.bundle,
                        pc: target - 1,
                    });
            }
            ParsingOperation::Branch { target } => {
                let successors = guard
                    .actions
                    .entry(encoded)
                    .or_insert_with(|| {
                        (
                            operation,
                            vec![
                                Arc::new(RwLock::new(TreeNode::default())),
                                Arc::new(RwLock::new(TreeNode::default())),
                            ],
                        )
                    })
                    .1
                    .clone();
                successors[0]
                    .write()
                    .expect("bundle tree lock poisoned")
                    .add_plan(PlanInProgress {
                        bundle: plan.bundle,
                        pc: plan.pc + 1,
                    });
                successors[1]
                    .write()
                    .expect("bundle tree lock poisoned")
                    .add_plan(PlanInProgress {
                        bundle: plan.bundle,
                        pc: target - 1,
                    });
            }
            _ => {
                let successors = guard
                    .actions
                    .entry(encoded)
                    .or_insert_with(|| {
                        (operation, vec![Arc::new(RwLock::new(TreeNode::default()))])
                    })
                    .1
                    .clone();
                successors[0]
                    .write()
                    .expect("bundle tree lock poisoned")
                    .add_plan(PlanInProgress {
                        bundle: plan.bundle,
                        pc: plan.pc + 1,
                    });
            }
        }
    }
}
