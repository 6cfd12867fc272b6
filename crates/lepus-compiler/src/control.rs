//! Backpatch bookkeeping: loops, try statements and optional chains
//!
//! Jumps whose targets are not yet known are emitted as placeholders and
//! recorded here. Everything recorded must be patched exactly once before
//! the owning function is finished.

use std::collections::BTreeSet;

use lepus_bytecode::Register;
use rustc_hash::FxHashMap;

use crate::ast::NodeId;
use crate::error::{CompileError, CompileResult};

/// Kind of a placeholder jump inside a loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopJump {
    /// Jumps to the loop end
    Break,
    /// Jumps to the continue point
    Continue,
    /// Jumps back to the loop head
    BackEdge,
}

/// Pending jumps of one loop
#[derive(Debug)]
pub struct LoopFrame {
    /// First instruction of the loop
    pub head: usize,
    /// Where `continue` lands, once known
    pub continue_point: Option<usize>,
    /// Placeholder jumps awaiting the loop's end
    pub sites: Vec<(LoopJump, usize)>,
    /// Open block contexts when the loop was entered
    pub context_depth: usize,
}

impl LoopFrame {
    /// Start a loop at `head`
    pub fn new(head: usize, context_depth: usize) -> Self {
        Self {
            head,
            continue_point: None,
            sites: Vec::new(),
            context_depth,
        }
    }

    /// Target of every recorded site, given the loop end
    pub fn targets(&self, end: usize) -> CompileResult<Vec<(usize, usize)>> {
        self.sites
            .iter()
            .map(|&(kind, site)| {
                let target = match kind {
                    LoopJump::Break => end,
                    LoopJump::BackEdge => self.head,
                    LoopJump::Continue => self.continue_point.ok_or_else(|| {
                        CompileError::internal("continue recorded in a loop without continue point")
                    })?,
                };
                Ok((site, target))
            })
            .collect()
    }
}

/// Pending jumps of one try statement
#[derive(Debug, Default)]
pub struct TryFrame {
    /// Jumps to the finally block (or the statement end)
    pub finally_jumps: Vec<usize>,
}

/// Instructions emitted as placeholders and not yet patched
#[derive(Debug, Default)]
pub struct PatchLedger {
    pending: BTreeSet<usize>,
}

impl PatchLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a placeholder
    pub fn register(&mut self, site: usize) {
        self.pending.insert(site);
    }

    /// Consume a placeholder; patching anything else is an error
    pub fn resolve(&mut self, site: usize) -> CompileResult<()> {
        if self.pending.remove(&site) {
            Ok(())
        } else {
            Err(CompileError::internal(format!(
                "instruction {site} is not awaiting a patch"
            )))
        }
    }

    /// Number of unpatched placeholders
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether everything has been patched
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fail if anything is left unpatched
    pub fn ensure_empty(&self) -> CompileResult<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(CompileError::internal(format!(
                "unpatched instructions: {:?}",
                self.pending
            )))
        }
    }
}

/// One member access or call in a possible optional chain
#[derive(Debug, Clone, Default)]
pub struct ChainLink {
    /// Whether this link is written with `?.`
    pub optional: bool,
    /// Placeholder loads of the chain result
    pub load_sites: Vec<usize>,
    /// Placeholder jumps to the chain end
    pub jump_sites: Vec<usize>,
    /// Instruction after the link's access
    pub end: usize,
    /// Register holding the link's value
    pub result: Option<Register>,
}

/// A resolved optional link: its sites and the target of its whole chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPatch {
    /// Loads to retarget to `result`
    pub load_sites: Vec<usize>,
    /// Jumps to point at `end`
    pub jump_sites: Vec<usize>,
    /// End of the outermost access of the chain
    pub end: usize,
    /// Result register of the outermost access
    pub result: Register,
}

/// Optional chains of one function
///
/// Every member access and call links its base to itself; the outermost
/// node of a chain is the representative of its set. Short-circuit sites
/// of every optional link are patched to the representative's end and
/// result register.
#[derive(Debug, Default)]
pub struct OptionalChains {
    links: FxHashMap<NodeId, ChainLink>,
    parent: FxHashMap<NodeId, NodeId>,
}

impl OptionalChains {
    /// Create an empty chain set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a link whose base expression is `base`
    pub fn record(&mut self, node: NodeId, base: NodeId, link: ChainLink) -> CompileResult<()> {
        if self.links.insert(node, link).is_some() {
            return Err(CompileError::internal(format!(
                "node {node:?} recorded twice in an optional chain"
            )));
        }
        self.parent.insert(base, node);
        Ok(())
    }

    /// Set where a link's access ends and which register holds its value
    pub fn finish(&mut self, node: NodeId, end: usize, result: Register) -> CompileResult<()> {
        let link = self.links.get_mut(&node).ok_or_else(|| {
            CompileError::internal(format!("node {node:?} is not part of an optional chain"))
        })?;
        link.end = end;
        link.result = Some(result);
        Ok(())
    }

    /// Representative of a node's chain, compressing the path
    pub fn find(&mut self, node: NodeId) -> NodeId {
        let mut root = node;
        while let Some(&next) = self.parent.get(&root) {
            root = next;
        }
        let mut cur = node;
        while let Some(&next) = self.parent.get(&cur) {
            if next != root {
                self.parent.insert(cur, root);
            }
            cur = next;
        }
        root
    }

    /// Resolve every optional link against its chain
    pub fn complete(&mut self) -> CompileResult<Vec<ChainPatch>> {
        let mut optional: Vec<NodeId> = self
            .links
            .iter()
            .filter(|(_, link)| link.optional)
            .map(|(id, _)| *id)
            .collect();
        optional.sort();

        let mut patches = Vec::with_capacity(optional.len());
        for node in optional {
            let root = self.find(node);
            let (end, result) = {
                let root_link = self.links.get(&root).ok_or_else(|| {
                    CompileError::internal(format!("chain root {root:?} was never recorded"))
                })?;
                let result = root_link.result.ok_or_else(|| {
                    CompileError::internal(format!("chain root {root:?} never finished"))
                })?;
                (root_link.end, result)
            };
            let link = &self.links[&node];
            patches.push(ChainPatch {
                load_sites: link.load_sites.clone(),
                jump_sites: link.jump_sites.clone(),
                end,
                result,
            });
        }
        self.links.clear();
        self.parent.clear();
        Ok(patches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_targets() {
        let mut frame = LoopFrame::new(2, 0);
        frame.sites.push((LoopJump::Break, 5));
        frame.sites.push((LoopJump::BackEdge, 8));
        frame.sites.push((LoopJump::Continue, 6));
        assert!(frame.targets(9).is_err());

        frame.continue_point = Some(7);
        assert_eq!(frame.targets(9).unwrap(), vec![(5, 9), (8, 2), (6, 7)]);
    }

    #[test]
    fn test_ledger_rejects_double_patch() {
        let mut ledger = PatchLedger::new();
        ledger.register(3);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.ensure_empty().is_err());
        assert!(ledger.resolve(3).is_ok());
        assert!(ledger.resolve(3).is_err());
        assert!(ledger.resolve(4).is_err());
        assert!(ledger.ensure_empty().is_ok());
    }

    #[test]
    fn test_chain_patches_point_at_outermost_link() {
        // a?.b.c : base a -> member(b) -> member(c)
        let (a, b, c) = (NodeId(1), NodeId(2), NodeId(3));
        let mut chains = OptionalChains::new();
        chains
            .record(
                b,
                a,
                ChainLink {
                    optional: true,
                    load_sites: vec![3],
                    jump_sites: vec![4],
                    ..Default::default()
                },
            )
            .unwrap();
        chains.finish(b, 7, Register(5)).unwrap();
        chains.record(c, b, ChainLink::default()).unwrap();
        chains.finish(c, 9, Register(6)).unwrap();

        let patches = chains.complete().unwrap();
        assert_eq!(
            patches,
            vec![ChainPatch {
                load_sites: vec![3],
                jump_sites: vec![4],
                end: 9,
                result: Register(6),
            }]
        );
    }

    #[test]
    fn test_find_compresses_paths() {
        let mut chains = OptionalChains::new();
        for i in 1..5 {
            chains
                .record(NodeId(i + 1), NodeId(i), ChainLink::default())
                .unwrap();
        }
        assert_eq!(chains.find(NodeId(1)), NodeId(5));
        assert_eq!(chains.parent[&NodeId(1)], NodeId(5));
        assert_eq!(chains.parent[&NodeId(2)], NodeId(5));
    }

    #[test]
    fn test_duplicate_record() {
        let mut chains = OptionalChains::new();
        chains.record(NodeId(2), NodeId(1), ChainLink::default()).unwrap();
        assert!(
            chains
                .record(NodeId(2), NodeId(1), ChainLink::default())
                .is_err()
        );
    }
}
