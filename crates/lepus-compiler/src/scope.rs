//! Block scopes of the function being generated

use lepus_bytecode::{LineCol, Register};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value, json};

use crate::analysis::BlockNumber;

/// What a name means inside a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameBinding {
    /// Plain local register
    Local(Register),
    /// Local whose value is mirrored into a context slot of this function
    Exported {
        /// Working register
        register: Register,
        /// Slot in the owning context
        slot: u16,
        /// Register holding the owning context
        context: Register,
    },
    /// Context slot of an enclosing function, cached after first resolution
    Captured {
        /// Slot in the target context
        slot: u16,
        /// Contexts to skip from the closure's environment
        depth: u16,
    },
}

impl NameBinding {
    /// Working register of a local or exported binding
    pub fn register(self) -> Option<Register> {
        match self {
            Self::Local(register) | Self::Exported { register, .. } => Some(register),
            Self::Captured { .. } => None,
        }
    }

    fn describe(self) -> Value {
        match self {
            Self::Local(register) => json!({"kind": "local", "register": register.index()}),
            Self::Exported { slot, context, .. } => {
                json!({"kind": "outside", "slot": slot, "context": context.index()})
            }
            Self::Captured { slot, depth } => {
                json!({"kind": "closure", "slot": slot, "depth": depth})
            }
        }
    }
}

/// A lexical block
#[derive(Debug)]
pub struct Block {
    /// Pre-order block number within the unit
    pub number: BlockNumber,
    /// Enclosing block
    pub parent: Option<usize>,
    /// Names declared or cached here
    pub names: FxHashMap<String, NameBinding>,
    /// Nested blocks, in opening order
    pub children: Vec<usize>,
    /// Block context register, when this block owns one
    pub context: Option<Register>,
    /// Source range
    pub start: LineCol,
    /// Source range end
    pub end: LineCol,
}

/// Block tree of one function
#[derive(Debug, Default)]
pub struct BlockTree {
    blocks: Vec<Block>,
    current: Option<usize>,
}

impl BlockTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a block nested in the current one
    pub fn enter(&mut self, number: BlockNumber, start: LineCol, end: LineCol) -> usize {
        let idx = self.blocks.len();
        self.blocks.push(Block {
            number,
            parent: self.current,
            names: FxHashMap::default(),
            children: Vec::new(),
            context: None,
            start,
            end,
        });
        if let Some(parent) = self.current {
            self.blocks[parent].children.push(idx);
        }
        self.current = Some(idx);
        idx
    }

    /// Close the current block
    pub fn exit(&mut self) -> Option<usize> {
        let idx = self.current?;
        self.current = self.blocks[idx].parent;
        Some(idx)
    }

    /// Index of the current block
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Current block
    pub fn current_block(&self) -> Option<&Block> {
        self.current.map(|idx| &self.blocks[idx])
    }

    /// Current block, mutably
    pub fn current_block_mut(&mut self) -> Option<&mut Block> {
        self.current.map(|idx| &mut self.blocks[idx])
    }

    /// Block by index
    pub fn get(&self, idx: usize) -> Option<&Block> {
        self.blocks.get(idx)
    }

    /// Root block, if any block was opened
    pub fn root(&self) -> Option<&Block> {
        self.blocks.first()
    }

    /// Declare a name in the current block.
    ///
    /// Returns `false` when the block already declares it. A cached capture
    /// of the same name is replaced.
    pub fn declare(&mut self, name: &str, binding: NameBinding) -> bool {
        let Some(block) = self.current_block_mut() else {
            return false;
        };
        match block.names.get(name) {
            Some(NameBinding::Captured { .. }) | None => {
                block.names.insert(name.to_string(), binding);
                true
            }
            Some(_) => false,
        }
    }

    /// Replace the binding of a name already declared in the chain
    pub fn rebind(&mut self, name: &str, binding: NameBinding) -> bool {
        let mut idx = self.current;
        while let Some(i) = idx {
            if let Some(slot) = self.blocks[i].names.get_mut(name)
                && slot.register().is_some()
            {
                *slot = binding;
                return true;
            }
            idx = self.blocks[i].parent;
        }
        false
    }

    /// Find a local or exported binding from the current block outward
    pub fn lookup_local(&self, name: &str) -> Option<NameBinding> {
        let mut idx = self.current;
        while let Some(i) = idx {
            let block = &self.blocks[i];
            if let Some(binding) = block.names.get(name)
                && binding.register().is_some()
            {
                return Some(*binding);
            }
            idx = block.parent;
        }
        None
    }

    /// Cached capture of a name in the current block
    pub fn cached_capture(&self, name: &str) -> Option<(u16, u16)> {
        match self.current_block()?.names.get(name)? {
            NameBinding::Captured { slot, depth } => Some((*slot, *depth)),
            _ => None,
        }
    }

    /// Scope descriptor tree rooted at the function's root block
    pub fn descriptor(&self) -> Value {
        if self.blocks.is_empty() {
            return Value::Null;
        }
        self.describe(0)
    }

    fn describe(&self, idx: usize) -> Value {
        let block = &self.blocks[idx];
        let variables: Map<String, Value> = block
            .names
            .iter()
            .map(|(name, binding)| (name.clone(), binding.describe()))
            .collect();
        let children: Vec<Value> = block.children.iter().map(|&c| self.describe(c)).collect();
        json!({
            "startLine": block.start.encode(),
            "endLine": block.end.encode(),
            "variables": variables,
            "children": children,
        })
    }
}
