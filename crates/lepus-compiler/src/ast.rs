//! Lepus syntax tree consumed by the code generator
//!
//! The parser lives outside this crate. Trees arrive either built in memory
//! (see [`AstBuilder`]) or deserialized from the parser's JSON dump, where
//! every node is an object with a `"type"` tag:
//!
//! ```json
//! {"id": 3, "pos": {"line": 1, "column": 1}, "type": "Identifier", "name": "x"}
//! ```
//!
//! Node ids must be unique within one tree. [`Node::renumber`] assigns fresh
//! pre-order ids when the producer cannot guarantee that; `compile` does so
//! itself when it finds a repeated id.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Stable identity of a syntax node
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

/// Source position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line (1-indexed, 0 when unknown)
    pub line: u32,
    /// Column (1-indexed, 0 when unknown)
    pub column: u32,
}

impl Position {
    /// Create a new position
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A syntax node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique id within the tree
    #[serde(default)]
    pub id: NodeId,
    /// Start position
    #[serde(default)]
    pub pos: Position,
    /// End position (used for scope descriptors)
    #[serde(default)]
    pub end: Position,
    /// Node payload
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Node payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(missing_docs)]
pub enum NodeKind {
    /// Whole compilation unit
    Chunk { body: Vec<Node> },
    Block { body: Vec<Node> },
    If {
        test: Box<Node>,
        consequent: Box<Node>,
        #[serde(default)]
        alternate: Option<Box<Node>>,
    },
    For {
        #[serde(default)]
        init: Option<Box<Node>>,
        #[serde(default)]
        test: Option<Box<Node>>,
        #[serde(default)]
        update: Vec<Node>,
        body: Box<Node>,
    },
    While {
        test: Box<Node>,
        body: Box<Node>,
    },
    DoWhile {
        body: Box<Node>,
        test: Box<Node>,
    },
    Try {
        block: Box<Node>,
        #[serde(default)]
        handler: Option<CatchClause>,
        #[serde(default)]
        finalizer: Option<Box<Node>>,
    },
    Throw {
        #[serde(default)]
        argument: Option<Box<Node>>,
    },
    Break,
    Continue,
    Return {
        #[serde(default)]
        argument: Option<Box<Node>>,
    },
    /// Function declaration or literal; a named one declares its name in the enclosing block
    Function {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        params: Vec<String>,
        body: Box<Node>,
    },
    Variable {
        name: String,
        #[serde(default)]
        init: Option<Box<Node>>,
    },
    VariableList { declarations: Vec<Node> },
    Assign {
        op: AssignOp,
        target: Box<Node>,
        value: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Unary {
        op: UnaryOp,
        argument: Box<Node>,
    },
    Ternary {
        test: Box<Node>,
        consequent: Box<Node>,
        alternate: Box<Node>,
    },
    /// `object[property]`; dotted access carries a string literal property
    Member {
        object: Box<Node>,
        property: Box<Node>,
        #[serde(default)]
        optional: bool,
    },
    Call {
        callee: Box<Node>,
        #[serde(default)]
        arguments: Vec<Node>,
        #[serde(default)]
        optional: bool,
    },
    Object { properties: Vec<Property> },
    Array { elements: Vec<Node> },
    Literal { value: Literal },
    Identifier {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        update: Option<Update>,
    },
    Sequence { expressions: Vec<Node> },
}

/// `catch (param) { body }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    /// Bound exception name
    #[serde(default)]
    pub param: Option<String>,
    /// Handler body
    pub body: Box<Node>,
}

/// `key: value` in an object literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property key
    pub key: String,
    /// Property value
    pub value: Node,
}

/// Object literal properties in emission order (by key, stable)
pub fn sorted_properties(properties: &[Property]) -> Vec<&Property> {
    let mut sorted: Vec<&Property> = properties.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));
    sorted
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Undefined,
    RegExp { pattern: String, flags: String },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
    #[serde(rename = "**")]
    Pow,
    #[serde(rename = "&")]
    BitAnd,
    #[serde(rename = "|")]
    BitOr,
    #[serde(rename = "^")]
    BitXor,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "===")]
    StrictEq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "!==")]
    StrictNe,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
    #[serde(rename = "??")]
    Nullish,
}

impl BinaryOp {
    /// Source spelling
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Eq => "==",
            Self::StrictEq => "===",
            Self::Ne => "!=",
            Self::StrictNe => "!==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Nullish => "??",
        }
    }
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum AssignOp {
    #[serde(rename = "=")]
    Assign,
    #[serde(rename = "+=")]
    Add,
    #[serde(rename = "-=")]
    Sub,
    #[serde(rename = "*=")]
    Mul,
    #[serde(rename = "/=")]
    Div,
    #[serde(rename = "%=")]
    Mod,
    #[serde(rename = "**=")]
    Pow,
    #[serde(rename = "&=")]
    BitAnd,
    #[serde(rename = "|=")]
    BitOr,
    #[serde(rename = "^=")]
    BitXor,
}

impl AssignOp {
    /// Binary operator applied by a compound assignment
    pub const fn binary(self) -> Option<BinaryOp> {
        Some(match self {
            Self::Assign => return None,
            Self::Add => BinaryOp::Add,
            Self::Sub => BinaryOp::Sub,
            Self::Mul => BinaryOp::Mul,
            Self::Div => BinaryOp::Div,
            Self::Mod => BinaryOp::Mod,
            Self::Pow => BinaryOp::Pow,
            Self::BitAnd => BinaryOp::BitAnd,
            Self::BitOr => BinaryOp::BitOr,
            Self::BitXor => BinaryOp::BitXor,
        })
    }

    /// Source spelling
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::Add => "+=",
            Self::Sub => "-=",
            Self::Mul => "*=",
            Self::Div => "/=",
            Self::Mod => "%=",
            Self::Pow => "**=",
            Self::BitAnd => "&=",
            Self::BitOr => "|=",
            Self::BitXor => "^=",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum UnaryOp {
    #[serde(rename = "-")]
    Neg,
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "!")]
    Not,
    #[serde(rename = "~")]
    BitNot,
    #[serde(rename = "typeof")]
    TypeOf,
}

impl UnaryOp {
    /// Source spelling
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Plus => "+",
            Self::Not => "!",
            Self::BitNot => "~",
            Self::TypeOf => "typeof",
        }
    }
}

/// Increment/decrement attached to an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Update {
    #[serde(rename = "++x")]
    PreIncrement,
    #[serde(rename = "x++")]
    PostIncrement,
    #[serde(rename = "--x")]
    PreDecrement,
    #[serde(rename = "x--")]
    PostDecrement,
}

impl Update {
    /// Whether the new value is the expression's result
    pub const fn is_prefix(self) -> bool {
        matches!(self, Self::PreIncrement | Self::PreDecrement)
    }

    /// Whether the update adds one
    pub const fn is_increment(self) -> bool {
        matches!(self, Self::PreIncrement | Self::PostIncrement)
    }
}

impl Node {
    /// Create a node with a default id and position
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::default(),
            pos: Position::default(),
            end: Position::default(),
            kind,
        }
    }

    /// Statements a branch or body contributes to its block.
    ///
    /// A `Block` node contributes its body, anything else contributes itself.
    pub fn as_statements(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Block { body } => body,
            _ => std::slice::from_ref(self),
        }
    }

    /// Identifier name, if this node is an identifier
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Identifier { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Direct children in evaluation order
    pub fn children(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        match &self.kind {
            NodeKind::Chunk { body } | NodeKind::Block { body } => out.extend(body),
            NodeKind::If {
                test,
                consequent,
                alternate,
            } => {
                out.push(&**test);
                out.push(&**consequent);
                out.extend(alternate.as_deref());
            }
            NodeKind::For {
                init,
                test,
                update,
                body,
            } => {
                out.extend(init.as_deref());
                out.extend(test.as_deref());
                out.push(&**body);
                out.extend(update);
            }
            NodeKind::While { test, body } => {
                out.push(&**test);
                out.push(&**body);
            }
            NodeKind::DoWhile { body, test } => {
                out.push(&**body);
                out.push(&**test);
            }
            NodeKind::Try {
                block,
                handler,
                finalizer,
            } => {
                out.push(&**block);
                out.extend(handler.as_ref().map(|h| &*h.body));
                out.extend(finalizer.as_deref());
            }
            NodeKind::Throw { argument } | NodeKind::Return { argument } => {
                out.extend(argument.as_deref())
            }
            NodeKind::Function { body, .. } => out.push(&**body),
            NodeKind::Variable { init, .. } => out.extend(init.as_deref()),
            NodeKind::VariableList { declarations } => out.extend(declarations),
            NodeKind::Assign { target, value, .. } => {
                out.push(&**target);
                out.push(&**value);
            }
            NodeKind::Binary { left, right, .. } => {
                out.push(&**left);
                out.push(&**right);
            }
            NodeKind::Unary { argument, .. } => out.push(&**argument),
            NodeKind::Ternary {
                test,
                consequent,
                alternate,
            } => {
                out.push(&**test);
                out.push(&**consequent);
                out.push(&**alternate);
            }
            NodeKind::Member {
                object, property, ..
            } => {
                out.push(&**object);
                out.push(&**property);
            }
            NodeKind::Call {
                callee, arguments, ..
            } => {
                out.push(&**callee);
                out.extend(arguments);
            }
            NodeKind::Object { properties } => out.extend(properties.iter().map(|p| &p.value)),
            NodeKind::Array { elements } => out.extend(elements),
            NodeKind::Sequence { expressions } => out.extend(expressions),
            NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Literal { .. }
            | NodeKind::Identifier { .. } => {}
        }
        out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        let mut out = Vec::new();
        match &mut self.kind {
            NodeKind::Chunk { body } | NodeKind::Block { body } => out.extend(body),
            NodeKind::If {
                test,
                consequent,
                alternate,
            } => {
                out.push(&mut **test);
                out.push(&mut **consequent);
                out.extend(alternate.as_deref_mut());
            }
            NodeKind::For {
                init,
                test,
                update,
                body,
            } => {
                out.extend(init.as_deref_mut());
                out.extend(test.as_deref_mut());
                out.push(&mut **body);
                out.extend(update);
            }
            NodeKind::While { test, body } => {
                out.push(&mut **test);
                out.push(&mut **body);
            }
            NodeKind::DoWhile { body, test } => {
                out.push(&mut **body);
                out.push(&mut **test);
            }
            NodeKind::Try {
                block,
                handler,
                finalizer,
            } => {
                out.push(&mut **block);
                out.extend(handler.as_mut().map(|h| &mut *h.body));
                out.extend(finalizer.as_deref_mut());
            }
            NodeKind::Throw { argument } | NodeKind::Return { argument } => {
                out.extend(argument.as_deref_mut())
            }
            NodeKind::Function { body, .. } => out.push(&mut **body),
            NodeKind::Variable { init, .. } => out.extend(init.as_deref_mut()),
            NodeKind::VariableList { declarations } => out.extend(declarations),
            NodeKind::Assign { target, value, .. } => {
                out.push(&mut **target);
                out.push(&mut **value);
            }
            NodeKind::Binary { left, right, .. } => {
                out.push(&mut **left);
                out.push(&mut **right);
            }
            NodeKind::Unary { argument, .. } => out.push(&mut **argument),
            NodeKind::Ternary {
                test,
                consequent,
                alternate,
            } => {
                out.push(&mut **test);
                out.push(&mut **consequent);
                out.push(&mut **alternate);
            }
            NodeKind::Member {
                object, property, ..
            } => {
                out.push(&mut **object);
                out.push(&mut **property);
            }
            NodeKind::Call {
                callee, arguments, ..
            } => {
                out.push(&mut **callee);
                out.extend(arguments);
            }
            NodeKind::Object { properties } => {
                out.extend(properties.iter_mut().map(|p| &mut p.value))
            }
            NodeKind::Array { elements } => out.extend(elements),
            NodeKind::Sequence { expressions } => out.extend(expressions),
            NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Literal { .. }
            | NodeKind::Identifier { .. } => {}
        }
        out
    }

    /// Assign fresh pre-order ids starting at 1; returns the number of nodes
    pub fn renumber(&mut self) -> u32 {
        let mut next = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            next += 1;
            node.id = NodeId(next);
            let mut children = node.children_mut();
            children.reverse();
            stack.extend(children);
        }
        next
    }

    /// First id that appears on more than one node, in pre-order
    pub fn duplicate_id(&self) -> Option<NodeId> {
        let mut seen = FxHashSet::default();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id) {
                return Some(node.id);
            }
            let mut children = node.children();
            children.reverse();
            stack.extend(children);
        }
        None
    }

    /// Count of nodes in this subtree
    pub fn size(&self) -> usize {
        1 + self.children().iter().map(|c| c.size()).sum::<usize>()
    }
}

/// Builds syntax trees with unique node ids
///
/// Positions default to line 1; [`AstBuilder::at_line`] moves the cursor
/// for subsequently built nodes.
#[derive(Debug)]
pub struct AstBuilder {
    next_id: u32,
    line: u32,
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AstBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            next_id: 0,
            line: 1,
        }
    }

    /// Set the line of subsequently built nodes
    pub fn at_line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    fn node(&mut self, kind: NodeKind) -> Node {
        self.next_id += 1;
        Node {
            id: NodeId(self.next_id),
            pos: Position::new(self.line, 1),
            end: Position::new(self.line, 1),
            kind,
        }
    }

    /// Whole program
    pub fn chunk(&mut self, body: Vec<Node>) -> Node {
        let end = body.iter().map(|n| n.end.line).max().unwrap_or(self.line);
        let mut node = self.node(NodeKind::Chunk { body });
        node.pos = Position::new(1, 1);
        node.end = Position::new(end, 1);
        node
    }

    /// `{ ... }`
    pub fn block(&mut self, body: Vec<Node>) -> Node {
        self.node(NodeKind::Block { body })
    }

    /// `if (test) consequent else alternate`
    pub fn if_(&mut self, test: Node, consequent: Node, alternate: Option<Node>) -> Node {
        self.node(NodeKind::If {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: alternate.map(Box::new),
        })
    }

    /// `for (init; test; update) body`
    pub fn for_(
        &mut self,
        init: Option<Node>,
        test: Option<Node>,
        update: Vec<Node>,
        body: Node,
    ) -> Node {
        self.node(NodeKind::For {
            init: init.map(Box::new),
            test: test.map(Box::new),
            update,
            body: Box::new(body),
        })
    }

    /// `while (test) body`
    pub fn while_(&mut self, test: Node, body: Node) -> Node {
        self.node(NodeKind::While {
            test: Box::new(test),
            body: Box::new(body),
        })
    }

    /// `do body while (test)`
    pub fn do_while(&mut self, body: Node, test: Node) -> Node {
        self.node(NodeKind::DoWhile {
            body: Box::new(body),
            test: Box::new(test),
        })
    }

    /// `try block catch (param) handler finally finalizer`
    pub fn try_(
        &mut self,
        block: Node,
        handler: Option<(Option<&str>, Node)>,
        finalizer: Option<Node>,
    ) -> Node {
        self.node(NodeKind::Try {
            block: Box::new(block),
            handler: handler.map(|(param, body)| CatchClause {
                param: param.map(str::to_string),
                body: Box::new(body),
            }),
            finalizer: finalizer.map(Box::new),
        })
    }

    /// `throw argument`
    pub fn throw(&mut self, argument: Node) -> Node {
        self.node(NodeKind::Throw {
            argument: Some(Box::new(argument)),
        })
    }

    /// `break`
    pub fn break_(&mut self) -> Node {
        self.node(NodeKind::Break)
    }

    /// `continue`
    pub fn continue_(&mut self) -> Node {
        self.node(NodeKind::Continue)
    }

    /// `return argument`
    pub fn ret(&mut self, argument: Option<Node>) -> Node {
        self.node(NodeKind::Return {
            argument: argument.map(Box::new),
        })
    }

    /// `function name(params) { body }`
    pub fn function(&mut self, name: Option<&str>, params: &[&str], body: Vec<Node>) -> Node {
        let body = self.block(body);
        self.node(NodeKind::Function {
            name: name.map(str::to_string),
            params: params.iter().map(|p| p.to_string()).collect(),
            body: Box::new(body),
        })
    }

    /// `let name = init`
    pub fn var(&mut self, name: &str, init: Option<Node>) -> Node {
        self.node(NodeKind::Variable {
            name: name.to_string(),
            init: init.map(Box::new),
        })
    }

    /// `let a = 1, b = 2`
    pub fn var_list(&mut self, declarations: Vec<Node>) -> Node {
        self.node(NodeKind::VariableList { declarations })
    }

    /// `target = value`
    pub fn assign(&mut self, target: Node, value: Node) -> Node {
        self.assign_op(AssignOp::Assign, target, value)
    }

    /// `target op= value`
    pub fn assign_op(&mut self, op: AssignOp, target: Node, value: Node) -> Node {
        self.node(NodeKind::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    /// `left op right`
    pub fn binary(&mut self, op: BinaryOp, left: Node, right: Node) -> Node {
        self.node(NodeKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// `op argument`
    pub fn unary(&mut self, op: UnaryOp, argument: Node) -> Node {
        self.node(NodeKind::Unary {
            op,
            argument: Box::new(argument),
        })
    }

    /// `test ? consequent : alternate`
    pub fn ternary(&mut self, test: Node, consequent: Node, alternate: Node) -> Node {
        self.node(NodeKind::Ternary {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    /// `object.property`
    pub fn member(&mut self, object: Node, property: &str) -> Node {
        let key = self.string(property);
        self.member_node(object, key, false)
    }

    /// `object?.property`
    pub fn opt_member(&mut self, object: Node, property: &str) -> Node {
        let key = self.string(property);
        self.member_node(object, key, true)
    }

    /// `object[key]`
    pub fn index(&mut self, object: Node, key: Node) -> Node {
        self.member_node(object, key, false)
    }

    fn member_node(&mut self, object: Node, property: Node, optional: bool) -> Node {
        self.node(NodeKind::Member {
            object: Box::new(object),
            property: Box::new(property),
            optional,
        })
    }

    /// `callee(arguments)`
    pub fn call(&mut self, callee: Node, arguments: Vec<Node>) -> Node {
        self.call_node(callee, arguments, false)
    }

    /// `callee?.(arguments)`
    pub fn opt_call(&mut self, callee: Node, arguments: Vec<Node>) -> Node {
        self.call_node(callee, arguments, true)
    }

    fn call_node(&mut self, callee: Node, arguments: Vec<Node>, optional: bool) -> Node {
        self.node(NodeKind::Call {
            callee: Box::new(callee),
            arguments,
            optional,
        })
    }

    /// `{ key: value, ... }`
    pub fn object(&mut self, properties: Vec<(&str, Node)>) -> Node {
        self.node(NodeKind::Object {
            properties: properties
                .into_iter()
                .map(|(key, value)| Property {
                    key: key.to_string(),
                    value,
                })
                .collect(),
        })
    }

    /// `[elements]`
    pub fn array(&mut self, elements: Vec<Node>) -> Node {
        self.node(NodeKind::Array { elements })
    }

    /// `a, b, c`
    pub fn sequence(&mut self, expressions: Vec<Node>) -> Node {
        self.node(NodeKind::Sequence { expressions })
    }

    /// Number literal
    pub fn number(&mut self, value: f64) -> Node {
        self.literal(Literal::Number(value))
    }

    /// String literal
    pub fn string(&mut self, value: &str) -> Node {
        self.literal(Literal::String(value.to_string()))
    }

    /// Boolean literal
    pub fn bool(&mut self, value: bool) -> Node {
        self.literal(Literal::Bool(value))
    }

    /// `null`
    pub fn null(&mut self) -> Node {
        self.literal(Literal::Null)
    }

    /// `undefined`
    pub fn undefined(&mut self) -> Node {
        self.literal(Literal::Undefined)
    }

    /// `/pattern/flags`
    pub fn regexp(&mut self, pattern: &str, flags: &str) -> Node {
        self.literal(Literal::RegExp {
            pattern: pattern.to_string(),
            flags: flags.to_string(),
        })
    }

    fn literal(&mut self, value: Literal) -> Node {
        self.node(NodeKind::Literal { value })
    }

    /// Identifier reference
    pub fn ident(&mut self, name: &str) -> Node {
        self.node(NodeKind::Identifier {
            name: name.to_string(),
            update: None,
        })
    }

    /// `++name`, `name++`, `--name`, `name--`
    pub fn update(&mut self, name: &str, update: Update) -> Node {
        self.node(NodeKind::Identifier {
            name: name.to_string(),
            update: Some(update),
        })
    }
}
