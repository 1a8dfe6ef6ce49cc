//! Expression AST types.

use indexmap::IndexSet;

/// Expression AST node.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Expr {
    /// Numeric constant.
    Constant(f64),
    /// Parameter or free variable such as `time`.
    Variable(String),
    /// Node voltage: V(node) or V(node1, node2) for differential.
    Voltage {
        node_pos: String,
        node_neg: Option<String>,
    },
    /// Branch current: I(device).
    Current { source_name: String },
    /// Binary operation.
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation.
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    /// `condition ? then : else`.
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// Function call.
    Function { name: String, args: Vec<Expr> },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum UnaryOp {
    Neg,
    Not,
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    /// The constant value, if this node is a constant.
    pub fn as_constant(&self) -> Option<f64> {
        match self {
            Expr::Constant(v) => Some(*v),
            _ => None,
        }
    }

    /// Visit this node and every node below it, parents first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::BinaryOp { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::UnaryOp { operand, .. } => operand.walk(f),
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.walk(f);
                then_branch.walk(f);
                else_branch.walk(f);
            }
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.walk(f);
                }
            }
            Expr::Constant(_)
            | Expr::Variable(_)
            | Expr::Voltage { .. }
            | Expr::Current { .. } => {}
        }
    }

    /// Variable names referenced anywhere in the tree, in first-use order.
    pub fn variables(&self) -> IndexSet<String> {
        let mut names = IndexSet::new();
        self.walk(&mut |e| {
            if let Expr::Variable(name) = e {
                names.insert(name.clone());
            }
        });
        names
    }

    /// Names of all called functions, built-in or not.
    pub fn functions(&self) -> IndexSet<String> {
        let mut names = IndexSet::new();
        self.walk(&mut |e| {
            if let Expr::Function { name, .. } = e {
                names.insert(name.clone());
            }
        });
        names
    }

    /// Check if this expression contains voltage or current references.
    pub fn has_voltage_or_current(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            found |= matches!(e, Expr::Voltage { .. } | Expr::Current { .. });
        });
        found
    }

    /// Get all voltage node references in this expression.
    pub fn voltage_nodes(&self) -> Vec<String> {
        let mut nodes = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Voltage { node_pos, node_neg } = e {
                nodes.push(node_pos.clone());
                if let Some(neg) = node_neg {
                    nodes.push(neg.clone());
                }
            }
        });
        nodes.sort();
        nodes.dedup();
        nodes
    }

    /// Get all current references in this expression.
    pub fn current_sources(&self) -> Vec<String> {
        let mut sources = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Current { source_name } = e {
                sources.push(source_name.clone());
            }
        });
        sources.sort();
        sources.dedup();
        sources
    }

    /// Rebuild the tree bottom-up, letting `f` replace each node after its
    /// children have been mapped.
    pub fn try_map<E>(self, f: &mut impl FnMut(Expr) -> Result<Expr, E>) -> Result<Expr, E> {
        let mapped = match self {
            Expr::BinaryOp { op, left, right } => {
                Expr::binary(op, (*left).try_map(f)?, (*right).try_map(f)?)
            }
            Expr::UnaryOp { op, operand } => Expr::unary(op, (*operand).try_map(f)?),
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => Expr::Conditional {
                condition: Box::new((*condition).try_map(f)?),
                then_branch: Box::new((*then_branch).try_map(f)?),
                else_branch: Box::new((*else_branch).try_map(f)?),
            },
            Expr::Function { name, args } => Expr::Function {
                name,
                args: args
                    .into_iter()
                    .map(|a| a.try_map(f))
                    .collect::<Result<_, _>>()?,
            },
            leaf => leaf,
        };
        f(mapped)
    }
}
