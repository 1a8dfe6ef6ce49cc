//! Expression evaluation against a scope.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::functions::{self, FunctionDefinition};
use crate::error::{Error, Result};

/// Name bindings an expression is evaluated against.
///
/// Parameter scopes resolve variables to parameters and have no signal
/// values; a [`SignalContext`] supplies node voltages and device currents
/// for resolved expressions.
pub trait Scope {
    fn variable(&self, name: &str) -> Result<f64>;

    /// User-defined function visible from this scope.
    fn function(&self, _name: &str) -> Option<Rc<FunctionDefinition>> {
        None
    }

    fn voltage(&self, node: &str) -> Result<f64> {
        Err(Error::UnresolvedSignal(format!("V({node})")))
    }

    fn current(&self, device: &str) -> Result<f64> {
        Err(Error::UnresolvedSignal(format!("I({device})")))
    }

    /// Uniform sample in `[0, 1)`.
    fn random(&self) -> f64;

    /// Number of user function frames between this scope and its root.
    fn depth(&self) -> usize {
        0
    }
}

fn truth(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

impl Expr {
    /// Evaluate the expression in the given scope.
    ///
    /// `&&`, `||`, `?:` and `if()` only evaluate the operands they need.
    pub fn eval(&self, scope: &dyn Scope) -> Result<f64> {
        match self {
            Expr::Constant(v) => Ok(*v),
            Expr::Variable(name) => scope.variable(name),
            Expr::Voltage { node_pos, node_neg } => {
                let v_pos = scope.voltage(node_pos)?;
                let v_neg = match node_neg {
                    Some(n) => scope.voltage(n)?,
                    None => 0.0,
                };
                Ok(v_pos - v_neg)
            }
            Expr::Current { source_name } => scope.current(source_name),
            Expr::BinaryOp {
                op: BinaryOp::And,
                left,
                right,
            } => Ok(truth(left.eval(scope)? != 0.0 && right.eval(scope)? != 0.0)),
            Expr::BinaryOp {
                op: BinaryOp::Or,
                left,
                right,
            } => Ok(truth(left.eval(scope)? != 0.0 || right.eval(scope)? != 0.0)),
            Expr::BinaryOp { op, left, right } => {
                let l = left.eval(scope)?;
                let r = right.eval(scope)?;
                apply_binary(*op, l, r)
            }
            Expr::UnaryOp { op, operand } => {
                let v = operand.eval(scope)?;
                Ok(match op {
                    UnaryOp::Neg => -v,
                    UnaryOp::Not => truth(v == 0.0),
                })
            }
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if condition.eval(scope)? != 0.0 {
                    then_branch.eval(scope)
                } else {
                    else_branch.eval(scope)
                }
            }
            Expr::Function { name, args } => functions::call(name, args, scope),
        }
    }
}

pub(crate) fn apply_binary(op: BinaryOp, l: f64, r: f64) -> Result<f64> {
    Ok(match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r == 0.0 {
                return Err(Error::DivisionByZero);
            }
            l / r
        }
        BinaryOp::Pow => l.powf(r),
        BinaryOp::Lt => truth(l < r),
        BinaryOp::Le => truth(l <= r),
        BinaryOp::Gt => truth(l > r),
        BinaryOp::Ge => truth(l >= r),
        BinaryOp::Eq => truth(l == r),
        BinaryOp::Ne => truth(l != r),
        BinaryOp::And => truth(l != 0.0 && r != 0.0),
        BinaryOp::Or => truth(l != 0.0 || r != 0.0),
    })
}

/// Signal values for evaluating resolved expressions.
#[derive(Debug, Clone)]
pub struct SignalContext {
    /// Node voltages by name.
    pub voltages: HashMap<String, f64>,
    /// Device currents by name.
    pub currents: HashMap<String, f64>,
    /// Free variables such as `time` or `temper`.
    pub variables: HashMap<String, f64>,
    rng: RefCell<StdRng>,
}

impl Default for SignalContext {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl SignalContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context whose `random()`/`gauss()` draws are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            voltages: HashMap::new(),
            currents: HashMap::new(),
            variables: HashMap::new(),
            rng: RefCell::new(rng),
        }
    }

    /// Set a node voltage.
    pub fn set_voltage(&mut self, node: &str, voltage: f64) {
        self.voltages.insert(node.to_uppercase(), voltage);
    }

    /// Set a device current.
    pub fn set_current(&mut self, device: &str, current: f64) {
        self.currents.insert(device.to_uppercase(), current);
    }

    pub fn set_variable(&mut self, name: &str, value: f64) {
        self.variables.insert(name.to_lowercase(), value);
    }

    /// Set the simulation time.
    pub fn set_time(&mut self, time: f64) {
        self.set_variable("time", time);
    }
}

impl Scope for SignalContext {
    fn variable(&self, name: &str) -> Result<f64> {
        self.variables
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))
    }

    fn voltage(&self, node: &str) -> Result<f64> {
        self.voltages
            .get(&node.to_uppercase())
            .copied()
            .ok_or_else(|| Error::UnresolvedSignal(format!("V({node})")))
    }

    fn current(&self, device: &str) -> Result<f64> {
        self.currents
            .get(&device.to_uppercase())
            .copied()
            .ok_or_else(|| Error::UnresolvedSignal(format!("I({device})")))
    }

    fn random(&self) -> f64 {
        self.rng.borrow_mut().gen_range(0.0..1.0)
    }
}
