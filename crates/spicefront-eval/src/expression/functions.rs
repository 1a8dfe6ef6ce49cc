//! Built-in and user-defined functions.

use std::f64::consts::PI;
use std::rc::Rc;

use indexmap::IndexSet;

use super::eval::Scope;
use super::{Expr, parse_expression};
use crate::error::{Error, Result};

/// Deepest nesting of user function calls before the call is treated as
/// unbounded recursion.
const MAX_CALL_DEPTH: usize = 64;

/// A user function from `.FUNC` or `.PARAM f(x) = ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Expr,
    /// Body as written.
    pub text: String,
    /// Formal parameters match body variables only in the same letter case.
    pub case_sensitive: bool,
}

impl FunctionDefinition {
    pub fn new(name: &str, parameters: &[String], body: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            parameters: parameters.to_vec(),
            body: parse_expression(body)?,
            text: body.to_string(),
            case_sensitive: false,
        })
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Position of the formal parameter `name` refers to.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| {
            if self.case_sensitive {
                p == name
            } else {
                p.eq_ignore_ascii_case(name)
            }
        })
    }

    /// Variables the body reads that are not formal parameters.
    pub fn free_variables(&self) -> IndexSet<String> {
        self.body
            .variables()
            .into_iter()
            .filter(|v| self.parameter_index(v).is_none())
            .collect()
    }

    /// Call with already evaluated arguments. Names that are not formal
    /// parameters are looked up in `scope`.
    pub fn call(&self, args: &[f64], scope: &dyn Scope) -> Result<f64> {
        if args.len() != self.parameters.len() {
            return Err(Error::Arity {
                function: self.name.clone(),
                expected: self.parameters.len().to_string(),
                found: args.len(),
            });
        }
        if scope.depth() >= MAX_CALL_DEPTH {
            return Err(Error::CyclicDependency(self.name.clone()));
        }
        let frame = Frame {
            definition: self,
            args,
            outer: scope,
        };
        self.body.eval(&frame)
    }
}

/// Argument bindings of one user function call.
struct Frame<'s> {
    definition: &'s FunctionDefinition,
    args: &'s [f64],
    outer: &'s dyn Scope,
}

impl Scope for Frame<'_> {
    fn variable(&self, name: &str) -> Result<f64> {
        match self.definition.parameter_index(name) {
            Some(i) => Ok(self.args[i]),
            None => self.outer.variable(name),
        }
    }

    fn function(&self, name: &str) -> Option<Rc<FunctionDefinition>> {
        self.outer.function(name)
    }

    fn voltage(&self, node: &str) -> Result<f64> {
        self.outer.voltage(node)
    }

    fn current(&self, device: &str) -> Result<f64> {
        self.outer.current(device)
    }

    fn random(&self) -> f64 {
        self.outer.random()
    }

    fn depth(&self) -> usize {
        self.outer.depth() + 1
    }
}

/// Evaluate a call to `name`.
///
/// `if` only evaluates the taken branch. User functions are looked up before
/// built-ins, so a netlist may shadow a built-in name.
pub(crate) fn call(name: &str, args: &[Expr], scope: &dyn Scope) -> Result<f64> {
    let lower = name.to_ascii_lowercase();
    if lower == "if" {
        check_arity(name, args.len(), 3)?;
        return if args[0].eval(scope)? != 0.0 {
            args[1].eval(scope)
        } else {
            args[2].eval(scope)
        };
    }

    let values = args
        .iter()
        .map(|a| a.eval(scope))
        .collect::<Result<Vec<f64>>>()?;

    if let Some(definition) = scope.function(name) {
        return definition.call(&values, scope);
    }

    eval_builtin(&lower, &values, scope).ok_or_else(|| Error::UnknownFunction(name.to_string()))?
}

/// True for built-ins whose result depends on more than their arguments.
pub fn is_random(name: &str) -> bool {
    matches!(name.to_ascii_lowercase().as_str(), "random" | "gauss")
}

/// True if `name` is a built-in function or special form.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name.to_ascii_lowercase().as_str())
}

const BUILTINS: &[&str] = &[
    "if", "sin", "cos", "tan", "asin", "acos", "atan", "atan2", "sinh", "cosh", "tanh", "exp",
    "log", "ln", "log10", "sqrt", "pow", "abs", "sgn", "sign", "min", "max", "limit", "u",
    "step", "uramp", "floor", "ceil", "round", "poly", "random", "gauss",
];

fn check_arity(name: &str, found: usize, expected: usize) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(Error::Arity {
            function: name.to_string(),
            expected: expected.to_string(),
            found,
        })
    }
}

/// Evaluate a built-in function, or `None` if `name` is not one.
fn eval_builtin(name: &str, args: &[f64], scope: &dyn Scope) -> Option<Result<f64>> {
    let unary = |f: fn(f64) -> f64| check_arity(name, args.len(), 1).map(|_| f(args[0]));
    let binary = |f: fn(f64, f64) -> f64| check_arity(name, args.len(), 2).map(|_| f(args[0], args[1]));

    let result = match name {
        // Trigonometric
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "asin" => unary(f64::asin),
        "acos" => unary(f64::acos),
        "atan" => unary(f64::atan),
        "atan2" => binary(f64::atan2),
        "sinh" => unary(f64::sinh),
        "cosh" => unary(f64::cosh),
        "tanh" => unary(f64::tanh),

        // Exponential/logarithmic
        "exp" => unary(f64::exp),
        "log" | "ln" => unary(|x| if x > 0.0 { x.ln() } else { -1e30 }),
        "log10" => unary(|x| if x > 0.0 { x.log10() } else { -1e30 }),
        "sqrt" => unary(|x| if x >= 0.0 { x.sqrt() } else { 0.0 }),
        "pow" => binary(f64::powf),

        // Absolute value and sign
        "abs" => unary(f64::abs),
        "sgn" | "sign" => unary(|x| {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        }),

        "min" | "max" => {
            if args.is_empty() {
                Err(Error::Arity {
                    function: name.to_string(),
                    expected: "at least 1".into(),
                    found: 0,
                })
            } else if name == "min" {
                Ok(args.iter().copied().fold(f64::INFINITY, f64::min))
            } else {
                Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            }
        }

        // limit(x, lo, hi) clamps x to [lo, hi]
        "limit" => check_arity(name, args.len(), 3).map(|_| {
            let (lo, hi) = if args[1] <= args[2] {
                (args[1], args[2])
            } else {
                (args[2], args[1])
            };
            args[0].max(lo).min(hi)
        }),

        // Step and ramp
        "u" | "step" => unary(|x| if x >= 0.0 { 1.0 } else { 0.0 }),
        "uramp" => unary(|x| if x >= 0.0 { x } else { 0.0 }),

        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "round" => unary(f64::round),

        "poly" => poly(args),

        "random" => check_arity(name, args.len(), 0).map(|_| scope.random()),
        "gauss" => check_arity(name, args.len(), 2).map(|_| {
            // Box-Muller
            let u1 = scope.random().max(1e-10);
            let u2 = scope.random();
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
            args[0] + args[1] * z
        }),

        _ => return None,
    };
    Some(result)
}

/// `poly(dim, x1..x_dim, p0, p1, ...)`.
///
/// Coefficients follow SPICE ordering: the constant term, then every
/// monomial of degree 1, degree 2 and so on, where the monomials of one
/// degree are the non-decreasing index tuples in lexicographic order
/// (`x1^2, x1*x2, x2^2` for two variables).
fn poly(args: &[f64]) -> Result<f64> {
    let arity_error = || Error::Arity {
        function: "poly".into(),
        expected: "dimension + 1 or more".into(),
        found: args.len(),
    };
    let (&dim, rest) = args.split_first().ok_or_else(arity_error)?;
    if dim < 1.0 || dim.fract() != 0.0 {
        return Err(arity_error());
    }
    let dim = dim as usize;
    if rest.len() < dim {
        return Err(arity_error());
    }

    let (xs, coefficients) = rest.split_at(dim);
    let mut coefficients = coefficients.iter();
    let Some(&constant) = coefficients.next() else {
        return Ok(0.0);
    };

    let mut sum = constant;
    let mut degree = 1;
    loop {
        let mut index = vec![0usize; degree];
        loop {
            let Some(&c) = coefficients.next() else {
                return Ok(sum);
            };
            sum += c * index.iter().map(|&i| xs[i]).product::<f64>();

            match index.iter().rposition(|&i| i + 1 < dim) {
                Some(p) => {
                    let next = index[p] + 1;
                    index[p..].fill(next);
                }
                None => break,
            }
        }
        degree += 1;
    }
}
