//! Mathematical expression parsing and evaluation for netlist parameters.
//!
//! Supports expressions like:
//! - `gain * 2 + 1k` - parameter arithmetic with SPICE suffixes
//! - `if(x > 0, 1 / x, 0)` - conditionals that only evaluate the taken branch
//! - `sin(2 * pi * 1k * time)` - free variables resolved by the caller
//! - `V(in, out) / 1k` - differential voltage
//! - `poly(1, V(1), 0, 1, 0.5)` - SPICE polynomial sources

mod ast;
mod eval;
mod functions;
mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use eval::{Scope, SignalContext};
pub use functions::{FunctionDefinition, is_builtin, is_random};
pub use parser::parse_expression;

pub(crate) use eval::apply_binary;

#[cfg(test)]
mod tests {
    use std::f64::consts::{E, PI};

    use super::*;
    use crate::error::Error;

    fn eval(text: &str) -> Result<f64, Error> {
        parse_expression(text)?.eval(&SignalContext::with_seed(1))
    }

    #[test]
    fn test_parse_constant() {
        let expr = parse_expression("42").unwrap();
        assert_eq!(expr, Expr::Constant(42.0));
    }

    #[test]
    fn test_parse_constant_with_suffix() {
        assert_eq!(eval("1k").unwrap(), 1000.0);
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2").unwrap(), 3.0);
        assert_eq!(eval("3 * 4").unwrap(), 12.0);
        assert_eq!(eval("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(eval("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(eval("-5").unwrap(), -5.0);
        assert_eq!(eval("2^3").unwrap(), 8.0);
        assert_eq!(eval("2**3**2").unwrap(), 512.0);
    }

    #[test]
    fn test_logic_and_comparison() {
        assert_eq!(eval("1 < 2").unwrap(), 1.0);
        assert_eq!(eval("2 <= 1").unwrap(), 0.0);
        assert_eq!(eval("3 == 3 && 1 != 2").unwrap(), 1.0);
        assert_eq!(eval("0 || !0").unwrap(), 1.0);
        assert_eq!(eval("1 > 2 ? 10 : 20").unwrap(), 20.0);
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("1 / 0"), Err(Error::DivisionByZero));
    }

    #[test]
    fn test_short_circuit() {
        assert_eq!(eval("if(0, 1 / 0, 7)").unwrap(), 7.0);
        assert_eq!(eval("0 && 1 / 0").unwrap(), 0.0);
        assert_eq!(eval("1 || 1 / 0").unwrap(), 1.0);
        assert_eq!(eval("1 ? 3 : 1 / 0").unwrap(), 3.0);
    }

    #[test]
    fn test_parse_voltage_reference() {
        let expr = parse_expression("V(1)").unwrap();
        let mut ctx = SignalContext::new();
        ctx.set_voltage("1", 5.0);
        assert_eq!(expr.eval(&ctx).unwrap(), 5.0);
    }

    #[test]
    fn test_parse_differential_voltage() {
        let expr = parse_expression("V(in, out)").unwrap();
        let mut ctx = SignalContext::new();
        ctx.set_voltage("in", 10.0);
        ctx.set_voltage("out", 3.0);
        assert_eq!(expr.eval(&ctx).unwrap(), 7.0);
    }

    #[test]
    fn test_parse_current_reference() {
        let expr = parse_expression("I(V1)").unwrap();
        let mut ctx = SignalContext::new();
        ctx.set_current("V1", 0.001);
        assert_eq!(expr.eval(&ctx).unwrap(), 0.001);
    }

    #[test]
    fn test_missing_signal() {
        let err = parse_expression("V(nowhere)")
            .unwrap()
            .eval(&SignalContext::new())
            .unwrap_err();
        assert_eq!(err, Error::UnresolvedSignal("V(nowhere)".into()));
    }

    #[test]
    fn test_time_is_a_free_variable() {
        let expr = parse_expression("time * 2").unwrap();
        let mut ctx = SignalContext::new();
        ctx.set_time(0.5);
        assert_eq!(expr.eval(&ctx).unwrap(), 1.0);
        assert!(matches!(
            expr.eval(&SignalContext::new()),
            Err(Error::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_functions() {
        assert!((eval("sin(0)").unwrap() - 0.0).abs() < 1e-10);
        assert!((eval("exp(1)").unwrap() - E).abs() < 1e-10);
        assert_eq!(eval("pi").unwrap(), PI);
        assert_eq!(eval("max(1, 5, 3)").unwrap(), 5.0);
        assert_eq!(eval("limit(5, 0, 2)").unwrap(), 2.0);
        assert_eq!(eval("uramp(-1) + u(0)").unwrap(), 1.0);
        assert_eq!(eval("poly(1, 2, 1, 2, 3)").unwrap(), 17.0);
    }

    #[test]
    fn test_function_errors() {
        assert_eq!(
            eval("nosuch(1)"),
            Err(Error::UnknownFunction("nosuch".into()))
        );
        assert!(matches!(eval("sin(1, 2)"), Err(Error::Arity { found: 2, .. })));
        assert!(matches!(eval("if(1, 2)"), Err(Error::Arity { .. })));
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let expr = parse_expression("random() + gauss(0, 1)").unwrap();
        let a = expr.eval(&SignalContext::with_seed(7)).unwrap();
        let b = expr.eval(&SignalContext::with_seed(7)).unwrap();
        assert_eq!(a, b);
        let r = eval("random()").unwrap();
        assert!((0.0..1.0).contains(&r));
    }

    #[test]
    fn test_complex_expression() {
        let expr = parse_expression("V(1) * 2 + sin(pi / 2)").unwrap();
        let mut ctx = SignalContext::new();
        ctx.set_voltage("1", 5.0);
        assert!((expr.eval(&ctx).unwrap() - 11.0).abs() < 1e-10);
    }

    #[test]
    fn test_references() {
        let expr = parse_expression("a * f(b, V(1)) + V(2, 3) + I(V1) + a").unwrap();
        let variables: Vec<String> = expr.variables().into_iter().collect();
        assert_eq!(variables, vec!["a", "b"]);
        assert!(expr.functions().contains("f"));
        assert_eq!(expr.voltage_nodes(), vec!["1", "2", "3"]);
        assert_eq!(expr.current_sources(), vec!["V1"]);
        assert!(expr.has_voltage_or_current());
    }
}
