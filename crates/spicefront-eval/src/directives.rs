//! Applying netlist directives to a scope tree.
//!
//! `.PARAM` and `.FUNC` statements update the scope they appear in,
//! `.IF`/`.ELSEIF`/`.ELSE`/`.ENDIF` blocks are reduced to the branch whose
//! condition holds at that point, and subcircuit instances get a child scope
//! of their own.

use log::debug;
use spicefront_core::{Parameter, Statement, SubcircuitDefinition};

use crate::error::{Error, Result};
use crate::evaluator::Evaluator;

fn invalid(directive: &str, message: impl Into<String>) -> Error {
    Error::InvalidDirective {
        directive: directive.to_string(),
        message: message.into(),
    }
}

fn control_name(statement: &Statement) -> Option<&str> {
    match statement {
        Statement::Control { name, .. } => Some(name),
        _ => None,
    }
}

fn is_control(statement: &Statement, keyword: &str) -> bool {
    control_name(statement).is_some_and(|n| n.eq_ignore_ascii_case(keyword))
}

/// Apply the assignments of a `.PARAM` statement in order.
///
/// `name=value` binds a parameter; `name(args)=body` defines a function.
pub fn apply_param(evaluator: &mut Evaluator, parameters: &[Parameter]) -> Result<()> {
    for parameter in parameters {
        match parameter.as_assignment() {
            Some((name, [], value)) => evaluator.set_parameter(name, value)?,
            Some((name, arguments, body)) => evaluator.define_function(name, arguments, body)?,
            None => {
                return Err(invalid(
                    "PARAM",
                    format!("expected an assignment, found {}", parameter.image()),
                ));
            }
        }
    }
    Ok(())
}

/// Apply a `.FUNC` statement: `name(args) = body` or `name(args) {body}`.
pub fn apply_func(evaluator: &mut Evaluator, parameters: &[Parameter]) -> Result<()> {
    match parameters {
        [Parameter::Assignment {
            name,
            arguments,
            value,
        }] => evaluator.define_function(name, arguments, value),
        [
            Parameter::Bracket { name, parameters },
            Parameter::Expression(body),
        ] => {
            let arguments = parameters
                .iter()
                .map(|p| {
                    p.text()
                        .map(str::to_string)
                        .ok_or_else(|| invalid("FUNC", format!("bad argument {}", p.image())))
                })
                .collect::<Result<Vec<String>>>()?;
            evaluator.define_function(name, &arguments, body)
        }
        _ => Err(invalid("FUNC", "expected name(arguments) = body")),
    }
}

/// One arm of a conditional block; `condition` is `None` for `.ELSE`.
struct Branch<'s> {
    condition: Option<&'s str>,
    body: &'s [Statement],
}

/// Split the block opened by `statements[0]` (an `.IF`) into its branches.
/// Also returns the number of statements the block spans, `.ENDIF` included.
fn conditional_block(statements: &[Statement]) -> Result<(Vec<Branch<'_>>, usize)> {
    let mut branches = Vec::new();
    let mut condition = Some(condition_text(&statements[0])?);
    let mut start = 1;
    let mut depth = 0usize;
    let mut seen_else = false;

    for (i, statement) in statements.iter().enumerate().skip(1) {
        let Some(name) = control_name(statement) else {
            continue;
        };
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "if" => depth += 1,
            "endif" if depth > 0 => depth -= 1,
            "elseif" | "else" | "endif" if depth == 0 => {
                if seen_else && name != "endif" {
                    return Err(invalid(&name, "follows .ELSE"));
                }
                branches.push(Branch {
                    condition: condition.take(),
                    body: &statements[start..i],
                });
                start = i + 1;
                match name.as_str() {
                    "elseif" => condition = Some(condition_text(statement)?),
                    "else" => seen_else = true,
                    _ => return Ok((branches, i + 1)),
                }
            }
            _ => {}
        }
    }
    Err(invalid(
        "IF",
        format!("block opened on line {} has no .ENDIF", statements[0].line()),
    ))
}

fn condition_text(statement: &Statement) -> Result<&str> {
    match statement {
        Statement::Control { name, parameters, .. } => parameters
            .first()
            .and_then(Parameter::text)
            .ok_or_else(|| invalid(name, "missing condition")),
        _ => Err(invalid("IF", "not a conditional statement")),
    }
}

/// Body of the first branch whose condition is non-zero, if any.
fn select<'s>(evaluator: &Evaluator, branches: &[Branch<'s>]) -> Result<&'s [Statement]> {
    for branch in branches {
        let taken = match branch.condition {
            Some(text) => evaluator.evaluate_double(text)? != 0.0,
            None => true,
        };
        if taken {
            return Ok(branch.body);
        }
    }
    Ok(&[])
}

fn stray(statement: &Statement) -> Option<Error> {
    ["elseif", "else", "endif"]
        .into_iter()
        .find(|k| is_control(statement, k))
        .map(|k| invalid(k, format!("without .IF on line {}", statement.line())))
}

/// Replace every conditional block by the statements of its taken branch,
/// evaluating conditions against the current state of `evaluator`.
pub fn flatten_conditionals(evaluator: &Evaluator, statements: &[Statement]) -> Result<Vec<Statement>> {
    let mut out = Vec::with_capacity(statements.len());
    let mut i = 0;
    while i < statements.len() {
        let statement = &statements[i];
        if is_control(statement, "if") {
            let (branches, span) = conditional_block(&statements[i..])?;
            out.extend(flatten_conditionals(evaluator, select(evaluator, &branches)?)?);
            i += span;
            continue;
        }
        if let Some(err) = stray(statement) {
            return Err(err);
        }
        out.push(statement.clone());
        i += 1;
    }
    Ok(out)
}

/// Apply `.PARAM`/`.FUNC` directives and conditional blocks in source order
/// and return the remaining statements.
///
/// Conditions see every assignment made before them, and assignments inside
/// an untaken branch are skipped.
pub fn process_statements(evaluator: &mut Evaluator, statements: &[Statement]) -> Result<Vec<Statement>> {
    let mut out = Vec::with_capacity(statements.len());
    process_into(evaluator, statements, &mut out)?;
    Ok(out)
}

fn process_into(evaluator: &mut Evaluator, statements: &[Statement], out: &mut Vec<Statement>) -> Result<()> {
    let mut i = 0;
    while i < statements.len() {
        let statement = &statements[i];
        i += 1;
        match statement {
            Statement::Control { name, parameters, .. } if name.eq_ignore_ascii_case("param") => {
                apply_param(evaluator, parameters)?;
            }
            Statement::Control { name, parameters, .. } if name.eq_ignore_ascii_case("func") => {
                apply_func(evaluator, parameters)?;
            }
            Statement::Control { name, .. } if name.eq_ignore_ascii_case("if") => {
                let (branches, span) = conditional_block(&statements[i - 1..])?;
                let body = select(evaluator, &branches)?;
                process_into(evaluator, body, out)?;
                i += span - 1;
            }
            _ => {
                if let Some(err) = stray(statement) {
                    return Err(err);
                }
                out.push(statement.clone());
            }
        }
    }
    Ok(())
}

/// Parts of a subcircuit instance line (`X1 in out amp gain=2`).
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub nodes: Vec<String>,
    pub subcircuit: String,
    pub overrides: Vec<Parameter>,
}

impl Instance {
    /// Split the parameters of an `X` component: nodes, then the subcircuit
    /// name, then optional `params:` and assignments.
    pub fn from_parameters(name: &str, pins_and_parameters: &[Parameter]) -> Result<Self> {
        let split = pins_and_parameters
            .iter()
            .position(|p| p.as_assignment().is_some() || p.is_params_marker())
            .unwrap_or(pins_and_parameters.len());
        let (positional, rest) = pins_and_parameters.split_at(split);

        let mut words = positional
            .iter()
            .map(|p| {
                p.text()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(name, format!("unexpected {}", p.image())))
            })
            .collect::<Result<Vec<String>>>()?;
        let subcircuit = words
            .pop()
            .ok_or_else(|| invalid(name, "missing subcircuit name"))?;

        Ok(Self {
            nodes: words,
            subcircuit,
            overrides: rest
                .iter()
                .filter(|p| !p.is_params_marker())
                .cloned()
                .collect(),
        })
    }
}

/// Create the scope for instance `instance` of `definition` under `parent`
/// and return the body statements that remain after its directives ran.
///
/// Instance overrides are evaluated in `parent`; defaults are evaluated in
/// the new scope and may refer to each other and to parent parameters.
/// The new scope is reachable as `parent.child(instance)`.
pub fn instantiate_subcircuit(
    parent: &mut Evaluator,
    instance: &str,
    definition: &SubcircuitDefinition,
    nodes: &[String],
    overrides: &[Parameter],
) -> Result<Vec<Statement>> {
    if nodes.len() != definition.pins.len() {
        return Err(invalid(
            instance,
            format!(
                "subcircuit {} has {} pins, {} nodes given",
                definition.name,
                definition.pins.len(),
                nodes.len()
            ),
        ));
    }

    let mut values = Vec::with_capacity(overrides.len());
    for parameter in overrides {
        let Some((name, [], value)) = parameter.as_assignment() else {
            return Err(invalid(instance, format!("bad override {}", parameter.image())));
        };
        values.push((name, parent.evaluate_double(value)?));
    }

    let names = parent.names().nested(instance, &definition.pins, nodes);
    debug!(
        "instantiating {} as {:?} with {} overrides",
        definition.name,
        names.prefix(),
        values.len()
    );
    let child = parent.create_child_evaluator(instance, names);
    for parameter in &definition.default_parameters {
        let Some((name, [], value)) = parameter.as_assignment() else {
            return Err(invalid(&definition.name, format!("bad default {}", parameter.image())));
        };
        child.set_parameter(name, value)?;
    }
    for (name, value) in values {
        child.set_parameter_value(name, value)?;
    }
    process_statements(child, &definition.statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::EvaluatorSettings;

    fn control(name: &str, parameters: Vec<Parameter>) -> Statement {
        Statement::Control {
            name: name.into(),
            parameters,
            line: 1,
        }
    }

    fn assign(name: &str, value: &str) -> Parameter {
        Parameter::Assignment {
            name: name.into(),
            arguments: vec![],
            value: value.into(),
        }
    }

    fn condition(text: &str) -> Vec<Parameter> {
        vec![Parameter::Expression(text.into())]
    }

    fn comment(text: &str) -> Statement {
        Statement::Comment {
            text: text.into(),
            line: 1,
        }
    }

    fn texts(statements: &[Statement]) -> Vec<&str> {
        statements
            .iter()
            .filter_map(|s| match s {
                Statement::Comment { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_param_and_func() {
        let mut evaluator = Evaluator::new(EvaluatorSettings::default());
        apply_param(
            &mut evaluator,
            &[
                assign("a", "2"),
                assign("b", "a*3"),
                Parameter::Assignment {
                    name: "twice".into(),
                    arguments: vec!["x".into()],
                    value: "2*x".into(),
                },
            ],
        )
        .unwrap();
        apply_func(
            &mut evaluator,
            &[
                Parameter::Bracket {
                    name: "inc".into(),
                    parameters: vec![Parameter::Word("y".into())],
                },
                Parameter::Expression("y+1".into()),
            ],
        )
        .unwrap();
        assert_eq!(evaluator.evaluate_double("inc(twice(b))").unwrap(), 13.0);

        assert!(matches!(
            apply_param(&mut evaluator, &[Parameter::Value("1".into())]),
            Err(Error::InvalidDirective { .. })
        ));
    }

    #[test]
    fn test_conditionals_follow_assignment_order() {
        let statements = vec![
            control("param", vec![assign("mode", "2")]),
            control("if", condition("mode == 1")),
            comment("one"),
            control("elseif", condition("mode == 2")),
            comment("two"),
            control("if", condition("mode > 5")),
            comment("nested"),
            control("else", vec![]),
            comment("nested else"),
            control("endif", vec![]),
            control("else", vec![]),
            comment("other"),
            control("endif", vec![]),
            comment("after"),
        ];
        let mut evaluator = Evaluator::default();
        let rest = process_statements(&mut evaluator, &statements).unwrap();
        assert_eq!(texts(&rest), vec!["two", "nested else", "after"]);
    }

    #[test]
    fn test_untaken_branch_assignments_are_skipped() {
        let statements = vec![
            control("if", condition("0")),
            control("param", vec![assign("x", "1")]),
            control("else", vec![]),
            control("param", vec![assign("x", "2")]),
            control("endif", vec![]),
        ];
        let mut evaluator = Evaluator::default();
        process_statements(&mut evaluator, &statements).unwrap();
        assert_eq!(evaluator.evaluate_double("x").unwrap(), 2.0);
    }

    #[test]
    fn test_flatten_without_match() {
        let mut evaluator = Evaluator::default();
        evaluator.set_parameter_value("a", 0.0).unwrap();
        let statements = vec![
            control("if", condition("a")),
            comment("skipped"),
            control("endif", vec![]),
        ];
        assert!(flatten_conditionals(&evaluator, &statements).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_blocks() {
        let evaluator = Evaluator::default();
        let unterminated = vec![control("if", condition("1")), comment("x")];
        assert!(matches!(
            flatten_conditionals(&evaluator, &unterminated),
            Err(Error::InvalidDirective { .. })
        ));

        let stray = vec![control("endif", vec![])];
        assert!(flatten_conditionals(&evaluator, &stray).is_err());

        let late_elseif = vec![
            control("if", condition("1")),
            control("else", vec![]),
            control("elseif", condition("1")),
            control("endif", vec![]),
        ];
        assert!(flatten_conditionals(&evaluator, &late_elseif).is_err());
    }

    #[test]
    fn test_instance_parameters() {
        let instance = Instance::from_parameters(
            "X1",
            &[
                Parameter::Value("1".into()),
                Parameter::Word("out".into()),
                Parameter::Word("amp".into()),
                Parameter::Word("params:".into()),
                assign("gain", "5"),
            ],
        )
        .unwrap();
        assert_eq!(instance.nodes, vec!["1", "out"]);
        assert_eq!(instance.subcircuit, "amp");
        assert_eq!(instance.overrides, vec![assign("gain", "5")]);

        assert!(Instance::from_parameters("X2", &[assign("a", "1")]).is_err());
    }

    #[test]
    fn test_instantiate_subcircuit() {
        let definition = SubcircuitDefinition {
            name: "amp".into(),
            pins: vec!["in".into(), "out".into()],
            default_parameters: vec![assign("gain", "10"), assign("load", "gain*1k")],
            statements: vec![
                control("param", vec![assign("half", "load/2")]),
                comment("body"),
            ],
            line: 1,
        };

        let mut root = Evaluator::default();
        root.set_parameter_value("g", 3.0).unwrap();
        let body = instantiate_subcircuit(
            &mut root,
            "x1",
            &definition,
            &["a".into(), "b".into()],
            &[assign("gain", "g*2")],
        )
        .unwrap();
        assert_eq!(texts(&body), vec!["body"]);

        let x1 = root.child("x1").unwrap();
        assert_eq!(x1.evaluate_double("half").unwrap(), 3000.0);
        assert_eq!(x1.names().node("out"), "b");
        assert!(!root.has_parameter("gain"));

        instantiate_subcircuit(&mut root, "x2", &definition, &["a".into(), "c".into()], &[])
            .unwrap();
        assert_eq!(root.child("x2").unwrap().evaluate_double("half").unwrap(), 5000.0);
        assert_eq!(root.child("x1").unwrap().evaluate_double("half").unwrap(), 3000.0);

        assert!(matches!(
            instantiate_subcircuit(&mut root, "x3", &definition, &["a".into()], &[]),
            Err(Error::InvalidDirective { .. })
        ));
    }
}
