//! Subcircuit expansion.

use log::debug;
use spicefront_core::{Netlist, Statement, SubcircuitDefinition};
use spicefront_eval::{
    Error, Evaluator, EvaluatorSettings, Instance, Result, instantiate_subcircuit,
    process_statements,
};

/// Deepest subcircuit nesting accepted before a definition is considered
/// to instantiate itself.
const MAX_NESTING: usize = 32;

/// A statement together with the instance path it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedStatement {
    /// Instance path (`"x1.x2"`), empty at the top level. Names used by the
    /// statement map to circuit-wide names through
    /// `design.scope(&scope).names()`.
    pub scope: String,
    pub statement: Statement,
}

/// A netlist with every directive applied and every instance expanded.
#[derive(Debug)]
pub struct Design {
    pub title: Option<String>,
    /// Remaining statements (components, models, analysis controls) in
    /// expansion order.
    pub statements: Vec<ScopedStatement>,
    /// Root of the scope tree; one child per subcircuit instance.
    pub evaluator: Evaluator,
}

impl Design {
    /// Scope for an instance path.
    pub fn scope(&self, path: &str) -> Result<&Evaluator> {
        self.evaluator.child(path)
    }

    /// Components in expansion order.
    pub fn components(&self) -> impl Iterator<Item = &ScopedStatement> {
        self.statements
            .iter()
            .filter(|s| matches!(s.statement, Statement::Component { .. }))
    }
}

fn is_instance(name: &str) -> bool {
    name.starts_with(['X', 'x'])
}

/// Definition visible from `statements`: local definitions shadow the
/// netlist's top-level ones.
fn find_definition<'a>(
    statements: &'a [Statement],
    netlist: &'a Netlist,
    name: &str,
) -> Option<&'a SubcircuitDefinition> {
    statements
        .iter()
        .find_map(|s| match s {
            Statement::Subcircuit(def) if def.name.eq_ignore_ascii_case(name) => Some(def),
            _ => None,
        })
        .or_else(|| netlist.subcircuit(name))
}

/// Apply the directives of `netlist` and expand its subcircuit instances.
pub fn elaborate(netlist: &Netlist, settings: EvaluatorSettings) -> Result<Design> {
    let mut evaluator = Evaluator::new(settings);
    let statements = process_statements(&mut evaluator, &netlist.statements)?;
    let mut out = Vec::with_capacity(statements.len());
    expand(netlist, &mut evaluator, &statements, &mut out, 0)?;
    debug!(
        "elaborated {} statements in {} top-level instances",
        out.len(),
        evaluator.children().len()
    );
    Ok(Design {
        title: netlist.title.clone(),
        statements: out,
        evaluator,
    })
}

fn expand(
    netlist: &Netlist,
    scope: &mut Evaluator,
    statements: &[Statement],
    out: &mut Vec<ScopedStatement>,
    depth: usize,
) -> Result<()> {
    for statement in statements {
        match statement {
            Statement::Component {
                name,
                pins_and_parameters,
                ..
            } if is_instance(name) => {
                let instance = Instance::from_parameters(name, pins_and_parameters)?;
                let definition = find_definition(statements, netlist, &instance.subcircuit)
                    .ok_or_else(|| Error::InvalidDirective {
                        directive: name.clone(),
                        message: format!("unknown subcircuit {}", instance.subcircuit),
                    })?;
                if depth >= MAX_NESTING {
                    return Err(Error::InvalidDirective {
                        directive: name.clone(),
                        message: format!("subcircuit {} nested too deeply", definition.name),
                    });
                }
                let body = instantiate_subcircuit(
                    scope,
                    name,
                    definition,
                    &instance.nodes,
                    &instance.overrides,
                )?;
                let child = scope.child_mut(name)?;
                expand(netlist, child, &body, out, depth + 1)?;
            }
            Statement::Subcircuit(_) => {}
            _ => out.push(ScopedStatement {
                scope: scope.names().prefix().to_string(),
                statement: statement.clone(),
            }),
        }
    }
    Ok(())
}
