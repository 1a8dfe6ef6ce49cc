//! Parameter scopes with dependency tracking.
//!
//! An [`Evaluator`] owns the parameter bindings of one scope: the top level
//! of a netlist or one subcircuit instance. Parameters are either constants
//! or cached expressions that are recomputed lazily after anything they read
//! changes. Child scopes start with a copy of their parent's bindings, see
//! their parent's functions, and receive later parent assignments unless they
//! have overridden the parameter themselves.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::expression::{Expr, FunctionDefinition, Scope, is_builtin, is_random, parse_expression};
use crate::names::ScopeNames;
use crate::registry::{DependencyRegistry, Dependent};
use crate::settings::EvaluatorSettings;

/// Deepest nesting of user functions inlined by [`Evaluator::resolve`].
const MAX_INLINE_DEPTH: usize = 64;

/// Callback run with `(old, new)` whenever a named expression is recomputed.
pub type ChangeAction = Rc<dyn Fn(f64, f64)>;

/// Where a scope's binding for a parameter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Copied from the parent scope; replaced when the parent reassigns it.
    Inherited,
    /// Assigned in this scope.
    Local,
}

/// Expression with a lazily computed, invalidatable value.
#[derive(Debug)]
struct CachedExpression {
    text: String,
    expr: Expr,
    value: Cell<Option<f64>>,
    evaluating: Cell<bool>,
}

impl Clone for CachedExpression {
    fn clone(&self) -> Self {
        Self::new(self.text.clone(), self.expr.clone())
    }
}

impl CachedExpression {
    fn new(text: String, expr: Expr) -> Self {
        Self {
            text,
            expr,
            value: Cell::new(None),
            evaluating: Cell::new(false),
        }
    }

    fn value(&self, key: &str, scope: &dyn Scope) -> Result<f64> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        if self.evaluating.replace(true) {
            return Err(Error::CyclicDependency(key.to_string()));
        }
        let result = self.expr.eval(scope);
        self.evaluating.set(false);
        let value = result?;
        self.value.set(Some(value));
        Ok(value)
    }
}

#[derive(Debug, Clone)]
enum ParameterExpression {
    Constant(f64),
    Cached(CachedExpression),
}

impl ParameterExpression {
    fn parse(text: &str) -> Result<Self> {
        let text = strip_delimiters(text);
        Ok(match parse_expression(text)? {
            Expr::Constant(value) => ParameterExpression::Constant(value),
            expr => ParameterExpression::Cached(CachedExpression::new(text.to_string(), expr)),
        })
    }

    fn expr(&self) -> Option<&Expr> {
        match self {
            ParameterExpression::Constant(_) => None,
            ParameterExpression::Cached(cached) => Some(&cached.expr),
        }
    }

    fn text(&self) -> String {
        match self {
            ParameterExpression::Constant(value) => value.to_string(),
            ParameterExpression::Cached(cached) => cached.text.clone(),
        }
    }

    fn invalidate(&self) {
        if let ParameterExpression::Cached(cached) = self {
            cached.value.set(None);
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    expression: ParameterExpression,
    origin: Origin,
}

#[derive(Clone)]
struct NamedExpression {
    text: String,
    expr: Expr,
    value: f64,
    actions: Vec<ChangeAction>,
}

/// User functions of one scope; lookups fall back to the enclosing scope.
#[derive(Debug, Default)]
struct FunctionTable {
    functions: RefCell<HashMap<String, Rc<FunctionDefinition>>>,
    parent: Option<Rc<FunctionTable>>,
}

impl FunctionTable {
    fn child_of(parent: Rc<FunctionTable>) -> Self {
        Self {
            functions: RefCell::new(HashMap::new()),
            parent: Some(parent),
        }
    }

    fn lookup(&self, key: &str) -> Option<Rc<FunctionDefinition>> {
        if let Some(definition) = self.functions.borrow().get(key) {
            return Some(Rc::clone(definition));
        }
        self.parent.as_ref()?.lookup(key)
    }
}

/// Remove one level of `{...}` or `'...'` around expression text.
pub fn strip_delimiters(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .or_else(|| text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')));
    inner.map_or(text, str::trim)
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// A parameter scope.
pub struct Evaluator {
    name: String,
    names: ScopeNames,
    settings: EvaluatorSettings,
    seed_origin: Origin,
    rng: RefCell<StdRng>,
    parameters: IndexMap<String, Binding>,
    expressions: IndexMap<String, NamedExpression>,
    registry: DependencyRegistry,
    functions: Rc<FunctionTable>,
    children: Vec<Evaluator>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(EvaluatorSettings::default())
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("name", &self.name)
            .field("prefix", &self.names.prefix())
            .field("parameters", &self.parameters.keys().collect::<Vec<_>>())
            .field("expressions", &self.expressions.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .finish()
    }
}

impl Evaluator {
    /// Create a top-level scope.
    pub fn new(settings: EvaluatorSettings) -> Self {
        Self {
            name: String::new(),
            names: ScopeNames::root(),
            rng: RefCell::new(rng_for(settings.seed)),
            seed_origin: Origin::Local,
            settings,
            parameters: IndexMap::new(),
            expressions: IndexMap::new(),
            registry: DependencyRegistry::new(),
            functions: Rc::new(FunctionTable::default()),
            children: Vec::new(),
        }
    }

    /// Instance name; empty for a top-level scope.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn names(&self) -> &ScopeNames {
        &self.names
    }

    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    pub fn children(&self) -> &[Evaluator] {
        &self.children
    }

    fn parameter_key(&self, name: &str) -> String {
        if self.settings.case_sensitive_parameters {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    fn function_key(&self, name: &str) -> String {
        if self.settings.case_sensitive_functions {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    // ---- seeding ----

    pub fn seed(&self) -> Option<u64> {
        self.settings.seed
    }

    /// Reseed this scope. Children that never set their own seed follow.
    /// Cached parameter values are dropped so that `random()` draws again,
    /// and named expressions are recomputed with their actions fired.
    ///
    /// Every scope is reseeded even if a recomputation fails; the first
    /// failure is returned.
    pub fn set_seed(&mut self, seed: Option<u64>) -> Result<()> {
        self.apply_seed(seed, Origin::Local)
    }

    fn apply_seed(&mut self, seed: Option<u64>, origin: Origin) -> Result<()> {
        self.settings.seed = seed;
        self.seed_origin = origin;
        *self.rng.get_mut() = rng_for(seed);
        for binding in self.parameters.values() {
            binding.expression.invalidate();
        }
        let keys: Vec<String> = self.expressions.keys().cloned().collect();
        let mut result = self.recompute_expressions(&keys);
        for child in &mut self.children {
            if child.seed_origin == Origin::Inherited {
                result = result.and(child.apply_seed(seed, Origin::Inherited));
            }
        }
        result
    }

    // ---- parameters ----

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(&self.parameter_key(name))
    }

    /// Parameter keys in definition order.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    pub fn parameter_origin(&self, name: &str) -> Option<Origin> {
        self.parameters
            .get(&self.parameter_key(name))
            .map(|b| b.origin)
    }

    /// Expression text a parameter is bound to.
    pub fn parameter_text(&self, name: &str) -> Option<String> {
        self.parameters
            .get(&self.parameter_key(name))
            .map(|b| b.expression.text())
    }

    /// Bind `name` to a constant.
    pub fn set_parameter_value(&mut self, name: &str, value: f64) -> Result<()> {
        self.assign(name, ParameterExpression::Constant(value), Origin::Local)
    }

    /// Bind `name` to expression text, e.g. `"a*3"` or `"{a*3}"`.
    ///
    /// The expression is evaluated lazily. Everything that reads `name` is
    /// invalidated and named expressions depending on it are recomputed.
    pub fn set_parameter(&mut self, name: &str, text: &str) -> Result<()> {
        let expression = ParameterExpression::parse(text)?;
        self.assign(name, expression, Origin::Local)
    }

    fn assign(&mut self, name: &str, expression: ParameterExpression, origin: Origin) -> Result<()> {
        let key = self.parameter_key(name);
        let reads = expression
            .expr()
            .map(|e| self.reads(e))
            .unwrap_or_default();
        self.registry
            .set(Dependent::Parameter(key.clone()), reads);
        self.parameters.insert(
            key.clone(),
            Binding {
                expression: expression.clone(),
                origin,
            },
        );
        // The new value reaches every child even when a dependent
        // expression fails to evaluate; the first failure is returned.
        let mut result = self.refresh(&key);
        for child in &mut self.children {
            result = result.and(child.inherit(name, &expression));
        }
        result
    }

    /// Take a parent's assignment unless this scope overrides `name`.
    fn inherit(&mut self, name: &str, expression: &ParameterExpression) -> Result<()> {
        let key = self.parameter_key(name);
        if self
            .parameters
            .get(&key)
            .is_some_and(|b| b.origin == Origin::Local)
        {
            return Ok(());
        }
        self.assign(name, expression.clone(), Origin::Inherited)
    }

    /// Invalidate everything downstream of `key` and recompute the named
    /// expressions among it.
    fn refresh(&mut self, key: &str) -> Result<()> {
        let affected = self.registry.affected(key);
        if affected.is_empty() {
            return Ok(());
        }
        debug!(
            "scope {:?}: {key} changed, refreshing {} dependents",
            self.names.prefix(),
            affected.len()
        );

        for dependency in &affected {
            if let Dependent::Parameter(name) = dependency {
                if let Some(binding) = self.parameters.get(name) {
                    binding.expression.invalidate();
                }
            }
        }
        let expressions: Vec<String> = affected
            .into_iter()
            .filter_map(|dependency| match dependency {
                Dependent::Expression(name) => Some(name),
                Dependent::Parameter(_) => None,
            })
            .collect();
        self.recompute_expressions(&expressions)
    }

    /// Parameter keys read by `expr`, including those read by the user
    /// functions it calls.
    fn reads(&self, expr: &Expr) -> IndexSet<String> {
        let mut reads = IndexSet::new();
        let mut visited = HashSet::new();
        self.collect_reads(expr, &[], &mut reads, &mut visited);
        reads
    }

    fn collect_reads(
        &self,
        expr: &Expr,
        bound: &[String],
        reads: &mut IndexSet<String>,
        visited: &mut HashSet<String>,
    ) {
        for variable in expr.variables() {
            if !self.is_bound(bound, &variable) {
                reads.insert(self.parameter_key(&variable));
            }
        }
        for function in expr.functions() {
            let key = self.function_key(&function);
            if !visited.insert(key.clone()) {
                continue;
            }
            if let Some(definition) = self.functions.lookup(&key) {
                self.collect_reads(&definition.body, &definition.parameters, reads, visited);
            }
        }
    }

    /// Whether `name` refers to one of the formal parameters in `bound`.
    fn is_bound(&self, bound: &[String], name: &str) -> bool {
        let key = self.parameter_key(name);
        bound.iter().any(|b| self.parameter_key(b) == key)
    }

    fn parameter_value(&self, key: &str) -> Option<Result<f64>> {
        let binding = self.parameters.get(key)?;
        Some(match &binding.expression {
            ParameterExpression::Constant(value) => Ok(*value),
            ParameterExpression::Cached(cached) => cached.value(key, self),
        })
    }

    /// Value of a parameter, or of ad-hoc expression text.
    pub fn evaluate_double(&self, text: &str) -> Result<f64> {
        let text = strip_delimiters(text);
        if let Some(value) = self.parameter_value(&self.parameter_key(text)) {
            return value;
        }
        parse_expression(text)?.eval(self)
    }

    /// Parameters `text` refers to, whether or not they exist yet.
    ///
    /// Never fails: malformed text yields an empty set.
    pub fn parameters_from_expression(&self, text: &str) -> IndexSet<String> {
        match parse_expression(strip_delimiters(text)) {
            Ok(expr) => self.reads(&expr),
            Err(err) => {
                debug!("no dependencies discovered in {text:?}: {err}");
                IndexSet::new()
            }
        }
    }

    // ---- named expressions ----

    /// Register an expression that is kept up to date as parameters change.
    /// Returns its current value.
    pub fn set_named_expression(&mut self, name: &str, text: &str) -> Result<f64> {
        let text = strip_delimiters(text);
        let expr = parse_expression(text)?;
        let value = expr.eval(self)?;
        let key = self.parameter_key(name);
        let reads = self.reads(&expr);
        self.registry
            .set(Dependent::Expression(key.clone()), reads);

        let actions = self
            .expressions
            .shift_remove(&key)
            .map(|e| e.actions)
            .unwrap_or_default();
        self.expressions.insert(
            key,
            NamedExpression {
                text: text.to_string(),
                expr,
                value,
                actions,
            },
        );
        Ok(value)
    }

    /// Like [`set_named_expression`](Self::set_named_expression), and call
    /// `action(old, new)` every time a parameter change recomputes it.
    pub fn add_action(
        &mut self,
        name: &str,
        text: &str,
        action: impl Fn(f64, f64) + 'static,
    ) -> Result<f64> {
        let value = self.set_named_expression(name, text)?;
        let key = self.parameter_key(name);
        if let Some(expression) = self.expressions.get_mut(&key) {
            expression.actions.push(Rc::new(action));
        }
        Ok(value)
    }

    pub fn expression_names(&self) -> impl Iterator<Item = &str> {
        self.expressions.keys().map(String::as_str)
    }

    pub fn expression_value(&self, name: &str) -> Option<f64> {
        self.expressions
            .get(&self.parameter_key(name))
            .map(|e| e.value)
    }

    pub fn expression_text(&self, name: &str) -> Option<&str> {
        self.expressions
            .get(&self.parameter_key(name))
            .map(|e| e.text.as_str())
    }

    pub fn remove_expression(&mut self, name: &str) -> bool {
        let key = self.parameter_key(name);
        self.registry.remove(&Dependent::Expression(key.clone()));
        self.expressions.shift_remove(&key).is_some()
    }

    fn recompute_expression(&mut self, key: &str) -> Result<()> {
        let Some(expression) = self.expressions.get(key) else {
            return Ok(());
        };
        let new = expression.expr.eval(self)?;
        let Some(expression) = self.expressions.get_mut(key) else {
            return Ok(());
        };
        let old = std::mem::replace(&mut expression.value, new);
        let actions = expression.actions.clone();
        for action in actions {
            action(old, new);
        }
        Ok(())
    }

    /// Recompute each of `keys`, carrying on past failures. Returns the
    /// first failure.
    fn recompute_expressions(&mut self, keys: &[String]) -> Result<()> {
        let mut result = Ok(());
        for key in keys {
            result = result.and(self.recompute_expression(key));
        }
        result
    }

    // ---- functions ----

    /// Define `name(parameters) = body`. Visible here and in every
    /// descendant scope, including ones created earlier.
    pub fn define_function(&mut self, name: &str, parameters: &[String], body: &str) -> Result<()> {
        let definition = FunctionDefinition::new(name, parameters, strip_delimiters(body))?
            .with_case_sensitive(self.settings.case_sensitive_parameters);
        let key = self.function_key(name);
        self.functions
            .functions
            .borrow_mut()
            .insert(key, Rc::new(definition));
        self.rebuild()
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.lookup(&self.function_key(name)).is_some()
    }

    /// Recompute every dependency edge and value after a function changed.
    fn rebuild(&mut self) -> Result<()> {
        let mut edges = Vec::new();
        for (key, binding) in &self.parameters {
            binding.expression.invalidate();
            if let Some(expr) = binding.expression.expr() {
                edges.push((Dependent::Parameter(key.clone()), self.reads(expr)));
            }
        }
        for (key, expression) in &self.expressions {
            edges.push((Dependent::Expression(key.clone()), self.reads(&expression.expr)));
        }
        for (dependency, reads) in edges {
            self.registry.set(dependency, reads);
        }

        let keys: Vec<String> = self.expressions.keys().cloned().collect();
        let mut result = self.recompute_expressions(&keys);
        for child in &mut self.children {
            result = result.and(child.rebuild());
        }
        result
    }

    // ---- scope tree ----

    /// Create a scope for subcircuit instance `name`, replacing any existing
    /// child of that name.
    ///
    /// The child starts with an independent copy of this scope's parameters
    /// (marked [`Origin::Inherited`]), sees this scope's functions and
    /// inherits its seed.
    pub fn create_child_evaluator(&mut self, name: &str, names: ScopeNames) -> &mut Evaluator {
        let mut registry = DependencyRegistry::new();
        for key in self.parameters.keys() {
            let dependency = Dependent::Parameter(key.clone());
            let reads: IndexSet<String> = self.registry.dependencies(&dependency).cloned().collect();
            registry.set(dependency, reads);
        }

        let child = Evaluator {
            name: name.to_string(),
            names,
            settings: self.settings.clone(),
            seed_origin: Origin::Inherited,
            rng: RefCell::new(rng_for(self.settings.seed)),
            parameters: self
                .parameters
                .iter()
                .map(|(key, binding)| {
                    let binding = Binding {
                        expression: binding.expression.clone(),
                        origin: Origin::Inherited,
                    };
                    (key.clone(), binding)
                })
                .collect(),
            expressions: IndexMap::new(),
            registry,
            functions: Rc::new(FunctionTable::child_of(Rc::clone(&self.functions))),
            children: Vec::new(),
        };
        debug!(
            "created scope {:?} with {} inherited parameters",
            child.names.prefix(),
            child.parameters.len()
        );

        self.children.retain(|c| !c.name.eq_ignore_ascii_case(name));
        self.children.push(child);
        let index = self.children.len() - 1;
        &mut self.children[index]
    }

    /// Find a descendant by dotted path (`"x1.x2"`). The path may start with
    /// this scope's own name, and an empty path is this scope.
    pub fn find_child_evaluator(&self, path: &str) -> Option<&Evaluator> {
        let mut scope = self;
        for segment in self.path_segments(path) {
            scope = scope
                .children
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(segment))?;
        }
        Some(scope)
    }

    pub fn find_child_evaluator_mut(&mut self, path: &str) -> Option<&mut Evaluator> {
        let segments: Vec<String> = self.path_segments(path).map(str::to_string).collect();
        let mut scope = self;
        for segment in &segments {
            scope = scope
                .children
                .iter_mut()
                .find(|c| c.name.eq_ignore_ascii_case(segment))?;
        }
        Some(scope)
    }

    /// Like [`find_child_evaluator`](Self::find_child_evaluator), failing
    /// with [`Error::UnknownScope`].
    pub fn child(&self, path: &str) -> Result<&Evaluator> {
        self.find_child_evaluator(path)
            .ok_or_else(|| Error::UnknownScope(path.to_string()))
    }

    pub fn child_mut(&mut self, path: &str) -> Result<&mut Evaluator> {
        self.find_child_evaluator_mut(path)
            .ok_or_else(|| Error::UnknownScope(path.to_string()))
    }

    fn path_segments<'p>(&self, path: &'p str) -> impl Iterator<Item = &'p str> {
        let mut segments = path.split('.').filter(|s| !s.is_empty()).peekable();
        let own_name = !self.name.is_empty()
            && segments
                .peek()
                .is_some_and(|s| s.eq_ignore_ascii_case(&self.name));
        if own_name {
            segments.next();
        }
        segments
    }

    /// Copy this scope. A deep copy includes all descendants; a shallow one
    /// has no children.
    ///
    /// Parameter slots and caches are never shared with the original.
    /// Function definitions are shared because they are immutable. Named
    /// expressions are copied without their actions, so changes made in
    /// the copy never call back into the original's observers.
    pub fn clone_scope(&self, deep: bool) -> Evaluator {
        self.clone_with(self.functions.parent.clone(), deep)
    }

    fn clone_with(&self, parent_functions: Option<Rc<FunctionTable>>, deep: bool) -> Evaluator {
        let functions = Rc::new(FunctionTable {
            functions: RefCell::new(self.functions.functions.borrow().clone()),
            parent: parent_functions,
        });
        let children = if deep {
            self.children
                .iter()
                .map(|c| c.clone_with(Some(Rc::clone(&functions)), true))
                .collect()
        } else {
            Vec::new()
        };

        Evaluator {
            name: self.name.clone(),
            names: self.names.clone(),
            settings: self.settings.clone(),
            seed_origin: self.seed_origin,
            rng: RefCell::new(self.rng.borrow().clone()),
            parameters: self.parameters.clone(),
            expressions: self
                .expressions
                .iter()
                .map(|(key, expression)| {
                    let expression = NamedExpression {
                        actions: Vec::new(),
                        ..expression.clone()
                    };
                    (key.clone(), expression)
                })
                .collect(),
            registry: self.registry.clone(),
            functions,
            children,
        }
    }

    // ---- resolution ----

    /// Parse `text` into a tree ready for evaluation against signal values.
    ///
    /// Parameters are replaced by their values, user functions are inlined,
    /// constant subtrees are folded and `V()`/`I()` references are renamed
    /// to circuit-wide names through this scope's [`ScopeNames`]. Names that
    /// are not parameters stay as variables (e.g. `time`).
    pub fn resolve(&self, text: &str) -> Result<Expr> {
        let expr = parse_expression(strip_delimiters(text))?;
        self.resolve_expr(expr, &[], 0)
    }

    fn resolve_expr(&self, expr: Expr, bound: &[String], depth: usize) -> Result<Expr> {
        expr.try_map(&mut |node| self.resolve_node(node, bound, depth))
    }

    fn resolve_node(&self, node: Expr, bound: &[String], depth: usize) -> Result<Expr> {
        let node = match node {
            Expr::Variable(name) if !self.is_bound(bound, &name) => {
                match self.parameter_value(&self.parameter_key(&name)) {
                    Some(value) => Expr::Constant(value?),
                    None => Expr::Variable(name),
                }
            }
            Expr::Voltage { node_pos, node_neg } => Expr::Voltage {
                node_pos: self.names.node(&node_pos),
                node_neg: node_neg.map(|n| self.names.node(&n)),
            },
            Expr::Current { source_name } => Expr::Current {
                source_name: self.names.object(&source_name),
            },
            Expr::Function { name, args } if !name.eq_ignore_ascii_case("if") => {
                match self.function(&name) {
                    Some(definition) => self.inline(&definition, args, depth)?,
                    None if is_builtin(&name) => Expr::Function { name, args },
                    None => return Err(Error::UnknownFunction(name)),
                }
            }
            other => other,
        };
        Ok(self.simplify(node))
    }

    fn inline(&self, definition: &FunctionDefinition, args: Vec<Expr>, depth: usize) -> Result<Expr> {
        if args.len() != definition.parameters.len() {
            return Err(Error::Arity {
                function: definition.name.clone(),
                expected: definition.parameters.len().to_string(),
                found: args.len(),
            });
        }
        if depth >= MAX_INLINE_DEPTH {
            return Err(Error::CyclicDependency(definition.name.clone()));
        }

        let body = self.resolve_expr(definition.body.clone(), &definition.parameters, depth + 1)?;
        body.try_map(&mut |node| {
            let node = match node {
                Expr::Variable(name) => match definition.parameter_index(&name) {
                    Some(i) => args[i].clone(),
                    None => Expr::Variable(name),
                },
                other => other,
            };
            Ok::<_, Error>(self.simplify(node))
        })
    }

    /// Fold a node whose operands are all constants. Nodes that fail to
    /// evaluate are kept so that the error surfaces only if they are reached.
    fn simplify(&self, node: Expr) -> Expr {
        match node {
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => match condition.as_constant() {
                Some(c) if c != 0.0 => *then_branch,
                Some(_) => *else_branch,
                None => Expr::Conditional {
                    condition,
                    then_branch,
                    else_branch,
                },
            },
            Expr::Function { name, mut args }
                if name.eq_ignore_ascii_case("if") && args.len() == 3 =>
            {
                match args[0].as_constant() {
                    Some(c) if c != 0.0 => args.swap_remove(1),
                    Some(_) => args.swap_remove(2),
                    None => Expr::Function { name, args },
                }
            }
            node if is_foldable(&node) => match node.eval(self) {
                Ok(value) => Expr::Constant(value),
                Err(_) => node,
            },
            node => node,
        }
    }
}

fn is_foldable(node: &Expr) -> bool {
    let constant = |e: &Expr| e.as_constant().is_some();
    match node {
        Expr::BinaryOp { left, right, .. } => constant(left) && constant(right),
        Expr::UnaryOp { operand, .. } => constant(operand),
        Expr::Function { name, args } => {
            is_builtin(name) && !is_random(name) && args.iter().all(constant)
        }
        _ => false,
    }
}

impl Scope for Evaluator {
    fn variable(&self, name: &str) -> Result<f64> {
        self.parameter_value(&self.parameter_key(name))
            .unwrap_or_else(|| Err(Error::UnknownParameter(name.to_string())))
    }

    fn function(&self, name: &str) -> Option<Rc<FunctionDefinition>> {
        self.functions.lookup(&self.function_key(name))
    }

    fn random(&self) -> f64 {
        self.rng.borrow_mut().gen_range(0.0..1.0)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::expression::SignalContext;

    fn seeded() -> Evaluator {
        Evaluator::new(EvaluatorSettings::with_seed(1))
    }

    #[test]
    fn test_dependency_propagation() {
        let mut evaluator = seeded();
        evaluator.set_parameter("a", "2").unwrap();
        evaluator.set_parameter("b", "a*3").unwrap();
        assert_eq!(evaluator.evaluate_double("b").unwrap(), 6.0);

        evaluator.set_parameter_value("a", 5.0).unwrap();
        assert_eq!(evaluator.evaluate_double("b").unwrap(), 15.0);
    }

    #[test]
    fn test_transitive_invalidation() {
        let mut evaluator = seeded();
        evaluator.set_parameter("a", "1").unwrap();
        evaluator.set_parameter("b", "{a + 1}").unwrap();
        evaluator.set_parameter("c", "'b * 10'").unwrap();
        assert_eq!(evaluator.evaluate_double("c").unwrap(), 20.0);

        evaluator.set_parameter("a", "4").unwrap();
        assert_eq!(evaluator.evaluate_double("c").unwrap(), 50.0);
    }

    #[test]
    fn test_forward_reference_resolves_later() {
        let mut evaluator = seeded();
        evaluator.set_parameter("b", "a*2").unwrap();
        assert_eq!(
            evaluator.evaluate_double("b"),
            Err(Error::UnknownParameter("a".into()))
        );
        evaluator.set_parameter("a", "3").unwrap();
        assert_eq!(evaluator.evaluate_double("b").unwrap(), 6.0);
    }

    #[test]
    fn test_ad_hoc_expression() {
        let mut evaluator = seeded();
        evaluator.set_parameter("r", "1k").unwrap();
        assert_eq!(evaluator.evaluate_double("r / 2 + 1").unwrap(), 501.0);
        assert!(matches!(
            evaluator.evaluate_double("r +"),
            Err(Error::Syntax { .. })
        ));
    }

    #[test]
    fn test_case_sensitivity() {
        let mut insensitive = seeded();
        insensitive.set_parameter("Gain", "2").unwrap();
        assert_eq!(insensitive.evaluate_double("GAIN * gain").unwrap(), 4.0);

        let mut sensitive = Evaluator::new(EvaluatorSettings {
            case_sensitive_parameters: true,
            ..EvaluatorSettings::default()
        });
        sensitive.set_parameter("Gain", "2").unwrap();
        assert!(sensitive.evaluate_double("gain").is_err());
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut evaluator = seeded();
        evaluator.set_parameter("a", "b + 1").unwrap();
        evaluator.set_parameter("b", "a + 1").unwrap();
        assert_eq!(
            evaluator.evaluate_double("a"),
            Err(Error::CyclicDependency("a".into()))
        );

        // Breaking the cycle recovers.
        evaluator.set_parameter("b", "1").unwrap();
        assert_eq!(evaluator.evaluate_double("a").unwrap(), 2.0);
    }

    #[test]
    fn test_self_reference_is_reported() {
        let mut evaluator = seeded();
        evaluator.set_parameter("a", "a + 1").unwrap();
        assert!(matches!(
            evaluator.evaluate_double("a"),
            Err(Error::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_recursive_function_is_reported() {
        let mut evaluator = seeded();
        evaluator
            .define_function("f", &["x".into()], "f(x) + 1")
            .unwrap();
        assert!(matches!(
            evaluator.evaluate_double("f(1)"),
            Err(Error::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_parameters_from_expression() {
        let mut evaluator = seeded();
        evaluator
            .define_function("f", &["x".into()], "x * scale")
            .unwrap();
        let names: Vec<String> = evaluator
            .parameters_from_expression("{A + f(b) + undefined}")
            .into_iter()
            .collect();
        assert_eq!(names, vec!["a", "b", "undefined", "scale"]);
        assert!(evaluator.parameters_from_expression("1 +* 2").is_empty());
    }

    #[test]
    fn test_named_expression_actions() {
        let mut evaluator = seeded();
        evaluator.set_parameter("a", "2").unwrap();
        evaluator.set_parameter("b", "a*3").unwrap();

        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&changes);
        let value = evaluator
            .add_action("out", "b + 1", move |old, new| sink.borrow_mut().push((old, new)))
            .unwrap();
        assert_eq!(value, 7.0);

        evaluator.set_parameter_value("a", 5.0).unwrap();
        assert_eq!(*changes.borrow(), vec![(7.0, 16.0)]);
        assert_eq!(evaluator.expression_value("out"), Some(16.0));
        assert_eq!(evaluator.expression_text("OUT"), Some("b + 1"));
        assert_eq!(evaluator.expression_names().collect::<Vec<_>>(), vec!["out"]);

        // Unrelated parameters do not trigger the action.
        evaluator.set_parameter_value("z", 1.0).unwrap();
        assert_eq!(changes.borrow().len(), 1);

        assert!(evaluator.remove_expression("out"));
        evaluator.set_parameter_value("a", 6.0).unwrap();
        assert_eq!(changes.borrow().len(), 1);
    }

    #[test]
    fn test_user_function() {
        let mut evaluator = seeded();
        evaluator
            .define_function("somefunction", &["x".into()], "{x*x+1}")
            .unwrap();
        assert_eq!(evaluator.evaluate_double("somefunction(4)").unwrap(), 17.0);
        assert!(matches!(
            evaluator.evaluate_double("somefunction(1, 2)"),
            Err(Error::Arity { .. })
        ));
    }

    #[test]
    fn test_redefining_function_refreshes_parameters() {
        let mut evaluator = seeded();
        evaluator.define_function("f", &["x".into()], "x + 1").unwrap();
        evaluator.set_parameter("p", "f(1)").unwrap();
        assert_eq!(evaluator.evaluate_double("p").unwrap(), 2.0);

        evaluator.define_function("f", &["x".into()], "x + k").unwrap();
        evaluator.set_parameter_value("k", 10.0).unwrap();
        assert_eq!(evaluator.evaluate_double("p").unwrap(), 11.0);

        evaluator.set_parameter_value("k", 20.0).unwrap();
        assert_eq!(evaluator.evaluate_double("p").unwrap(), 21.0);
    }

    #[test]
    fn test_if_short_circuits() {
        let mut evaluator = seeded();
        evaluator.set_parameter_value("x", 0.0).unwrap();
        assert_eq!(evaluator.evaluate_double("if(x > 0, 1 / x, -1)").unwrap(), -1.0);
        assert_eq!(
            evaluator.evaluate_double("x > 0 ? 1 / x : -2").unwrap(),
            -2.0
        );
    }

    #[test]
    fn test_seed_reproduces_random_values() {
        let first = seeded();
        let second = seeded();
        let a = first.evaluate_double("random()").unwrap();
        let b = second.evaluate_double("random()").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cached_random_parameter_is_stable() {
        let mut evaluator = seeded();
        evaluator.set_parameter("r", "gauss(0, 1)").unwrap();
        let a = evaluator.evaluate_double("r").unwrap();
        assert_eq!(evaluator.evaluate_double("r").unwrap(), a);

        evaluator.set_seed(Some(1)).unwrap();
        assert_eq!(evaluator.evaluate_double("r").unwrap(), a);
        evaluator.set_seed(Some(2)).unwrap();
        assert_ne!(evaluator.evaluate_double("r").unwrap(), a);
    }

    #[test]
    fn test_child_scope_isolation() {
        let mut parent = seeded();
        parent.set_parameter("a", "2").unwrap();
        parent.set_parameter("b", "a*3").unwrap();

        let child = parent.create_child_evaluator("x1", ScopeNames::root());
        child.set_parameter_value("a", 99.0).unwrap();
        assert_eq!(child.evaluate_double("b").unwrap(), 297.0);
        assert_eq!(child.parameter_origin("a"), Some(Origin::Local));
        assert_eq!(child.parameter_origin("b"), Some(Origin::Inherited));

        assert_eq!(parent.evaluate_double("a").unwrap(), 2.0);
        assert_eq!(parent.evaluate_double("b").unwrap(), 6.0);

        // A local override survives later parent assignments.
        parent.set_parameter_value("a", 7.0).unwrap();
        let child = parent.find_child_evaluator("x1").unwrap();
        assert_eq!(child.evaluate_double("a").unwrap(), 99.0);
    }

    #[test]
    fn test_parent_broadcast_reaches_inherited_bindings() {
        let mut parent = seeded();
        parent.set_parameter("a", "2").unwrap();
        parent.set_parameter("b", "a*3").unwrap();
        parent
            .create_child_evaluator("x1", ScopeNames::root())
            .create_child_evaluator("x2", ScopeNames::root());

        parent.set_parameter_value("a", 7.0).unwrap();
        let grandchild = parent.find_child_evaluator("x1.x2").unwrap();
        assert_eq!(grandchild.evaluate_double("a").unwrap(), 7.0);
        assert_eq!(grandchild.evaluate_double("b").unwrap(), 21.0);

        // New parameters are broadcast as well.
        parent.set_parameter("c", "b + 1").unwrap();
        let child = parent.find_child_evaluator("x1").unwrap();
        assert_eq!(child.evaluate_double("c").unwrap(), 22.0);
    }

    #[test]
    fn test_child_sees_parent_functions() {
        let mut parent = seeded();
        let child = parent.create_child_evaluator("x1", ScopeNames::root());
        child
            .define_function("local", &["x".into()], "x * 2")
            .unwrap();
        assert_eq!(child.evaluate_double("local(2)").unwrap(), 4.0);

        parent
            .define_function("shared", &["x".into()], "x + 1")
            .unwrap();
        let child = parent.find_child_evaluator_mut("x1").unwrap();
        assert_eq!(child.evaluate_double("shared(1)").unwrap(), 2.0);

        assert!(!parent.has_function("local"));
        assert!(matches!(
            parent.evaluate_double("local(1)"),
            Err(Error::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_child_inherits_seed() {
        let mut parent = seeded();
        let expected = seeded().evaluate_double("random()").unwrap();
        let child = parent.create_child_evaluator("x1", ScopeNames::root());
        assert_eq!(child.seed(), Some(1));
        assert_eq!(child.evaluate_double("random()").unwrap(), expected);

        child.set_seed(Some(5)).unwrap();
        parent.set_seed(Some(9)).unwrap();
        assert_eq!(parent.find_child_evaluator("x1").unwrap().seed(), Some(5));
    }

    #[test]
    fn test_find_child_evaluator() {
        let mut root = seeded();
        root.create_child_evaluator("x1", ScopeNames::root())
            .create_child_evaluator("x2", ScopeNames::root());

        assert_eq!(root.find_child_evaluator("").unwrap().name(), "");
        assert_eq!(root.find_child_evaluator("X1.x2").unwrap().name(), "x2");
        let x1 = root.find_child_evaluator("x1").unwrap();
        assert_eq!(x1.find_child_evaluator("x1").unwrap().name(), "x1");
        assert_eq!(x1.find_child_evaluator("x1.x2").unwrap().name(), "x2");
        assert!(root.find_child_evaluator("x3").is_none());
        assert_eq!(
            root.child("x1.x3").unwrap_err(),
            Error::UnknownScope("x1.x3".into())
        );
    }

    #[test]
    fn test_recreating_child_replaces_it() {
        let mut root = seeded();
        root.create_child_evaluator("x1", ScopeNames::root())
            .set_parameter_value("only_here", 1.0)
            .unwrap();
        root.create_child_evaluator("X1", ScopeNames::root());
        assert_eq!(root.children().len(), 1);
        assert!(!root.child("x1").unwrap().has_parameter("only_here"));
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let mut root = seeded();
        root.set_parameter("a", "2").unwrap();
        root.set_parameter("b", "a + 1").unwrap();
        root.create_child_evaluator("x1", ScopeNames::root());
        root.define_function("f", &["x".into()], "x * 10").unwrap();

        let mut copy = root.clone_scope(true);
        copy.set_parameter_value("a", 100.0).unwrap();

        assert_eq!(root.evaluate_double("b").unwrap(), 3.0);
        assert_eq!(copy.evaluate_double("b").unwrap(), 101.0);
        assert_eq!(copy.child("x1").unwrap().evaluate_double("b").unwrap(), 101.0);
        assert_eq!(root.child("x1").unwrap().evaluate_double("b").unwrap(), 3.0);
        assert_eq!(copy.child("x1").unwrap().evaluate_double("f(2)").unwrap(), 20.0);

        let shallow = root.clone_scope(false);
        assert!(shallow.children().is_empty());
        assert_eq!(shallow.evaluate_double("f(1)").unwrap(), 10.0);
    }

    #[test]
    fn test_resolve_renames_signals() {
        let mut root = seeded();
        root.set_parameter("gain", "2").unwrap();
        let names = ScopeNames::root().nested(
            "x1",
            &["in".into(), "out".into()],
            &["n1".into(), "n2".into()],
        );
        let child = root.create_child_evaluator("x1", names);

        let expr = child
            .resolve("V(out) * gain + I(R1) + V(mid, gnd)")
            .unwrap();
        assert_eq!(expr.voltage_nodes(), vec!["0", "n2", "x1.mid"]);
        assert_eq!(expr.current_sources(), vec!["x1.R1"]);

        let mut signals = SignalContext::new();
        signals.set_voltage("n2", 1.0);
        signals.set_voltage("x1.mid", 3.0);
        signals.set_voltage("0", 0.0);
        signals.set_current("x1.R1", 0.5);
        assert_eq!(expr.eval(&signals).unwrap(), 5.5);
    }

    #[test]
    fn test_resolve_folds_and_inlines() {
        let mut root = seeded();
        root.set_parameter("k", "3").unwrap();
        root.define_function("sq", &["x".into()], "x * x").unwrap();
        root.define_function("scaled", &["v".into()], "k * sq(v)").unwrap();

        assert_eq!(root.resolve("scaled(2) + 1").unwrap(), Expr::Constant(13.0));
        assert_eq!(
            root.resolve("if(k > 5, 1 / 0, k)").unwrap(),
            Expr::Constant(3.0)
        );

        let expr = root.resolve("scaled(V(a)) + time").unwrap();
        let mut signals = SignalContext::new();
        signals.set_voltage("a", 2.0);
        signals.set_time(1.0);
        assert_eq!(expr.eval(&signals).unwrap(), 13.0);

        assert!(matches!(
            root.resolve("missing(1)"),
            Err(Error::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_reseed_recomputes_named_expressions() {
        let mut root = seeded();
        root.set_parameter("p", "random()").unwrap();
        let changes = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&changes);
        let before = root
            .add_action("q", "p * 1", move |old, new| seen.borrow_mut().push((old, new)))
            .unwrap();
        let child = root.create_child_evaluator("x1", ScopeNames::root());
        child.set_named_expression("q", "p * 1").unwrap();

        root.set_seed(Some(2)).unwrap();
        let p = root.evaluate_double("p").unwrap();
        assert_ne!(p, before);
        assert_eq!(root.expression_value("q"), Some(p));
        assert_eq!(*changes.borrow(), vec![(before, p)]);

        let child = root.find_child_evaluator("x1").unwrap();
        assert_eq!(child.seed(), Some(2));
        let child_p = child.evaluate_double("p").unwrap();
        assert_eq!(child.expression_value("q"), Some(child_p));
    }

    #[test]
    fn test_case_sensitive_function_parameters() {
        let settings = EvaluatorSettings {
            case_sensitive_parameters: true,
            ..EvaluatorSettings::with_seed(1)
        };
        let mut root = Evaluator::new(settings);
        root.set_parameter_value("x", 10.0).unwrap();
        root.define_function("f", &["X".into()], "X + x").unwrap();

        assert_eq!(root.evaluate_double("f(1)").unwrap(), 11.0);
        let reads: Vec<String> = root.parameters_from_expression("f(1)").into_iter().collect();
        assert_eq!(reads, vec!["x"]);
        assert_eq!(root.resolve("f(1)").unwrap(), Expr::Constant(11.0));

        // Dependents of `x` follow through the function body.
        root.set_named_expression("y", "f(2)").unwrap();
        root.set_parameter_value("x", 20.0).unwrap();
        assert_eq!(root.expression_value("y"), Some(22.0));

        let mut folded = seeded();
        folded.set_parameter_value("x", 10.0).unwrap();
        folded.define_function("f", &["X".into()], "X + x").unwrap();
        assert_eq!(folded.evaluate_double("f(1)").unwrap(), 2.0);
        assert!(folded.parameters_from_expression("f(1)").is_empty());
        assert_eq!(folded.resolve("f(1)").unwrap(), Expr::Constant(2.0));
    }

    #[test]
    fn test_clone_does_not_carry_actions() {
        let mut original = seeded();
        original.set_parameter_value("a", 1.0).unwrap();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        original
            .add_action("twice", "a * 2", move |_, _| counter.set(counter.get() + 1))
            .unwrap();

        let mut copy = original.clone_scope(true);
        copy.set_parameter_value("a", 5.0).unwrap();
        assert_eq!(copy.expression_value("twice"), Some(10.0));
        assert_eq!(calls.get(), 0);
        assert_eq!(original.expression_value("twice"), Some(2.0));

        original.set_parameter_value("a", 3.0).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(copy.expression_value("twice"), Some(10.0));
    }

    #[test]
    fn test_strip_delimiters() {
        assert_eq!(strip_delimiters(" {a + 1} "), "a + 1");
        assert_eq!(strip_delimiters("'b'"), "b");
        assert_eq!(strip_delimiters("c"), "c");
    }
}
