//! Netlist parser: parse-tree generation and evaluation.

mod evaluator;
mod generator;
mod symbols;
mod tree;

pub use evaluator::{ParseTreeEvaluator, SpiceObject};
pub use generator::ParseTreeGenerator;
pub use symbols::Symbol;
pub use tree::{NodeId, ParseNode, ParseTree};

use log::debug;
use spicefront_core::Netlist;

use crate::error::Result;
use crate::lexer::{SpiceLexer, SpiceToken};
use crate::options::ReaderOptions;

/// Parse a netlist with the default [`ReaderOptions`] (first line is the
/// title, `.END` optional).
pub fn parse(input: &str) -> Result<Netlist> {
    NetlistReader::new(ReaderOptions::default())?.read(input)
}

/// Parse a netlist with explicit options.
pub fn parse_with(input: &str, options: &ReaderOptions) -> Result<Netlist> {
    NetlistReader::new(options.clone())?.read(input)
}

/// Lexer, generator and evaluator configured for one set of options.
///
/// A reader holds no per-run state; `read` can be called any number of
/// times, and clones share the compiled lexer grammar.
#[derive(Clone)]
pub struct NetlistReader {
    options: ReaderOptions,
    lexer: SpiceLexer,
    generator: ParseTreeGenerator,
}

impl NetlistReader {
    pub fn new(options: ReaderOptions) -> Result<Self> {
        Ok(Self {
            lexer: SpiceLexer::new(&options)?,
            generator: ParseTreeGenerator::new(options.is_end_required),
            options,
        })
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn lexer(&self) -> &SpiceLexer {
        &self.lexer
    }

    /// Lex, parse and evaluate a whole netlist.
    pub fn read(&self, text: &str) -> Result<Netlist> {
        let root = if self.options.has_title {
            Symbol::Netlist
        } else {
            Symbol::NetlistWithoutTitle
        };
        let tokens = self.lexer.tokenize(text)?;
        let tree = self.generator.generate(&tokens, root)?;
        let netlist = ParseTreeEvaluator::new().evaluate_netlist(&tree)?;
        debug!(
            "read netlist: {} tokens, {} statements",
            tokens.len(),
            netlist.statements.len()
        );
        Ok(netlist)
    }

    /// Parse `text` as a single `symbol`, e.g. a parameter list.
    pub fn read_symbol(&self, text: &str, symbol: Symbol) -> Result<SpiceObject> {
        let tokens = self.lexer.tokenize(text)?;
        self.evaluate_tokens(&tokens, symbol)
    }

    /// Parse an already lexed token sequence as `symbol`.
    pub fn evaluate_tokens(&self, tokens: &[SpiceToken], symbol: Symbol) -> Result<SpiceObject> {
        let tree = self.generator.generate(tokens, symbol)?;
        ParseTreeEvaluator::new().evaluate(&tree)
    }
}
