//! Arena-backed parse tree.

use super::symbols::Symbol;
use crate::lexer::SpiceToken;

/// Index of a node in a [`ParseTree`].
pub type NodeId = usize;

/// A parse tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseNode {
    Terminal(SpiceToken),
    NonTerminal {
        symbol: Symbol,
        children: Vec<NodeId>,
    },
}

/// A parse tree rooted at the entry symbol it was generated for.
#[derive(Debug, Clone, Default)]
pub struct ParseTree {
    nodes: Vec<ParseNode>,
}

impl ParseTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, node: ParseNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub(crate) fn add_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(ParseNode::NonTerminal { children, .. }) = self.nodes.get_mut(parent) {
            children.push(child);
        }
    }

    /// The root node. Always the first node pushed.
    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> Option<&ParseNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of a non-terminal; empty for terminals.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.nodes.get(id) {
            Some(ParseNode::NonTerminal { children, .. }) => children,
            _ => &[],
        }
    }

    /// Node ids in post order (children before their parent), computed
    /// without recursion.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        if self.nodes.is_empty() {
            return order;
        }

        let mut stack: Vec<(NodeId, bool)> = vec![(self.root(), false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.children(id).iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// Tokens of the leaves, left to right.
    pub fn leaves(&self) -> Vec<&SpiceToken> {
        self.post_order()
            .into_iter()
            .filter_map(|id| match &self.nodes[id] {
                ParseNode::Terminal(token) => Some(token),
                ParseNode::NonTerminal { .. } => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Token, TokenType};

    #[test]
    fn test_post_order_visits_children_first() {
        let mut tree = ParseTree::new();
        let root = tree.push(ParseNode::NonTerminal {
            symbol: Symbol::Vector,
            children: vec![],
        });
        let a = tree.push(ParseNode::Terminal(Token::new(TokenType::Value, "1", 1)));
        tree.add_child(root, a);
        let inner = tree.push(ParseNode::NonTerminal {
            symbol: Symbol::VectorContinue,
            children: vec![],
        });
        tree.add_child(root, inner);
        let b = tree.push(ParseNode::Terminal(Token::new(TokenType::Value, "2", 1)));
        tree.add_child(inner, b);

        assert_eq!(tree.post_order(), vec![a, b, inner, root]);
        let texts: Vec<&str> = tree.leaves().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["1", "2"]);
    }
}
