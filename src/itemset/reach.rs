// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::context::Context;
use crate::itemset::ItemSet;
use crate::nonterminal::NonTerminal;
use crate::strings::LStr;
use crate::token::Token;

/// One step of a reach path: either a terminal element (None marks an exit)
/// or a whole interned reach-set.
#[derive(Debug, Clone)]
pub enum ReachNode {
    Element(Option<Token>),
    Set(ReachSet),
}

#[derive(Debug, Default)]
pub struct ReachPathData {
    nodes: RefCell<Vec<ReachNode>>,
}

/// The sequence of symbols reachable by walking one rule suffix.
#[derive(Debug, Clone, Default)]
pub struct ReachPath(Rc<ReachPathData>);

impl ReachPath {
    pub fn new() -> ReachPath {
        ReachPath::default()
    }

    pub fn add_node(&self, node: ReachNode) {
        self.0.nodes.borrow_mut().push(node);
    }

    pub fn is_empty(&self) -> bool {
        self.0.nodes.borrow().is_empty()
    }

    /// Builds the path for an element sequence. Identifier elements bound to
    /// a non-terminal contribute that non-terminal's interned reach-set;
    /// anything else contributes a terminal element.
    pub fn from_elems(elems: &[Token], context: &Context) -> ReachPath {
        let path = ReachPath::new();
        for elem in elems {
            match elem.non_terminal() {
                Some(nonterm) => path.add_node(ReachNode::Set(ReachSet::from_non_terminal(
                    &nonterm, context,
                ))),
                None => path.add_node(ReachNode::Element(Some(elem.clone()))),
            }
        }
        path
    }
}

impl fmt::Display for ReachPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (position, node) in self.0.nodes.borrow().iter().enumerate() {
            if position > 0 {
                write!(f, ", ")?;
            }
            match node {
                ReachNode::Element(Some(token)) => write!(f, "{}", token)?,
                ReachNode::Element(None) => write!(f, "@")?,
                ReachNode::Set(set) => match set.origin() {
                    Some(name) => write!(f, "#{}", name)?,
                    None => write!(f, "{}", set)?,
                },
            }
        }
        write!(f, "]")
    }
}

#[derive(Debug)]
pub struct ReachSetData {
    paths: RefCell<Vec<ReachPath>>,
    // Name of the originating non-terminal; None for item-set origins.
    origin: Option<LStr>,
}

/// The set of symbol sequences reachable from a non-terminal or from an
/// item-set position. Interned in the context so recursive grammars produce
/// a finite DAG.
#[derive(Debug, Clone)]
pub struct ReachSet(Rc<ReachSetData>);

impl ReachSet {
    fn new(origin: Option<LStr>) -> ReachSet {
        ReachSet(Rc::new(ReachSetData {
            paths: RefCell::new(Vec::new()),
            origin,
        }))
    }

    pub fn origin(&self) -> Option<LStr> {
        self.0.origin.clone()
    }

    pub fn add_path(&self, path: ReachPath) {
        self.0.paths.borrow_mut().push(path);
    }

    pub fn path_count(&self) -> usize {
        self.0.paths.borrow().len()
    }

    pub fn ptr_eq(&self, other: &ReachSet) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Drops the path list. Recursive grammars make interned sets reference
    /// themselves through their paths; the owning context breaks those
    /// cycles here during teardown.
    pub fn clear_paths(&self) {
        self.0.paths.borrow_mut().clear();
    }

    /// One path per production of the non-terminal. The set is interned by
    /// name before its paths are built so recursion terminates.
    pub fn from_non_terminal(nonterm: &NonTerminal, context: &Context) -> ReachSet {
        if let Some(existing) = context.reach_set(nonterm.name()) {
            return existing;
        }
        let set = ReachSet::new(Some(nonterm.name().clone()));
        context.add_reach_set(nonterm.name().clone(), set.clone());
        for rule in nonterm.rules() {
            set.add_path(ReachPath::from_elems(&rule.elems(), context));
        }
        set
    }

    /// One path per item, walking each rule from `focus + offset` onward.
    /// Interned by the item-set signature. Items whose focus element was
    /// overridden by factorization contribute an exit path.
    pub fn from_item_set(itemset: &ItemSet, offset: usize, context: &Context) -> ReachSet {
        let signature = itemset.signature();
        if let Some(existing) = context.reach_set(&signature) {
            return existing;
        }
        let set = ReachSet::new(None);
        context.add_reach_set(signature, set.clone());
        for item in itemset.items() {
            if item.has_override() {
                set.add_path(ReachPath::new());
                continue;
            }
            let elems = item.rule().elems();
            let from = (item.index() + offset).min(elems.len());
            set.add_path(ReachPath::from_elems(&elems[from..], context));
        }
        set
    }

    /// The terminals any path can produce first, and whether some path can
    /// produce nothing at all (a transparent set).
    pub fn first_terminals(&self) -> (Vec<Token>, bool) {
        let mut terminals = Vec::new();
        let mut visited = BTreeSet::new();
        let transparent = self.collect_first(&mut terminals, &mut visited);
        (terminals, transparent)
    }

    fn collect_first(&self, terminals: &mut Vec<Token>, visited: &mut BTreeSet<usize>) -> bool {
        if !visited.insert(Rc::as_ptr(&self.0) as usize) {
            // Revisiting a set mid-walk: its terminals are already
            // accounted for and a cycle cannot be transparent.
            return false;
        }
        let mut transparent = false;
        for path in self.0.paths.borrow().iter() {
            let mut path_transparent = true;
            for node in path.0.nodes.borrow().iter() {
                match node {
                    ReachNode::Element(Some(token)) => {
                        if !terminals.iter().any(|seen| seen.deep_eq(token)) {
                            terminals.push(token.clone());
                        }
                        path_transparent = false;
                        break;
                    }
                    ReachNode::Element(None) => break,
                    ReachNode::Set(set) => {
                        if !set.collect_first(terminals, visited) {
                            path_transparent = false;
                            break;
                        }
                    }
                }
            }
            transparent = transparent || path_transparent;
        }
        transparent
    }
}

impl fmt::Display for ReachSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (position, path) in self.0.paths.borrow().iter().enumerate() {
            if position > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", path)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Section;
    use crate::errors::Reporter;
    use crate::parser::Parser;
    use crate::scanner::Scanner;
    use crate::token::TokenKind;

    fn grammar_context(text: &str) -> Context {
        let context = Context::new();
        let reporter = Reporter::new();
        let mut scanner = Scanner::new("test.sx", text);
        let mut parser = Parser::new(&context, &reporter);
        parser.parse(&mut scanner).unwrap();
        parser.finalize().unwrap();
        context
    }

    fn bind(context: &Context, section: Section) {
        for nonterm in context.non_terminals(section) {
            for rule in nonterm.rules() {
                for elem in rule.elems() {
                    if elem.kind() == TokenKind::Identifier {
                        if let Some(target) = context.non_terminal(section, elem.value()) {
                            elem.bind(&target);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn recursive_non_terminals_intern_to_a_finite_graph() {
        let context = grammar_context("[grammar]\nexpr : expr '+' expr | 'n' ;\n");
        bind(&context, Section::Grammar);
        let expr = context
            .non_terminal(Section::Grammar, &LStr::intern("expr"))
            .unwrap();
        let set = ReachSet::from_non_terminal(&expr, &context);
        let again = ReachSet::from_non_terminal(&expr, &context);
        assert!(set.ptr_eq(&again));
        assert_eq!(set.path_count(), 2);
    }

    #[test]
    fn first_terminals_cut_recursion() {
        let context = grammar_context("[grammar]\nexpr : expr '+' expr | 'n' ;\n");
        bind(&context, Section::Grammar);
        let expr = context
            .non_terminal(Section::Grammar, &LStr::intern("expr"))
            .unwrap();
        let set = ReachSet::from_non_terminal(&expr, &context);
        let (terminals, transparent) = set.first_terminals();
        assert!(!transparent);
        let values: Vec<&str> = terminals.iter().map(|token| token.value().as_str()).collect();
        assert_eq!(values, vec!["n"]);
    }

    #[test]
    fn empty_rules_make_a_set_transparent() {
        let context = grammar_context("[grammar]\nopt : 'x' | ;\n");
        bind(&context, Section::Grammar);
        let opt = context
            .non_terminal(Section::Grammar, &LStr::intern("opt"))
            .unwrap();
        let set = ReachSet::from_non_terminal(&opt, &context);
        let (terminals, transparent) = set.first_terminals();
        assert!(transparent);
        assert_eq!(terminals.len(), 1);
    }

    #[test]
    fn nested_references_collect_the_inner_first_set() {
        let context = grammar_context("[grammar]\nlist : item list | item ;\nitem : 'i' | 'j' ;\n");
        bind(&context, Section::Grammar);
        let list = context
            .non_terminal(Section::Grammar, &LStr::intern("list"))
            .unwrap();
        let set = ReachSet::from_non_terminal(&list, &context);
        let (terminals, transparent) = set.first_terminals();
        assert!(!transparent);
        let mut values: Vec<&str> =
            terminals.iter().map(|token| token.value().as_str()).collect();
        values.sort();
        assert_eq!(values, vec!["i", "j"]);
    }
}
