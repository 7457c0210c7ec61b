// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::nonterminal::{NonTerminal, NonTerminalData};
use crate::strings::LStr;
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Default,
    Public,
    Private,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Default
    }
}

impl Visibility {
    /// Numeric form used by the generated tables (0 default, 1 public,
    /// 2 private).
    pub fn code(self) -> u32 {
        match self {
            Visibility::Default => 0,
            Visibility::Public => 1,
            Visibility::Private => 2,
        }
    }
}

// Reserved: precedence and associativity are carried but never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    NonAssoc,
    Left,
    Right,
}

impl Default for Associativity {
    fn default() -> Self {
        Associativity::NonAssoc
    }
}

#[derive(Debug)]
pub struct ProductionRuleData {
    id: u32,
    nonterm: Weak<NonTerminalData>,
    visibility: Cell<Visibility>,
    associativity: Cell<Associativity>,
    precedence: Cell<u16>,
    elems: RefCell<Vec<Token>>,
    action: RefCell<Option<LStr>>,
}

/// One production of a non-terminal: an ordered element sequence plus an
/// optional opaque action body.
#[derive(Debug, Clone)]
pub struct ProductionRule(Rc<ProductionRuleData>);

impl ProductionRule {
    pub fn new(id: u32, nonterm: &NonTerminal) -> ProductionRule {
        ProductionRule(Rc::new(ProductionRuleData {
            id,
            nonterm: nonterm.downgrade(),
            visibility: Cell::new(Visibility::default()),
            associativity: Cell::new(Associativity::default()),
            precedence: Cell::new(0),
            elems: RefCell::new(Vec::new()),
            action: RefCell::new(None),
        }))
    }

    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn non_terminal(&self) -> NonTerminal {
        NonTerminal::from_data(
            self.0
                .nonterm
                .upgrade()
                .expect("production rule outlived its non-terminal"),
        )
    }

    pub fn visibility(&self) -> Visibility {
        self.0.visibility.get()
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.0.visibility.set(visibility);
    }

    pub fn associativity(&self) -> Associativity {
        self.0.associativity.get()
    }

    pub fn precedence(&self) -> u16 {
        self.0.precedence.get()
    }

    /// Appends an element. An nvalue folds into the preceding element and
    /// does not extend the sequence.
    pub fn add_elem(&self, elem: Token) {
        if elem.kind() == TokenKind::NValue {
            if let Some(last) = self.0.elems.borrow().last() {
                last.set_nvalue(elem);
            }
            return;
        }
        self.0.elems.borrow_mut().push(elem);
    }

    pub fn len(&self) -> usize {
        self.0.elems.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.elems.borrow().is_empty()
    }

    pub fn elems(&self) -> Vec<Token> {
        self.0.elems.borrow().clone()
    }

    pub fn elem(&self, index: usize) -> Option<Token> {
        self.0.elems.borrow().get(index).cloned()
    }

    pub fn first_elem(&self) -> Option<Token> {
        self.elem(0)
    }

    pub fn action(&self) -> Option<LStr> {
        self.0.action.borrow().clone()
    }

    pub fn set_action(&self, action: LStr) {
        *self.0.action.borrow_mut() = Some(action);
    }

    /// Element-sequence equality (nvalues excluded), used to deduplicate
    /// rules at insertion.
    pub fn structural_eq(&self, other: &ProductionRule) -> bool {
        let mine = self.0.elems.borrow();
        let theirs = other.0.elems.borrow();
        mine.len() == theirs.len()
            && mine
                .iter()
                .zip(theirs.iter())
                .all(|(a, b)| a.shallow_eq(b))
    }

    pub fn ptr_eq(&self, other: &ProductionRule) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for ProductionRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:", self.non_terminal().name())?;
        let elems = self.0.elems.borrow();
        if elems.is_empty() {
            write!(f, " <empty>")?;
        } else {
            for elem in elems.iter() {
                write!(f, " {}", elem)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonterminal::NonTerminal;

    fn elem(kind: TokenKind, value: &str) -> Token {
        Token::new(kind, value, &LStr::intern("test.sx"), 1, 1)
    }

    #[test]
    fn nvalues_fold_into_the_preceding_element() {
        let nt = NonTerminal::new(1, LStr::intern("stmt"));
        let rule = ProductionRule::new(1, &nt);
        rule.add_elem(elem(TokenKind::Identifier, "id"));
        rule.add_elem(elem(TokenKind::NValue, "if"));
        rule.add_elem(elem(TokenKind::Identifier, "expr"));
        assert_eq!(rule.len(), 2);
        assert_eq!(rule.elem(0).unwrap().nvalue().unwrap().value().as_str(), "if");
        assert!(rule.elem(1).unwrap().nvalue().is_none());
    }

    #[test]
    fn structural_equality_ignores_nvalues() {
        let nt = NonTerminal::new(1, LStr::intern("stmt"));
        let a = ProductionRule::new(1, &nt);
        a.add_elem(elem(TokenKind::Identifier, "id"));
        a.add_elem(elem(TokenKind::NValue, "if"));
        let b = ProductionRule::new(2, &nt);
        b.add_elem(elem(TokenKind::Identifier, "id"));
        assert!(a.structural_eq(&b));
        b.add_elem(elem(TokenKind::Identifier, "id"));
        assert!(!a.structural_eq(&b));
    }

    #[test]
    fn display_shows_the_left_hand_side() {
        let nt = NonTerminal::new(1, LStr::intern("expr"));
        let rule = ProductionRule::new(1, &nt);
        nt.add_rule(rule.clone());
        assert_eq!(rule.to_string(), "expr: <empty>");
        rule.add_elem(elem(TokenKind::SqString, "n"));
        assert_eq!(rule.to_string(), "expr: n");
    }
}
