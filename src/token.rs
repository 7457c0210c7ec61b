// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::nonterminal::{NonTerminal, NonTerminalData};
use crate::strings::LStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    SqString,
    DqString,
    Symbol,
    NValue,
    Block,
    End,
    Unknown,
}

impl TokenKind {
    pub fn is_literal(self) -> bool {
        match self {
            TokenKind::SqString | TokenKind::DqString => true,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct TokenData {
    value: LStr,
    kind: TokenKind,
    source: LStr,
    line: u32,
    col: u32,
    nvalue: RefCell<Option<Token>>,
    nonterm: RefCell<Weak<NonTerminalData>>,
}

/// A lexical fragment of the grammar source, also reused as the element type
/// of production rules.
#[derive(Debug, Clone)]
pub struct Token(Rc<TokenData>);

impl Token {
    pub fn new(kind: TokenKind, value: &str, source: &LStr, line: u32, col: u32) -> Token {
        Token(Rc::new(TokenData {
            value: LStr::intern(value),
            kind,
            source: source.clone(),
            line,
            col,
            nvalue: RefCell::new(None),
            nonterm: RefCell::new(Weak::new()),
        }))
    }

    /// A copy sharing value, kind and position but with no nvalue and no
    /// non-terminal binding.
    pub fn derived(&self) -> Token {
        Token(Rc::new(TokenData {
            value: self.0.value.clone(),
            kind: self.0.kind,
            source: self.0.source.clone(),
            line: self.0.line,
            col: self.0.col,
            nvalue: RefCell::new(None),
            nonterm: RefCell::new(Weak::new()),
        }))
    }

    pub fn derived_with_value(&self, value: LStr) -> Token {
        Token(Rc::new(TokenData {
            value,
            kind: self.0.kind,
            source: self.0.source.clone(),
            line: self.0.line,
            col: self.0.col,
            nvalue: RefCell::new(None),
            nonterm: RefCell::new(Weak::new()),
        }))
    }

    pub fn derived_as(&self, kind: TokenKind) -> Token {
        Token(Rc::new(TokenData {
            value: self.0.value.clone(),
            kind,
            source: self.0.source.clone(),
            line: self.0.line,
            col: self.0.col,
            nvalue: RefCell::new(None),
            nonterm: RefCell::new(Weak::new()),
        }))
    }

    pub fn value(&self) -> &LStr {
        &self.0.value
    }

    pub fn kind(&self) -> TokenKind {
        self.0.kind
    }

    pub fn is_end(&self) -> bool {
        self.0.kind == TokenKind::End
    }

    pub fn source(&self) -> &LStr {
        &self.0.source
    }

    pub fn line(&self) -> u32 {
        self.0.line
    }

    pub fn col(&self) -> u32 {
        self.0.col
    }

    pub fn first_byte(&self) -> u8 {
        self.0.value.first_byte().unwrap_or(0)
    }

    pub fn nvalue(&self) -> Option<Token> {
        self.0.nvalue.borrow().clone()
    }

    pub fn set_nvalue(&self, nvalue: Token) {
        *self.0.nvalue.borrow_mut() = Some(nvalue);
    }

    pub fn non_terminal(&self) -> Option<NonTerminal> {
        self.0.nonterm.borrow().upgrade().map(NonTerminal::from_data)
    }

    pub fn bind(&self, nonterm: &NonTerminal) {
        *self.0.nonterm.borrow_mut() = nonterm.downgrade();
    }

    /// Kind and value only; nvalues are ignored.
    pub fn shallow_eq(&self, other: &Token) -> bool {
        self.0.kind == other.0.kind && self.0.value == other.0.value
    }

    /// Kind, value and nvalue.
    pub fn deep_eq(&self, other: &Token) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if !self.shallow_eq(other) {
            return false;
        }
        match (self.nvalue(), other.nvalue()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.shallow_eq(&b),
            _ => false,
        }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.shallow_eq(other)
    }
}

impl Eq for Token {}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_end() {
            write!(f, "(EOF)")?;
        } else {
            write!(f, "{}", self.0.value)?;
        }
        if let Some(nvalue) = self.nvalue() {
            write!(f, ":{}", nvalue.value())?;
        }
        Ok(())
    }
}
