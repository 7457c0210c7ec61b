// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::production::ProductionRule;
use crate::strings::LStr;

#[derive(Debug)]
pub struct NonTerminalData {
    id: u32,
    name: LStr,
    return_type: RefCell<Option<LStr>>,
    rules: RefCell<Vec<ProductionRule>>,
    next_rule_id: Cell<u32>,
}

/// A named grammar symbol defined by one or more production rules.
#[derive(Debug, Clone)]
pub struct NonTerminal(Rc<NonTerminalData>);

impl NonTerminal {
    pub fn new(id: u32, name: LStr) -> NonTerminal {
        NonTerminal(Rc::new(NonTerminalData {
            id,
            name,
            return_type: RefCell::new(None),
            rules: RefCell::new(Vec::new()),
            next_rule_id: Cell::new(1),
        }))
    }

    pub(crate) fn from_data(data: Rc<NonTerminalData>) -> NonTerminal {
        NonTerminal(data)
    }

    pub(crate) fn downgrade(&self) -> Weak<NonTerminalData> {
        Rc::downgrade(&self.0)
    }

    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn name(&self) -> &LStr {
        &self.0.name
    }

    pub fn return_type(&self) -> Option<LStr> {
        self.0.return_type.borrow().clone()
    }

    pub fn set_return_type(&self, value: LStr) {
        *self.0.return_type.borrow_mut() = Some(value);
    }

    pub fn next_rule_id(&self) -> u32 {
        let id = self.0.next_rule_id.get();
        self.0.next_rule_id.set(id + 1);
        id
    }

    /// Adds a rule unless a structurally equal one is already present.
    /// Returns false when the rule was dropped as a duplicate.
    pub fn add_rule(&self, rule: ProductionRule) -> bool {
        if self
            .0
            .rules
            .borrow()
            .iter()
            .any(|existing| existing.structural_eq(&rule))
        {
            return false;
        }
        self.0.rules.borrow_mut().push(rule);
        true
    }

    pub fn rules(&self) -> Vec<ProductionRule> {
        self.0.rules.borrow().clone()
    }

    pub fn rule(&self, index: usize) -> Option<ProductionRule> {
        self.0.rules.borrow().get(index).cloned()
    }

    pub fn rule_count(&self) -> usize {
        self.0.rules.borrow().len()
    }

    pub fn ptr_eq(&self, other: &NonTerminal) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for NonTerminal {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for NonTerminal {}

impl fmt::Display for NonTerminal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}
