// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::itemset::reach::ReachSet;
use crate::nonterminal::NonTerminal;
use crate::production::ProductionRule;
use crate::strings::LStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Lexicon,
    Grammar,
    Arrays,
}

pub const SECTION_COUNT: usize = 3;

impl Section {
    pub fn index(self) -> usize {
        match self {
            Section::Lexicon => 0,
            Section::Grammar => 1,
            Section::Arrays => 2,
        }
    }

    /// Section letter used in conflict diagnostics.
    pub fn code(self) -> char {
        match self {
            Section::Grammar => 'G',
            _ => 'L',
        }
    }

    /// The section whose exports feed this one's terminal alphabet.
    pub fn previous(self) -> Option<Section> {
        match self {
            Section::Grammar => Some(Section::Lexicon),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct SectionData {
    non_terminals: RefCell<Vec<(LStr, NonTerminal)>>,
    exports: RefCell<Vec<(LStr, ProductionRule)>>,
    next_id: Cell<u32>,
}

/// The global compilation context: every section's non-terminals and
/// exports, plus the interned reach-sets.
#[derive(Debug)]
pub struct Context {
    sections: [SectionData; SECTION_COUNT],
    reach_sets: RefCell<BTreeMap<LStr, ReachSet>>,
}

impl Context {
    pub fn new() -> Context {
        let context = Context {
            sections: Default::default(),
            reach_sets: RefCell::new(BTreeMap::new()),
        };
        for section in context.sections.iter() {
            section.next_id.set(1); // id 0 is reserved for "__start__"
        }
        context
    }

    fn section(&self, section: Section) -> &SectionData {
        &self.sections[section.index()]
    }

    pub fn next_id(&self, section: Section) -> u32 {
        let data = self.section(section);
        let id = data.next_id.get();
        data.next_id.set(id + 1);
        id
    }

    /// Installs a non-terminal unless the name is already taken, in which
    /// case the existing definition is returned.
    pub fn add_non_terminal(&self, section: Section, nonterm: NonTerminal) -> NonTerminal {
        if let Some(existing) = self.non_terminal(section, nonterm.name()) {
            return existing;
        }
        let name = nonterm.name().clone();
        self.section(section)
            .non_terminals
            .borrow_mut()
            .push((name, nonterm.clone()));
        nonterm
    }

    pub fn non_terminal(&self, section: Section, name: &LStr) -> Option<NonTerminal> {
        self.section(section)
            .non_terminals
            .borrow()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, nonterm)| nonterm.clone())
    }

    pub fn non_terminal_by_id(&self, section: Section, id: u32) -> Option<NonTerminal> {
        self.section(section)
            .non_terminals
            .borrow()
            .iter()
            .find(|(_, nonterm)| nonterm.id() == id)
            .map(|(_, nonterm)| nonterm.clone())
    }

    pub fn non_terminals(&self, section: Section) -> Vec<NonTerminal> {
        self.section(section)
            .non_terminals
            .borrow()
            .iter()
            .map(|(_, nonterm)| nonterm.clone())
            .collect()
    }

    pub fn first_non_terminal(&self, section: Section) -> Option<(LStr, NonTerminal)> {
        self.section(section)
            .non_terminals
            .borrow()
            .first()
            .cloned()
    }

    pub fn add_export(&self, section: Section, name: LStr, rule: ProductionRule) {
        self.section(section)
            .exports
            .borrow_mut()
            .push((name, rule));
    }

    pub fn exports(&self, section: Section) -> Vec<(LStr, ProductionRule)> {
        self.section(section).exports.borrow().clone()
    }

    pub fn export_index(&self, section: Section, name: &LStr) -> Option<usize> {
        self.section(section)
            .exports
            .borrow()
            .iter()
            .position(|(key, _)| key == name)
    }

    pub fn has_export(&self, section: Section, name: &LStr) -> bool {
        self.export_index(section, name).is_some()
    }

    pub fn reach_set(&self, key: &LStr) -> Option<ReachSet> {
        self.reach_sets.borrow().get(key).cloned()
    }

    pub fn add_reach_set(&self, key: LStr, set: ReachSet) {
        self.reach_sets.borrow_mut().insert(key, set);
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl Drop for Context {
    // Interned reach-sets of recursive grammars reference themselves
    // through their paths; clearing the paths first lets the whole graph
    // (and the strings it pins) drain.
    fn drop(&mut self) {
        for (_, set) in self.reach_sets.borrow().iter() {
            set.clear_paths();
        }
    }
}
