// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::charset::CharSet;
use crate::context::{Context, Section};
use crate::nonterminal::NonTerminal;
use crate::production::ProductionRule;
use crate::strings::LStr;
use crate::token::Token;

use crate::itemset::reach::ReachSet;

pub mod builder;
pub mod reach;

/// Index of an item-set within the builder's arena. Transitions and parent
/// links are handles, so the cyclic item-set graph stays acyclic in
/// ownership terms.
pub type ItemSetId = usize;

#[derive(Debug)]
struct ItemData {
    rule: ProductionRule,
    index: Cell<usize>,
    // Focus element replaced during charset factorization.
    celem: RefCell<Option<Token>>,
    transition: Cell<Option<ItemSetId>>,
}

/// An augmented production rule: the rule plus the index of the element
/// currently in focus.
#[derive(Debug, Clone)]
pub struct Item(Rc<ItemData>);

impl Item {
    pub fn new(rule: ProductionRule) -> Item {
        Item(Rc::new(ItemData {
            rule,
            index: Cell::new(0),
            celem: RefCell::new(None),
            transition: Cell::new(None),
        }))
    }

    /// A copy of this item with the focus moved one element forward. The
    /// copy carries no override and no transition.
    pub fn advanced(&self) -> Item {
        Item(Rc::new(ItemData {
            rule: self.0.rule.clone(),
            index: Cell::new(self.0.index.get() + 1),
            celem: RefCell::new(None),
            transition: Cell::new(None),
        }))
    }

    /// A plain copy at the same focus, used by factorization before
    /// overriding the focus element.
    fn duplicate(&self) -> Item {
        Item(Rc::new(ItemData {
            rule: self.0.rule.clone(),
            index: Cell::new(self.0.index.get()),
            celem: RefCell::new(None),
            transition: Cell::new(None),
        }))
    }

    pub fn rule(&self) -> &ProductionRule {
        &self.0.rule
    }

    pub fn index(&self) -> usize {
        self.0.index.get()
    }

    /// The element in focus, honouring a factorization override.
    pub fn elem(&self) -> Option<Token> {
        if let Some(celem) = self.0.celem.borrow().as_ref() {
            return Some(celem.clone());
        }
        self.0.rule.elem(self.0.index.get())
    }

    pub fn override_elem(&self, value: LStr) {
        let replacement = match self.0.rule.elem(self.0.index.get()) {
            Some(elem) => elem.derived_with_value(value),
            None => return,
        };
        *self.0.celem.borrow_mut() = Some(replacement);
    }

    pub fn has_override(&self) -> bool {
        self.0.celem.borrow().is_some()
    }

    pub fn transition(&self) -> Option<ItemSetId> {
        self.0.transition.get()
    }

    pub fn set_transition(&self, target: ItemSetId) {
        self.0.transition.set(Some(target));
    }

    pub fn hash(&self) -> u32 {
        (self.0.rule.non_terminal().id() << 20)
            ^ (self.0.rule.id() << 10)
            ^ self.0.index.get() as u32
    }

    /// Same rule, same focus index and (deeply) equal focus element.
    pub fn same_as(&self, other: &Item) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if !self.0.rule.ptr_eq(&other.0.rule) {
            return false;
        }
        if self.0.index.get() != other.0.index.get() {
            return false;
        }
        match (self.elem(), other.elem()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.deep_eq(&b),
            _ => false,
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let elems = self.0.rule.elems();
        let index = self.0.index.get();
        for (position, elem) in elems.iter().enumerate() {
            if position == index {
                write!(f, "*")?;
                if let Some(celem) = self.0.celem.borrow().as_ref() {
                    write!(f, "{} ", celem.value())?;
                    continue;
                }
            }
            write!(f, "{} ", elem)?;
        }
        if index >= elems.len() {
            write!(
                f,
                "* [{}#{}]",
                self.0.rule.non_terminal().name(),
                self.0.rule.id()
            )?;
        }
        Ok(())
    }
}

// Factorization work unit: a charset plus the items that consume it.
struct Group {
    charset: CharSet,
    items: Vec<Item>,
}

impl Group {
    fn new(charset: CharSet) -> Group {
        Group {
            charset,
            items: Vec::new(),
        }
    }

    fn add_item(&mut self, item: Item) {
        if self.items.iter().any(|existing| existing.same_as(&item)) {
            return;
        }
        self.items.push(item);
    }

    fn add_items(&mut self, items: &[Item]) {
        for item in items {
            self.add_item(item.clone());
        }
    }
}

/// A closure of items: one state of the LR automaton under construction.
#[derive(Debug)]
pub struct ItemSet {
    id: Cell<ItemSetId>,
    items: RefCell<Vec<Item>>,
    parents: RefCell<Vec<ItemSetId>>,
    signature: RefCell<Option<LStr>>,
    hash: Cell<u32>,
    reach: RefCell<Option<ReachSet>>,
}

impl ItemSet {
    pub fn new() -> ItemSet {
        ItemSet {
            id: Cell::new(0),
            items: RefCell::new(Vec::new()),
            parents: RefCell::new(Vec::new()),
            signature: RefCell::new(None),
            hash: Cell::new(0),
            reach: RefCell::new(None),
        }
    }

    pub fn id(&self) -> ItemSetId {
        self.id.get()
    }

    pub fn set_id(&self, id: ItemSetId) {
        self.id.set(id);
    }

    pub fn hash(&self) -> u32 {
        self.hash.get()
    }

    pub fn signature(&self) -> LStr {
        self.signature
            .borrow()
            .clone()
            .expect("signature requested before close()")
    }

    pub fn add_parent(&self, parent: ItemSetId) {
        self.parents.borrow_mut().push(parent);
    }

    pub fn parents(&self) -> Vec<ItemSetId> {
        self.parents.borrow().clone()
    }

    pub fn items(&self) -> Vec<Item> {
        self.items.borrow().clone()
    }

    pub fn item_count(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn contains(&self, item: &Item) -> bool {
        self.items.borrow().iter().any(|mine| mine.same_as(item))
    }

    /// Adds an item unless an equal one is already present.
    pub fn add_item(&self, item: Item) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.items.borrow_mut().push(item);
        true
    }

    /// Adds every production of a non-terminal as a fresh kernel item.
    pub fn add_non_terminal(&self, nonterm: &NonTerminal) {
        for rule in nonterm.rules() {
            self.add_item(Item::new(rule));
        }
    }

    /// Items in this set and the twin must match one to one.
    pub fn same_items(&self, other: &ItemSet) -> bool {
        if self.item_count() != other.item_count() {
            return false;
        }
        self.items
            .borrow()
            .iter()
            .all(|item| other.contains(item))
        // Follow sets are not part of the comparison: sets with identical
        // items are merged unconditionally.
    }

    pub fn reach(&self) -> Option<ReachSet> {
        self.reach.borrow().clone()
    }

    /// Lazily builds and memoizes the reach-set of this item-set.
    pub fn reach_set(&self, context: &Context) -> ReachSet {
        if let Some(set) = self.reach.borrow().as_ref() {
            return set.clone();
        }
        let set = ReachSet::from_item_set(self, 0, context);
        *self.reach.borrow_mut() = Some(set.clone());
        set
    }

    /// Closes the set: adds the productions of every focused non-terminal,
    /// factorizes overlapping lexical literals, then freezes hash and
    /// signature. Idempotent.
    pub fn close(&self, section: Section) {
        let mut position = 0;
        while position < self.items.borrow().len() {
            let item = self.items.borrow()[position].clone();
            position += 1;
            let elem = match item.elem() {
                Some(elem) => elem,
                None => continue,
            };
            if let Some(nonterm) = elem.non_terminal() {
                self.add_non_terminal(&nonterm);
            }
        }

        if section == Section::Lexicon {
            self.factorize();
        }

        let mut hash = 0u32;
        for item in self.items.borrow().iter() {
            hash = hash.wrapping_add(item.hash());
        }
        self.hash.set(hash);
        self.build_signature();
    }

    /// Splits overlapping literal charsets so that every literal transition
    /// out of this set is taken by a disjoint character class.
    pub fn factorize(&self) {
        let mut groups: Vec<Group> = Vec::new();

        // Pull out every item focused on a literal.
        {
            let mut items = self.items.borrow_mut();
            let mut kept = Vec::new();
            for item in items.drain(..) {
                let literal = item
                    .elem()
                    .map(|elem| elem.kind().is_literal())
                    .unwrap_or(false);
                if literal {
                    let charset =
                        CharSet::from_pattern(item.elem().expect("just checked").value().as_str());
                    let mut group = Group::new(charset);
                    group.add_item(item);
                    groups.push(group);
                } else {
                    kept.push(item);
                }
            }
            *items = kept;
        }

        let mut stack: Vec<Vec<Group>> = Vec::new();
        stack.push(groups);

        // Refine: intersect every pair at the current level; the next level
        // holds the non-empty intersections with the union of the parents'
        // items.
        while stack.last().map(|level| level.len()).unwrap_or(0) > 1 {
            let level = stack.last().expect("non-empty stack");
            let mut output: Vec<Group> = Vec::new();
            for first in 0..level.len() {
                for second in first + 1..level.len() {
                    let common = level[first].charset & level[second].charset;
                    if common.is_empty() {
                        continue;
                    }
                    let target = match output.iter().position(|group| group.charset == common) {
                        Some(position) => position,
                        None => {
                            output.push(Group::new(common));
                            output.len() - 1
                        }
                    };
                    let items: Vec<Item> = level[first]
                        .items
                        .iter()
                        .chain(level[second].items.iter())
                        .cloned()
                        .collect();
                    output[target].add_items(&items);
                }
            }
            stack.push(output);
        }

        // Emit from the most refined level down, keeping only the part of
        // each charset not already consumed.
        let mut unconsumed = CharSet::full();
        while let Some(level) = stack.pop() {
            let mut consumed_here = CharSet::new();
            for group in level {
                let part = group.charset & unconsumed;
                if part.is_empty() {
                    continue;
                }
                let pattern = LStr::intern(&part.to_string());
                for item in group.items.iter() {
                    let replacement = item.duplicate();
                    replacement.override_elem(pattern.clone());
                    self.items.borrow_mut().push(replacement);
                }
                consumed_here |= part;
            }
            unconsumed &= !consumed_here;
        }
    }

    // Signature: sorted item hashes rendered as ':'-joined hex. Canonical
    // with respect to item order.
    fn build_signature(&self) {
        let mut hashes: Vec<u32> = self.items.borrow().iter().map(|item| item.hash()).collect();
        hashes.sort();
        let text = hashes
            .iter()
            .map(|hash| format!("{:x}", hash))
            .collect::<Vec<_>>()
            .join(":");
        *self.signature.borrow_mut() = Some(LStr::intern(&text));
    }
}

impl Default for ItemSet {
    fn default() -> Self {
        ItemSet::new()
    }
}

impl fmt::Display for ItemSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ITEMSET {}", self.id.get())?;
        for parent in self.parents.borrow().iter() {
            write!(f, " [{}]", parent)?;
        }
        for item in self.items.borrow().iter() {
            write!(f, "\n  > [{}] {}", item.transition().unwrap_or(0), item)?;
        }
        writeln!(f)?;
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::CharSet;
    use crate::token::TokenKind;

    fn literal(value: &str) -> Token {
        Token::new(TokenKind::SqString, value, &LStr::intern("test.sx"), 1, 1)
    }

    // The owning non-terminal is returned so the rule's back-pointer stays
    // valid for the duration of the test.
    fn single_rule_item(name: &str, pattern: &str) -> (Item, NonTerminal) {
        let nt = NonTerminal::new(1, LStr::intern(name));
        let rule = ProductionRule::new(nt.next_rule_id(), &nt);
        rule.add_elem(literal(pattern));
        nt.add_rule(rule.clone());
        (Item::new(rule), nt)
    }

    #[test]
    fn item_hash_packs_ids_and_index() {
        let nt = NonTerminal::new(3, LStr::intern("x"));
        let rule = ProductionRule::new(2, &nt);
        rule.add_elem(literal("a"));
        nt.add_rule(rule.clone());
        let item = Item::new(rule);
        assert_eq!(item.hash(), (3 << 20) ^ (2 << 10));
        let next = item.advanced();
        assert_eq!(next.hash(), (3 << 20) ^ (2 << 10) ^ 1);
    }

    #[test]
    fn advancing_clears_overrides_and_transitions() {
        let (item, _nt) = single_rule_item("a", "[a-c]");
        item.override_elem(LStr::intern("[a]"));
        item.set_transition(7);
        let next = item.advanced();
        assert!(!next.has_override());
        assert!(next.transition().is_none());
        assert_eq!(next.index(), 1);
        assert!(next.elem().is_none());
    }

    #[test]
    fn signatures_are_canonical_under_item_order() {
        let nt = NonTerminal::new(1, LStr::intern("x"));
        let first = ProductionRule::new(nt.next_rule_id(), &nt);
        first.add_elem(literal("a"));
        nt.add_rule(first.clone());
        let second = ProductionRule::new(nt.next_rule_id(), &nt);
        second.add_elem(literal("b"));
        nt.add_rule(second.clone());

        let forward = ItemSet::new();
        forward.add_item(Item::new(first.clone()));
        forward.add_item(Item::new(second.clone()));
        forward.close(Section::Grammar);

        let backward = ItemSet::new();
        backward.add_item(Item::new(second));
        backward.add_item(Item::new(first));
        backward.close(Section::Grammar);

        assert_eq!(forward.signature(), backward.signature());
        assert_eq!(forward.hash(), backward.hash());
    }

    #[test]
    fn close_is_idempotent() {
        let set = ItemSet::new();
        let (item, _nt) = single_rule_item("a", "[a-c]");
        set.add_item(item);
        set.close(Section::Lexicon);
        let once = set.signature();
        let count = set.item_count();
        set.close(Section::Lexicon);
        assert_eq!(set.signature(), once);
        assert_eq!(set.item_count(), count);
    }

    #[test]
    fn factorization_partitions_overlapping_literals() {
        let set = ItemSet::new();
        let (a, _nt_a) = single_rule_item("a", "[a-c]");
        let (b, _nt_b) = single_rule_item("b", "[b-d]");
        set.add_item(a);
        set.add_item(b);
        set.factorize();

        let mut union = CharSet::new();
        let mut distinct: Vec<CharSet> = Vec::new();
        for item in set.items() {
            let charset = CharSet::from_pattern(item.elem().unwrap().value().as_str());
            union |= charset;
            if !distinct.contains(&charset) {
                distinct.push(charset);
            }
        }
        for (first, lhs) in distinct.iter().enumerate() {
            for rhs in distinct.iter().skip(first + 1) {
                assert!((*lhs & *rhs).is_empty(), "distinct charsets must be disjoint");
            }
        }
        assert_eq!(union, CharSet::from_pattern("[a-d]"));
        assert_eq!(distinct.len(), 3); // [a], [bc], [d]

        // The overlap [b-c] is consumed by both source items.
        let overlap: Vec<_> = set
            .items()
            .iter()
            .filter(|item| {
                CharSet::from_pattern(item.elem().unwrap().value().as_str())
                    == CharSet::from_pattern("[b-c]")
            })
            .cloned()
            .collect();
        assert_eq!(overlap.len(), 2);
    }

    #[test]
    fn factorization_keeps_disjoint_literals_apart() {
        let set = ItemSet::new();
        let (a, _nt_a) = single_rule_item("a", "[a-c]");
        let (b, _nt_b) = single_rule_item("b", "[x-z]");
        set.add_item(a);
        set.add_item(b);
        set.factorize();
        assert_eq!(set.item_count(), 2);
        let charsets: Vec<CharSet> = set
            .items()
            .iter()
            .map(|item| CharSet::from_pattern(item.elem().unwrap().value().as_str()))
            .collect();
        assert!(charsets.contains(&CharSet::from_pattern("[a-c]")));
        assert!(charsets.contains(&CharSet::from_pattern("[x-z]")));
    }
}
