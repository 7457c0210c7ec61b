// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;

use crate::context::{Context, Section};
use crate::errors::*;
use crate::itemset::{ItemSet, ItemSetId};
use crate::nonterminal::NonTerminal;
use crate::production::{ProductionRule, Visibility};
use crate::token::{Token, TokenKind};

#[derive(Debug)]
pub struct ShiftAction {
    pub rule: ProductionRule,
    pub token: Token,
    pub next_state: ItemSetId,
}

#[derive(Debug)]
pub struct GotoAction {
    pub nonterm: NonTerminal,
    pub next_state: ItemSetId,
}

#[derive(Debug)]
pub struct ReduceAction {
    pub rule: ProductionRule,
    // None renders as the state's default reduction; Some renders as a
    // lookahead-guarded reduction.
    pub follow: RefCell<Option<Vec<Token>>>,
}

impl ReduceAction {
    fn new(rule: ProductionRule) -> ReduceAction {
        ReduceAction {
            rule,
            follow: RefCell::new(None),
        }
    }

    pub fn follow(&self) -> Option<Vec<Token>> {
        self.follow.borrow().clone()
    }
}

// Reserved: rendered by the emitters but never populated by the builder.
#[derive(Debug)]
pub struct JumpAction {
    pub token: Token,
    pub next_state: ItemSetId,
}

/// The action table of one finite-state-machine state. The id is shared
/// with the item-set the state was built from.
#[derive(Debug)]
pub struct FsmState {
    id: ItemSetId,
    shifts: Vec<ShiftAction>,
    gotos: Vec<GotoAction>,
    reductions: Vec<ReduceAction>,
    jumps: Vec<JumpAction>,
}

impl FsmState {
    fn new(id: ItemSetId) -> FsmState {
        FsmState {
            id,
            shifts: Vec::new(),
            gotos: Vec::new(),
            reductions: Vec::new(),
            jumps: Vec::new(),
        }
    }

    pub fn id(&self) -> ItemSetId {
        self.id
    }

    pub fn shifts(&self) -> &[ShiftAction] {
        &self.shifts
    }

    pub fn gotos(&self) -> &[GotoAction] {
        &self.gotos
    }

    pub fn reductions(&self) -> &[ReduceAction] {
        &self.reductions
    }

    pub fn jumps(&self) -> &[JumpAction] {
        &self.jumps
    }
}

impl fmt::Display for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "STATE {}", self.id)?;
        for reduce in self.reductions.iter() {
            write!(
                f,
                "\n  > REDUCE {}#{}",
                reduce.rule.non_terminal().name(),
                reduce.rule.id()
            )?;
            match reduce.rule.visibility() {
                Visibility::Public => write!(f, " (EXPORT)")?,
                Visibility::Private => write!(f, " (IGNORE)")?,
                Visibility::Default => (),
            }
            if let Some(follow) = reduce.follow() {
                for token in follow.iter() {
                    write!(f, "\n    > ON {}", token)?;
                }
            }
        }
        for goto in self.gotos.iter() {
            write!(f, "\n  > GOTO {} ON {}", goto.next_state, goto.nonterm.name())?;
        }
        for jump in self.jumps.iter() {
            write!(f, "\n  > JUMP {} ON '{}'", jump.next_state, jump.token.value())?;
        }
        for shift in self.shifts.iter() {
            if shift.token.is_end() {
                write!(f, "\n  > SHIFT (EOF) -> {}", shift.next_state)?;
            } else {
                write!(f, "\n  > SHIFT '{}' -> {}", shift.token, shift.next_state)?;
            }
        }
        writeln!(f)?;
        writeln!(f)
    }
}

/// Converts the item-set graph into FSM states and checks each state for
/// shift/reduce and reduce/reduce conflicts. Conflicts are reported and
/// building continues, so one run surfaces them all.
pub struct FsmStateBuilder;

impl FsmStateBuilder {
    pub fn build(
        context: &Context,
        section: Section,
        sets: &[ItemSet],
        reporter: &Reporter,
    ) -> Vec<FsmState> {
        let mut states = Vec::with_capacity(sets.len());

        for set in sets {
            let mut state = FsmState::new(set.id());

            for item in set.items() {
                let elem = match item.elem() {
                    Some(elem) => elem,
                    None => {
                        state.reductions.push(ReduceAction::new(item.rule().clone()));
                        continue;
                    }
                };
                let next_state = item
                    .transition()
                    .expect("non-reduce items are wired by the item-set builder");

                if elem.kind() == TokenKind::Identifier {
                    if let Some(nonterm) = context.non_terminal(section, elem.value()) {
                        if state.gotos.iter().any(|goto| goto.next_state == next_state) {
                            continue;
                        }
                        state.gotos.push(GotoAction {
                            nonterm,
                            next_state,
                        });
                        continue;
                    }
                    // An unresolved identifier is only a terminal if the
                    // previous section exported it.
                    let exported = section
                        .previous()
                        .map(|previous| context.has_export(previous, elem.value()))
                        .unwrap_or(false);
                    if !exported {
                        reporter.report(
                            E_UNDEF_NONTERM,
                            Some(&elem),
                            format!("Undefined non-terminal: `{}`.", elem.value()),
                        );
                        continue;
                    }
                }

                if state.shifts.iter().any(|shift| shift.token.deep_eq(&elem)) {
                    continue;
                }
                state.shifts.push(ShiftAction {
                    rule: item.rule().clone(),
                    token: elem,
                    next_state,
                });
            }

            Self::check_conflicts(context, section, sets, set, &mut state, reporter);
            states.push(state);
        }

        states
    }

    fn check_conflicts(
        context: &Context,
        section: Section,
        sets: &[ItemSet],
        set: &ItemSet,
        state: &mut FsmState,
        reporter: &Reporter,
    ) {
        if state.reductions.is_empty() {
            return;
        }

        if state.reductions.len() == 1 {
            if state.shifts.is_empty() {
                return;
            }
            // In the lexicon the single reduction is the fallback taken when
            // no shift matches. In the grammar the lookahead must be
            // disjoint from the shift symbols.
            if section == Section::Lexicon {
                return;
            }
            let follow =
                Self::reduction_follow(context, sets, set.id(), &state.reductions[0].rule);
            let collides = state
                .shifts
                .iter()
                .any(|shift| follow.iter().any(|token| token.deep_eq(&shift.token)));
            if collides {
                reporter.report(
                    E_SHIFT_REDUCE,
                    None,
                    format!(
                        "(State {}{}) Shift/Reduce conflict found",
                        section.code(),
                        set.id()
                    ),
                );
            }
            return;
        }

        if section == Section::Lexicon {
            reporter.report(
                E_REDUCE_REDUCE,
                None,
                format!(
                    "(State {}{}) Reduce/Reduce conflict found",
                    section.code(),
                    set.id()
                ),
            );
            return;
        }

        for reduction in state.reductions.iter() {
            let follow = Self::reduction_follow(context, sets, set.id(), &reduction.rule);
            *reduction.follow.borrow_mut() = Some(follow);
        }

        for reduction in state.reductions.iter() {
            let follow = reduction.follow();
            let follow = follow.as_deref().unwrap_or(&[]);
            let collides = state
                .shifts
                .iter()
                .any(|shift| follow.iter().any(|token| token.deep_eq(&shift.token)));
            if collides {
                reporter.report(
                    E_SHIFT_REDUCE,
                    None,
                    format!(
                        "(State {}{}) Shift/Reduce conflict found",
                        section.code(),
                        set.id()
                    ),
                );
                return;
            }
        }

        for (position, first) in state.reductions.iter().enumerate() {
            let first_follow = first.follow();
            let first_follow = first_follow.as_deref().unwrap_or(&[]);
            for second in state.reductions.iter().skip(position + 1) {
                let second_follow = second.follow();
                let second_follow = second_follow.as_deref().unwrap_or(&[]);
                let overlaps = first_follow
                    .iter()
                    .any(|token| second_follow.iter().any(|other| other.deep_eq(token)));
                if overlaps {
                    reporter.report(
                        E_REDUCE_REDUCE,
                        None,
                        format!(
                            "(State {}{}) Reduce/Reduce conflict found",
                            section.code(),
                            set.id()
                        ),
                    );
                    return;
                }
            }
        }
    }

    /// The terminals that may legally follow a reduction taken in `state`:
    /// pop the rule's length through the parent links, then collect the
    /// first-terminals of every goto target on the reduced non-terminal,
    /// chasing transparent targets into their own reductions.
    fn reduction_follow(
        context: &Context,
        sets: &[ItemSet],
        state: ItemSetId,
        rule: &ProductionRule,
    ) -> Vec<Token> {
        let mut follow = Vec::new();
        let mut visited = BTreeSet::new();
        Self::collect_follow(context, sets, state, rule, &mut follow, &mut visited);
        follow
    }

    fn collect_follow(
        context: &Context,
        sets: &[ItemSet],
        state: ItemSetId,
        rule: &ProductionRule,
        follow: &mut Vec<Token>,
        visited: &mut BTreeSet<(ItemSetId, u32, u32)>,
    ) {
        if !visited.insert((state, rule.non_terminal().id(), rule.id())) {
            return;
        }

        let mut level: BTreeSet<ItemSetId> = BTreeSet::new();
        level.insert(state);
        for _ in 0..rule.len() {
            let mut up = BTreeSet::new();
            for id in level.iter() {
                for parent in sets[*id].parents() {
                    up.insert(parent);
                }
            }
            level = up;
        }

        let reduced = rule.non_terminal();
        for origin in level {
            for item in sets[origin].items() {
                let elem = match item.elem() {
                    Some(elem) => elem,
                    None => continue,
                };
                let matches = elem
                    .non_terminal()
                    .map(|nonterm| nonterm.ptr_eq(&reduced))
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
                let target = match item.transition() {
                    Some(target) => target,
                    None => continue,
                };
                let reach = sets[target].reach_set(context);
                let (firsts, transparent) = reach.first_terminals();
                for token in firsts {
                    if !follow.iter().any(|seen| seen.deep_eq(&token)) {
                        follow.push(token);
                    }
                }
                if transparent {
                    for inner in sets[target].items() {
                        if inner.elem().is_none() {
                            Self::collect_follow(
                                context,
                                sets,
                                target,
                                inner.rule(),
                                follow,
                                visited,
                            );
                        }
                    }
                }
            }
        }
    }
}
