// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::VecDeque;

use crate::context::{Context, Section};
use crate::itemset::{ItemSet, ItemSetId};
use crate::strings::LStr;
use crate::token::TokenKind;

/// Builds the item-set graph for one section, breadth first from the start
/// symbol. Sets live in the returned arena and refer to each other by index.
pub struct ItemSetBuilder;

impl ItemSetBuilder {
    /// Returns None when the section does not define the start symbol.
    pub fn build(context: &Context, section: Section, start_symbol: &LStr) -> Option<Vec<ItemSet>> {
        let nonterm = context.non_terminal(section, start_symbol)?;

        Self::bind_token_nt_refs(context, section);

        let root = ItemSet::new();
        root.add_non_terminal(&nonterm);
        root.close(section);

        let mut sets: Vec<ItemSet> = vec![root];
        let mut queue: VecDeque<ItemSetId> = VecDeque::new();
        queue.push_back(0);

        while let Some(current) = queue.pop_front() {
            let items = sets[current].items();
            for (position, item) in items.iter().enumerate() {
                if item.transition().is_some() {
                    continue;
                }
                let elem = match item.elem() {
                    Some(elem) => elem,
                    None => continue,
                };

                // Every unwired item consuming the same element moves to the
                // same successor.
                let mut group = vec![item.clone()];
                for other in items.iter().skip(position + 1) {
                    if other.transition().is_some() {
                        continue;
                    }
                    if let Some(other_elem) = other.elem() {
                        if other_elem.deep_eq(&elem) {
                            group.push(other.clone());
                        }
                    }
                }

                let candidate = ItemSet::new();
                for member in group.iter() {
                    candidate.add_item(member.advanced());
                }
                candidate.close(section);

                // A candidate whose item list matches an existing set is
                // dropped before anything points at it; the current set is
                // wired to the surviving twin instead.
                let target = match sets
                    .iter()
                    .position(|existing| existing.same_items(&candidate))
                {
                    Some(existing) => {
                        sets[existing].add_parent(current);
                        existing
                    }
                    None => {
                        let id = sets.len();
                        candidate.set_id(id);
                        candidate.add_parent(current);
                        sets.push(candidate);
                        queue.push_back(id);
                        id
                    }
                };
                for member in group.iter() {
                    member.set_transition(target);
                }
            }
        }

        Some(sets)
    }

    // Resolves identifier elements to the non-terminal they name, where one
    // exists in the section. Unresolved identifiers are terminal references.
    fn bind_token_nt_refs(context: &Context, section: Section) {
        for nonterm in context.non_terminals(section) {
            for rule in nonterm.rules() {
                for elem in rule.elems() {
                    if elem.kind() != TokenKind::Identifier {
                        continue;
                    }
                    if let Some(target) = context.non_terminal(section, elem.value()) {
                        elem.bind(&target);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::CharSet;
    use crate::errors::Reporter;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn build_section(text: &str, section: Section) -> (Context, Vec<ItemSet>) {
        let context = Context::new();
        let reporter = Reporter::new();
        let mut scanner = Scanner::new("test.sx", text);
        let mut parser = Parser::new(&context, &reporter);
        parser.parse(&mut scanner).unwrap();
        parser.finalize().unwrap();
        let sets = ItemSetBuilder::build(&context, section, &LStr::intern("__start__"))
            .expect("section should define __start__");
        (context, sets)
    }

    #[test]
    fn missing_start_symbol_yields_no_graph() {
        let context = Context::new();
        assert!(
            ItemSetBuilder::build(&context, Section::Grammar, &LStr::intern("__start__")).is_none()
        );
    }

    #[test]
    fn ids_match_arena_positions() {
        let (_, sets) =
            build_section("[grammar]\nexpr : expr '+' expr | 'n' ;\n", Section::Grammar);
        for (position, set) in sets.iter().enumerate() {
            assert_eq!(set.id(), position);
        }
    }

    #[test]
    fn no_orphan_transitions() {
        let (_, sets) =
            build_section("[grammar]\nexpr : expr '+' expr | 'n' ;\n", Section::Grammar);
        for set in sets.iter() {
            for item in set.items() {
                if let Some(target) = item.transition() {
                    assert!(target < sets.len());
                }
            }
        }
    }

    #[test]
    fn duplicate_candidates_are_rewired_to_the_surviving_twin() {
        let (_, sets) =
            build_section("[grammar]\nexpr : expr '+' expr | 'n' ;\n", Section::Grammar);
        // The classic expression grammar: six states, with the 'n' state and
        // the "expr '+' . expr" state each reached from two places.
        assert_eq!(sets.len(), 6);
        assert!(sets.iter().any(|set| set.parents().len() > 1));
        // Every non-reduce item is wired inside the arena.
        for set in sets.iter() {
            for item in set.items() {
                assert_eq!(item.elem().is_some(), item.transition().is_some());
            }
        }
    }

    #[test]
    fn root_closure_pulls_in_referenced_productions() {
        let (_, sets) = build_section(
            "[lexicon]\nt : a | b ;\na : [a-c] ;\nb : [b-d] ;\n",
            Section::Lexicon,
        );
        let root = &sets[0];
        // __start__ (2) + __tokens (2) + t (2) + factorized literals of a/b.
        let literal_classes: Vec<CharSet> = root
            .items()
            .iter()
            .filter(|item| {
                item.elem()
                    .map(|elem| elem.kind().is_literal())
                    .unwrap_or(false)
            })
            .map(|item| CharSet::from_pattern(item.elem().unwrap().value().as_str()))
            .collect();
        let mut distinct: Vec<CharSet> = Vec::new();
        for class in literal_classes.iter() {
            if !distinct.contains(class) {
                distinct.push(*class);
            }
        }
        assert_eq!(distinct.len(), 3);
        assert!(distinct.contains(&CharSet::from_pattern("[a]")));
        assert!(distinct.contains(&CharSet::from_pattern("[bc]")));
        assert!(distinct.contains(&CharSet::from_pattern("[d]")));
    }

    #[test]
    fn factorized_classes_transition_separately() {
        let (_, sets) = build_section(
            "[lexicon]\nt : a | b ;\na : [a-c] ;\nb : [b-d] ;\n",
            Section::Lexicon,
        );
        let root = &sets[0];
        let overlap = CharSet::from_pattern("[bc]");
        let targets: Vec<_> = root
            .items()
            .iter()
            .filter(|item| {
                item.elem()
                    .map(|elem| {
                        elem.kind().is_literal()
                            && CharSet::from_pattern(elem.value().as_str()) == overlap
                    })
                    .unwrap_or(false)
            })
            .map(|item| item.transition().unwrap())
            .collect();
        // Both overlap items ([b-c] from a's rule and from b's rule) shift
        // into the same successor state.
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0], targets[1]);
    }
}
