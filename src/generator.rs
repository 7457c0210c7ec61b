// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::BTreeSet;
use std::io;
use std::io::Write;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::context::Section;
use crate::production::ProductionRule;
use crate::state::FsmState;

pub mod cpp;

lazy_static! {
    static ref MARKER_CRE: Regex = Regex::new(r"\$(\$?)(\d+)").unwrap();
}

/// The "null" return-type sentinel: reductions of such non-terminals push
/// no value.
pub fn is_null_type(name: &str) -> bool {
    match name {
        "null" | "nullptr" | "NULL" => true,
        _ => false,
    }
}

/// Pointer-free slot types need no cleanup when left unused.
pub fn is_primitive_type(name: &str) -> bool {
    match name {
        "null" | "nullptr" | "char" | "short" | "int" | "long" | "float" | "double" => true,
        _ => false,
    }
}

fn slot_type(rule: &ProductionRule, index: usize, default_type: &str) -> String {
    rule.elem(index)
        .and_then(|elem| elem.non_terminal())
        .and_then(|nonterm| nonterm.return_type())
        .map(|found| found.as_str().to_string())
        .unwrap_or_else(|| default_type.to_string())
}

/// Rewrites `$k` and `$$k` markers of an action body into typed `argv`
/// accesses. `$k` marks slot k as consumed; `$$k` expands identically but
/// leaves the slot flagged unused. Returns the rendered body and the list
/// of unused slots with their static types, for cleanup emission.
pub fn expand_action(
    action: &str,
    rule: &ProductionRule,
    default_type: &str,
) -> (String, Vec<(usize, String)>) {
    let max = rule.len();
    let mut used: BTreeSet<usize> = BTreeSet::new();

    let body = MARKER_CRE
        .replace_all(action.trim_start(), |caps: &Captures| {
            let keep = !caps[1].is_empty();
            let index: usize = caps[2].parse().unwrap_or(usize::MAX);
            if index >= max {
                return String::new();
            }
            if !keep {
                used.insert(index);
            }
            let found = slot_type(rule, index, default_type);
            if is_null_type(&found) {
                format!("argv[bp-{}]", max - index)
            } else {
                format!("(({})argv[bp-{}])", found, max - index)
            }
        })
        .to_string();

    let unused = (0..max)
        .filter(|index| !used.contains(index))
        .map(|index| (index, slot_type(rule, index, default_type)))
        .collect();

    (body, unused)
}

/// A language back-end: renders the FSM state list of one section through
/// its code template into the output sink.
pub trait Generator {
    fn generate(
        &self,
        states: &[FsmState],
        section: Section,
        name: &str,
        out: &mut dyn Write,
    ) -> io::Result<()>;
}
