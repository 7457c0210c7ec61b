// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::io;
use std::io::Write;

use crate::charset::CharSet;
use crate::context::{Context, Section};
use crate::generator::{expand_action, is_null_type, is_primitive_type, Generator};
use crate::production::Visibility;
use crate::state::{FsmState, ReduceAction};
use crate::strings::LStr;
use crate::token::Token;

const SCANNER_TEMPLATE: &str = include_str!("../../templates/scanner_cpp.tpl");
const PARSER_TEMPLATE: &str = include_str!("../../templates/parser_cpp.tpl");

const NL1: &str = "\n   ";
const NL2: &str = "\n       ";
const NL3: &str = "\n           ";
const NL4: &str = "\n               ";

/// C++ back-end. The scanner and parser templates are opaque text with `$`
/// markers; everything state-machine-shaped is produced here.
pub struct CppGenerator<'a> {
    context: &'a Context,
}

impl<'a> CppGenerator<'a> {
    pub fn new(context: &'a Context) -> CppGenerator<'a> {
        CppGenerator { context }
    }

    // Exported symbols are numbered from 256; byte classes use 0..255 and
    // -1 marks the end of input.
    fn export_id(&self, token: &Token) -> i32 {
        if token.is_end() {
            return -1;
        }
        self.export_id_of(token.value())
    }

    fn export_id_of(&self, name: &LStr) -> i32 {
        self.context
            .export_index(Section::Lexicon, name)
            .map(|index| index as i32 + 256)
            .unwrap_or(255)
    }

    fn start_return_type(&self, section: Section) -> Option<LStr> {
        self.context
            .non_terminal_by_id(section, 0)?
            .rule(0)?
            .elem(0)?
            .non_terminal()?
            .return_type()
    }

    fn start_type(&self, section: Section) -> String {
        match self.start_return_type(section) {
            Some(found) if !is_null_type(found.as_str()) => found.as_str().to_string(),
            _ => "void *".to_string(),
        }
    }

    fn start_is_null(&self, section: Section) -> bool {
        self.start_return_type(section)
            .map(|found| is_null_type(found.as_str()))
            .unwrap_or(false)
    }

    fn write_template(
        &self,
        template: &str,
        states: &[FsmState],
        section: Section,
        name: &str,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        let bytes = template.as_bytes();
        let mut position = 0;
        let mut span = 0;

        while position < bytes.len() {
            if bytes[position] != b'$' || position + 1 >= bytes.len() {
                position += 1;
                continue;
            }
            out.write_all(&bytes[span..position])?;
            let marker = bytes[position + 1];
            position += 2;
            span = position;
            match marker {
                b'0' => out.write_all(name.as_bytes())?,
                b'1' => self.write_states(states, section, out)?,
                b'E' => self.write_epilogue(section, out)?,
                b'T' => out.write_all(self.start_type(section).as_bytes())?,
                b'R' => {
                    let value = if self.start_is_null(section) {
                        "nullptr"
                    } else {
                        "argv[0]"
                    };
                    write!(out, "({}){}", self.start_type(section), value)?;
                }
                // Unrecognized markers are consumed without output.
                _ => (),
            }
        }
        out.write_all(&bytes[span..])?;
        Ok(())
    }

    fn write_reduction(
        &self,
        reduce: &ReduceAction,
        section: Section,
        nl: &str,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        let rule = &reduce.rule;
        write!(out, "{} nonterm = {};", nl, rule.non_terminal().id())?;
        write!(out, " release = {};", rule.len())?;
        write!(out, " reduce = {};", rule.visibility().code() + 1)?;

        if rule.visibility() == Visibility::Public {
            if let Some(first) = rule.first_elem() {
                write!(out, " code = {};", self.export_id(&first))?;
            }
        }

        if section == Section::Lexicon {
            return Ok(());
        }

        let is_null = rule
            .non_terminal()
            .return_type()
            .map(|found| is_null_type(found.as_str()))
            .unwrap_or(false);

        write!(out, " rule = {};", rule.id())?;
        write!(out, " shifted = {};", rule.len())?;
        write!(out, "{} ", nl)?;

        if !is_null {
            write!(out, "temp = (void *)(")?;
        }
        let action = rule.action();
        let (body, unused) = expand_action(
            action.as_ref().map(|text| text.as_str()).unwrap_or("nullptr"),
            rule,
            "Token *",
        );
        out.write_all(body.as_bytes())?;
        if !is_null {
            write!(out, ")")?;
        }
        write!(out, ";")?;

        for (index, slot) in unused {
            if is_primitive_type(&slot) {
                continue;
            }
            write!(
                out,
                "{} if (argv[bp-{}]) delete ({})argv[bp-{}];",
                nl,
                rule.len() - index,
                slot,
                rule.len() - index
            )?;
        }

        write!(
            out,
            "{} argv[bp-shifted] = {};",
            nl,
            if is_null { "nullptr" } else { "temp" }
        )?;
        Ok(())
    }

    fn write_condition(&self, follow: &[Token], out: &mut dyn Write) -> io::Result<()> {
        for (position, token) in follow.iter().enumerate() {
            if position > 0 {
                write!(out, " || ")?;
            }
            match token.nvalue() {
                Some(nvalue) => write!(
                    out,
                    "token->equals({}, \"{}\")",
                    self.export_id(token),
                    nvalue.value()
                )?,
                None => write!(out, "symbol=={}", self.export_id(token))?,
            }
        }
        Ok(())
    }

    fn write_states(
        &self,
        states: &[FsmState],
        section: Section,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        write!(out, "switch (state)\n{{")?;

        for state in states {
            write!(out, "{} case {}:", NL1, state.id())?;

            if !state.gotos().is_empty() {
                write!(out, "{} if (reduce)", NL2)?;
                write!(out, "{} {{", NL2)?;
                write!(out, "{} switch (nonterm)", NL3)?;
                write!(out, "{} {{", NL3)?;
                for goto in state.gotos() {
                    write!(
                        out,
                        "{} case {}: state = {}; break;",
                        NL4,
                        goto.nonterm.id(),
                        goto.next_state
                    )?;
                }
                write!(out, "{} }}\n", NL3)?;
                write!(out, "{} reduce = 0;", NL3)?;
                write!(out, "{} break;", NL3)?;
                write!(out, "{} }}\n", NL2)?;
            }

            let mut default_reduction: Option<&ReduceAction> = None;
            if section != Section::Lexicon {
                for reduce in state.reductions() {
                    match reduce.follow() {
                        None => default_reduction = Some(reduce),
                        Some(follow) => {
                            write!(out, "{} if (", NL2)?;
                            self.write_condition(&follow, out)?;
                            write!(out, ") {{")?;
                            self.write_reduction(reduce, section, NL3, out)?;
                            write!(out, "{} break;{} }}\n", NL3, NL2)?;
                        }
                    }
                }
            }

            if !state.shifts().is_empty() {
                write!(out, "{} switch (symbol)", NL2)?;
                write!(out, "{} {{", NL2)?;

                match section {
                    Section::Lexicon => {
                        for shift in state.shifts() {
                            write!(out, "{} ", NL3)?;
                            if shift.token.is_end() {
                                write!(out, "case -1: ")?;
                            } else {
                                let charset =
                                    CharSet::from_pattern(shift.token.value().as_str());
                                for byte in charset.bytes() {
                                    write!(out, "case {}: ", byte)?;
                                }
                            }
                            write!(
                                out,
                                "state = {}; shift = 1; break;",
                                shift.next_state
                            )?;
                        }
                    }
                    _ => {
                        let shifts = state.shifts();
                        let mut consumed = vec![false; shifts.len()];
                        for first in 0..shifts.len() {
                            if consumed[first] {
                                continue;
                            }
                            write!(out, "{} ", NL3)?;
                            if shifts[first].token.is_end() {
                                write!(
                                    out,
                                    "case -1: state = {}; shift = 1; break;",
                                    shifts[first].next_state
                                )?;
                                consumed[first] = true;
                                continue;
                            }
                            write!(out, "case {}: ", self.export_id(&shifts[first].token))?;
                            // Shifts on the same symbol but different
                            // nvalues render as guarded alternatives of a
                            // single case.
                            for second in first..shifts.len() {
                                if consumed[second] {
                                    continue;
                                }
                                if !shifts[second].token.shallow_eq(&shifts[first].token) {
                                    continue;
                                }
                                match shifts[second].token.nvalue() {
                                    Some(nvalue) => write!(
                                        out,
                                        "{} if (token->equals(\"{}\")) {{ state = {}; shift = 1; break; }}",
                                        NL4,
                                        nvalue.value(),
                                        shifts[second].next_state
                                    )?,
                                    None => write!(
                                        out,
                                        "state = {}; shift = 1;",
                                        shifts[second].next_state
                                    )?,
                                }
                                consumed[second] = true;
                            }
                            write!(out, "{} break;", NL4)?;
                        }
                    }
                }

                write!(out, "{} }}\n", NL2)?;
            }

            if default_reduction.is_some()
                || (!state.reductions().is_empty() && section == Section::Lexicon)
            {
                let reduce = match default_reduction {
                    Some(reduce) => reduce,
                    None => &state.reductions()[0],
                };
                if !state.shifts().is_empty() {
                    write!(out, "{} if (shift) break;\n", NL2)?;
                }
                self.write_reduction(reduce, section, NL2, out)?;
            } else if !state.shifts().is_empty() {
                write!(out, "{} if (!shift) error = 1;", NL2)?;
            }

            write!(out, "{} break;\n", NL2)?;
        }

        write!(out, "}}")?;
        Ok(())
    }

    /// Lexicon epilogue: the keyword-array reclassification table. A token
    /// of the backing kind whose text matches one of the array literals is
    /// retyped to the array's own export id.
    fn write_epilogue(&self, section: Section, out: &mut dyn Write) -> io::Result<()> {
        if section != Section::Lexicon {
            return Ok(());
        }
        let nl3 = "           ";
        for nonterm in self.context.non_terminals(Section::Arrays) {
            let backing = match nonterm.return_type() {
                Some(backing) => backing,
                None => continue,
            };
            let backing_id = self.export_id_of(&backing);
            let array_id = self.export_id_of(nonterm.name());
            write!(out, "{} if (token->getType() == {})\n", nl3, backing_id)?;
            write!(out, "{} {{", nl3)?;
            if let Some(rule) = nonterm.rule(0) {
                for elem in rule.elems() {
                    write!(
                        out,
                        "{} if (token->equals(\"{}\")) {{ return token->setType({}); }}",
                        NL4,
                        elem.value(),
                        array_id
                    )?;
                }
            }
            write!(out, "\n{} }}\n", nl3)?;
        }
        write!(out, "\n{} return token;", nl3)?;
        Ok(())
    }
}

impl<'a> Generator for CppGenerator<'a> {
    fn generate(
        &self,
        states: &[FsmState],
        section: Section,
        name: &str,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        let template = if section == Section::Lexicon {
            SCANNER_TEMPLATE
        } else {
            PARSER_TEMPLATE
        };
        self.write_template(template, states, section, name, out)
    }
}
