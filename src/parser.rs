// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::BTreeSet;
use std::fmt;

use crate::context::{Context, Section};
use crate::errors::*;
use crate::nonterminal::NonTerminal;
use crate::production::{ProductionRule, Visibility};
use crate::scanner::Scanner;
use crate::strings::LStr;
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Syntax,
    Inference,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Syntax => write!(f, "syntax error"),
            Error::Inference => write!(f, "return-type inference failed"),
        }
    }
}

fn is_symbol(token: &Token, symbol: char) -> bool {
    token.kind() == TokenKind::Symbol && token.first_byte() == symbol as u8
}

/// Consumes scanner tokens and populates the grammar context. The state
/// machine mirrors the section layout of the source language:
///
///   0 between sections          5 production body
///   1 section header            6 element value (nvalue)
///   2 non-terminal intro        7 value close
///   3 return-type or colon      8 ignored value close (lexicon)
///   4 production alternation    9 array declaration
pub struct Parser<'a> {
    context: &'a Context,
    reporter: Reporter,
    finished: u8,
}

impl<'a> Parser<'a> {
    pub fn new(context: &'a Context, reporter: &Reporter) -> Parser<'a> {
        Parser {
            context,
            reporter: reporter.clone(),
            finished: 0,
        }
    }

    fn errmsg(&self, token: Option<&Token>, code: u16, message: String) {
        self.reporter.report(code, token, message);
    }

    fn expect_next(&self, scanner: &mut Scanner, last: &Token) -> Result<Token, Error> {
        match scanner.next_token() {
            Some(token) => Ok(token),
            None => {
                self.errmsg(
                    Some(last),
                    E_UNEXPECTED_EOF,
                    "Unexpected end of file encountered.".to_string(),
                );
                Err(Error::Syntax)
            }
        }
    }

    /// Parses one source file into the shared context. Returns at the first
    /// fatal error; warnings accumulate in the reporter.
    pub fn parse(&mut self, scanner: &mut Scanner) -> Result<(), Error> {
        let mut state = 0u8;
        let mut cur_section = Section::Lexicon;
        let mut nonterm: Option<NonTerminal> = None;
        let mut production: Option<ProductionRule> = None;
        let mut pending: Option<Token> = None;
        let mut last: Option<Token> = None;

        loop {
            let token = match pending.take().or_else(|| scanner.next_token()) {
                Some(token) => token,
                None => {
                    // Only section boundaries accept end of input.
                    if state == 0 || state == 2 || state == 9 {
                        break;
                    }
                    self.errmsg(
                        last.as_ref(),
                        E_UNEXPECTED_EOF,
                        "Unexpected end of file encountered.".to_string(),
                    );
                    return Err(Error::Syntax);
                }
            };
            last = Some(token.clone());

            match state {
                // Between sections.
                0 => {
                    if !is_symbol(&token, '[') {
                        self.errmsg(
                            Some(&token),
                            E_EXPECTED_LBRACKET,
                            "Left bracket '[' expected.".to_string(),
                        );
                        return Err(Error::Syntax);
                    }
                    state = 1;
                }

                // Section header body.
                1 => {
                    if token.kind() != TokenKind::Identifier {
                        self.errmsg(
                            Some(&token),
                            E_EXPECTED_IDENTIFIER,
                            "Identifier expected.".to_string(),
                        );
                        return Err(Error::Syntax);
                    }
                    state = match token.value().as_str() {
                        "lexicon" => {
                            cur_section = Section::Lexicon;
                            2
                        }
                        "grammar" => {
                            cur_section = Section::Grammar;
                            2
                        }
                        "arrays" => 9,
                        other => {
                            self.errmsg(
                                Some(&token),
                                E_INCORRECT_SECTION,
                                format!("Invalid section name specified: `{}'", other),
                            );
                            return Err(Error::Syntax);
                        }
                    };
                    let closing = self.expect_next(scanner, &token)?;
                    if !is_symbol(&closing, ']') {
                        self.errmsg(
                            Some(&closing),
                            E_EXPECTED_RBRACKET,
                            "Right bracket ']' expected.".to_string(),
                        );
                        return Err(Error::Syntax);
                    }
                }

                // Non-terminal introduction.
                2 => {
                    if token.kind() != TokenKind::Identifier {
                        if token.kind() != TokenKind::Symbol {
                            self.errmsg(
                                Some(&token),
                                E_EXPECTED_IDENTIFIER,
                                "Identifier expected.".to_string(),
                            );
                            return Err(Error::Syntax);
                        }
                        pending = Some(token);
                        state = 0;
                        continue;
                    }
                    let fresh = NonTerminal::new(
                        self.context.next_id(cur_section),
                        token.value().clone(),
                    );
                    nonterm = Some(self.context.add_non_terminal(cur_section, fresh));
                    state = 3;
                }

                // Return-type or colon.
                3 => {
                    let nonterm = nonterm.as_ref().expect("state 3 follows state 2");
                    if token.kind() == TokenKind::Block {
                        nonterm.set_return_type(LStr::intern(token.value().as_str().trim()));
                        continue;
                    }
                    if !is_symbol(&token, ':') {
                        self.errmsg(
                            Some(&token),
                            E_EXPECTED_COLON,
                            format!("Missing ':' after `{}'.", nonterm.name()),
                        );
                        return Err(Error::Syntax);
                    }
                    production = Some(ProductionRule::new(nonterm.next_rule_id(), nonterm));
                    state = 5;
                }

                // Production alternation: attach action, close or continue.
                4 => {
                    let nonterm = nonterm.as_ref().expect("state 4 requires a non-terminal");
                    let rule = production.as_ref().expect("state 4 requires a production");
                    if token.kind() == TokenKind::Block {
                        rule.set_action(LStr::intern(token.value().as_str().trim()));
                        continue;
                    }
                    if is_symbol(&token, ';') {
                        nonterm.add_rule(rule.clone());
                        state = 2;
                        continue;
                    }
                    if is_symbol(&token, '|') {
                        nonterm.add_rule(rule.clone());
                        production = Some(ProductionRule::new(nonterm.next_rule_id(), nonterm));
                        state = 5;
                        continue;
                    }
                    self.errmsg(
                        Some(&token),
                        E_MISSING_SEMICOLON,
                        format!("Missing ';' in definition of `{}'.", nonterm.name()),
                    );
                    return Err(Error::Syntax);
                }

                // Production body.
                5 => {
                    let nonterm = nonterm.as_ref().expect("state 5 requires a non-terminal");
                    let rule = production.as_ref().expect("state 5 requires a production");
                    match token.kind() {
                        TokenKind::Block => {
                            pending = Some(token);
                            state = 4;
                        }
                        TokenKind::Symbol => match token.first_byte() {
                            b'[' => {
                                // A bare character class: reassemble the
                                // bracket pattern the scanner split apart.
                                let mut pattern = String::from("[");
                                loop {
                                    let part = self.expect_next(scanner, &token)?;
                                    if is_symbol(&part, ']') {
                                        pattern.push(']');
                                        break;
                                    }
                                    pattern.push_str(part.value().as_str());
                                }
                                rule.add_elem(Token::new(
                                    TokenKind::SqString,
                                    &pattern,
                                    token.source(),
                                    token.line(),
                                    token.col(),
                                ));
                            }
                            b'(' => {
                                if cur_section == Section::Lexicon {
                                    self.errmsg(
                                        Some(&token),
                                        E_NOT_ALLOWED_VALUE,
                                        "Element values are not allowed in lexical grammar."
                                            .to_string(),
                                    );
                                }
                                state = 6;
                            }
                            b';' | b'|' => {
                                if rule.len() == 1
                                    && rule.first_elem().expect("len is 1").value()
                                        == nonterm.name()
                                {
                                    self.errmsg(
                                        Some(&token),
                                        E_INVALID_RECURSION,
                                        format!(
                                            "Conflictive recursive rule (#{}) in definition of `{}`.",
                                            rule.id(),
                                            nonterm.name()
                                        ),
                                    );
                                }
                                if rule.visibility() == Visibility::Public
                                    && cur_section == Section::Lexicon
                                {
                                    if rule.is_empty() {
                                        self.errmsg(
                                            Some(&token),
                                            E_REQUIRED_ELEM,
                                            format!(
                                                "Required at least one element to export {}#{}.",
                                                nonterm.name(),
                                                rule.id()
                                            ),
                                        );
                                    } else {
                                        self.context.add_export(
                                            cur_section,
                                            rule.first_elem()
                                                .expect("not empty")
                                                .value()
                                                .clone(),
                                            rule.clone(),
                                        );
                                    }
                                }
                                // Grammar-section exports are undefined for now.
                                pending = Some(token);
                                state = 4;
                            }
                            b'+' => rule.set_visibility(Visibility::Public),
                            b'-' => rule.set_visibility(Visibility::Private),
                            _ => {
                                self.errmsg(
                                    Some(&token),
                                    E_UNEXPECTED_ELEM,
                                    format!(
                                        "Unexpected `{}` found in definition of `{}'.",
                                        token.value(),
                                        nonterm.name()
                                    ),
                                );
                                return Err(Error::Syntax);
                            }
                        },
                        TokenKind::Identifier => rule.add_elem(token.derived()),
                        TokenKind::SqString | TokenKind::DqString => {
                            let value = token.value();
                            if cur_section == Section::Lexicon
                                && value.len() > 1
                                && value.first_byte() != Some(b'[')
                                && value.first_byte() != Some(b'\\')
                            {
                                // Multi-character literals scan one byte at a
                                // time, so expand them element per byte.
                                let bytes: Vec<u8> = value.as_str().bytes().collect();
                                for byte in bytes {
                                    let single = (byte as char).to_string();
                                    rule.add_elem(
                                        token.derived_with_value(LStr::intern(&single)),
                                    );
                                }
                            } else {
                                rule.add_elem(token.derived());
                            }
                        }
                        _ => {
                            self.errmsg(
                                Some(&token),
                                E_UNEXPECTED_ELEM,
                                format!(
                                    "Unexpected `{}` found in definition of `{}'.",
                                    token.value(),
                                    nonterm.name()
                                ),
                            );
                            return Err(Error::Syntax);
                        }
                    }
                }

                // Element value specifier.
                6 => {
                    let nonterm = nonterm.as_ref().expect("state 6 requires a non-terminal");
                    let rule = production.as_ref().expect("state 6 requires a production");
                    if !token.kind().is_literal() {
                        self.errmsg(
                            Some(&token),
                            E_EXPECTED_VALUE,
                            format!(
                                "Expected string value for `{}` in {}#{}.",
                                rule.elems()
                                    .last()
                                    .map(|elem| elem.value().as_str().to_string())
                                    .unwrap_or_default(),
                                nonterm.name(),
                                rule.id()
                            ),
                        );
                        return Err(Error::Syntax);
                    }
                    if cur_section == Section::Lexicon {
                        state = 8;
                    } else {
                        rule.add_elem(token.derived_as(TokenKind::NValue));
                        state = 7;
                    }
                }

                // Close of an element value.
                7 | 8 => {
                    if !is_symbol(&token, ')') {
                        let nonterm =
                            nonterm.as_ref().expect("states 7-8 require a non-terminal");
                        let rule =
                            production.as_ref().expect("states 7-8 require a production");
                        self.errmsg(
                            Some(&token),
                            E_EXPECTED_RPAREN,
                            format!(
                                "Missing right parenthesis after value of `{}` in {}#{}.",
                                rule.elems()
                                    .last()
                                    .map(|elem| elem.value().as_str().to_string())
                                    .unwrap_or_default(),
                                nonterm.name(),
                                rule.id()
                            ),
                        );
                        return Err(Error::Syntax);
                    }
                    state = 5;
                }

                // Array declaration.
                9 => {
                    if is_symbol(&token, '[') {
                        pending = Some(token);
                        state = 0;
                        continue;
                    }
                    if token.kind() != TokenKind::Identifier {
                        self.errmsg(
                            Some(&token),
                            E_EXPECTED_IDENTIFIER,
                            "Identifier expected.".to_string(),
                        );
                        return Err(Error::Syntax);
                    }
                    self.parse_array(scanner, &token)?;
                }

                _ => unreachable!("parser state out of range"),
            }
        }

        Ok(())
    }

    // Array ids are allocated from the lexicon counter because arrays become
    // additional token kinds of the generated scanner.
    fn parse_array(&mut self, scanner: &mut Scanner, name: &Token) -> Result<(), Error> {
        let fresh = NonTerminal::new(
            self.context.next_id(Section::Lexicon),
            name.value().clone(),
        );
        let nonterm = self.context.add_non_terminal(Section::Arrays, fresh);

        let token = self.expect_next(scanner, name)?;
        if !is_symbol(&token, '(') {
            self.errmsg(
                Some(&token),
                E_EXPECTED_LPAREN,
                format!("Missing left parenthesis on array: `{}'.", nonterm.name()),
            );
            return Err(Error::Syntax);
        }

        let backing = self.expect_next(scanner, &token)?;
        if backing.kind() != TokenKind::Identifier {
            self.errmsg(
                Some(&backing),
                E_EXPECTED_LNONTERM,
                format!(
                    "Expected lexical non-terminal name in array: `{}`.",
                    nonterm.name()
                ),
            );
            return Err(Error::Syntax);
        }
        nonterm.set_return_type(backing.value().clone());

        let token = self.expect_next(scanner, &backing)?;
        if !is_symbol(&token, ')') {
            self.errmsg(
                Some(&token),
                E_EXPECTED_RPAREN2,
                format!("Missing right parenthesis in array: `{}'.", nonterm.name()),
            );
            return Err(Error::Syntax);
        }

        let token = self.expect_next(scanner, &token)?;
        if !is_symbol(&token, ':') {
            self.errmsg(
                Some(&token),
                E_EXPECTED_COLON2,
                format!("Missing ':' in definition of array `{}'.", nonterm.name()),
            );
            return Err(Error::Syntax);
        }

        let rule = ProductionRule::new(nonterm.next_rule_id(), &nonterm);
        let mut last = token;
        loop {
            let token = match scanner.next_token() {
                Some(token) => token,
                None => {
                    self.errmsg(
                        Some(&last),
                        E_MISSING_SEMICOLON,
                        format!("Missing ';' in definition of `{}'.", nonterm.name()),
                    );
                    return Err(Error::Syntax);
                }
            };
            if is_symbol(&token, ';') {
                break;
            }
            if !token.kind().is_literal() {
                self.errmsg(
                    Some(&token),
                    E_EXPECTED_ITEM,
                    format!(
                        "Expected item value (string) in array: `{}'.",
                        nonterm.name()
                    ),
                );
                return Err(Error::Syntax);
            }
            rule.add_elem(token.derived());
            last = token;

            let token = match scanner.next_token() {
                Some(token) => token,
                None => {
                    self.errmsg(
                        Some(&last),
                        E_MISSING_SEMICOLON,
                        format!("Missing ';' in definition of `{}'.", nonterm.name()),
                    );
                    return Err(Error::Syntax);
                }
            };
            if is_symbol(&token, ';') {
                break;
            }
            if !is_symbol(&token, ',') {
                self.errmsg(
                    Some(&token),
                    E_EXPECTED_COMMA,
                    format!(
                        "Expected comma (,) after `{}` in array: `{}'.",
                        last.value(),
                        nonterm.name()
                    ),
                );
                return Err(Error::Syntax);
            }
            last = token;
        }

        nonterm.add_rule(rule.clone());
        self.context
            .add_export(Section::Lexicon, nonterm.name().clone(), rule);
        Ok(())
    }

    /// Runs once after every input file has been parsed: promotes the first
    /// lexicon non-terminal's productions to exports, installs the synthetic
    /// start symbols and infers grammar return types.
    pub fn finalize(&mut self) -> Result<(), Error> {
        let source = LStr::intern("");
        let synth = |kind: TokenKind, value: &str| Token::new(kind, value, &source, 0, 0);

        if let Some((first_name, first_nt)) = self.context.first_non_terminal(Section::Lexicon) {
            if self.finished & 1 == 0 {
                for rule in first_nt.rules() {
                    if rule.visibility() != Visibility::Default {
                        continue;
                    }
                    if rule.is_empty() {
                        rule.set_visibility(Visibility::Private);
                    } else {
                        self.context.add_export(
                            Section::Lexicon,
                            rule.first_elem().expect("not empty").value().clone(),
                            rule.clone(),
                        );
                        rule.set_visibility(Visibility::Public);
                    }
                }

                let start = self.context.add_non_terminal(
                    Section::Lexicon,
                    NonTerminal::new(0, LStr::intern("__start__")),
                );

                let tokens = self.context.add_non_terminal(
                    Section::Lexicon,
                    NonTerminal::new(
                        self.context.next_id(Section::Lexicon),
                        LStr::intern("__tokens"),
                    ),
                );

                let rule = ProductionRule::new(tokens.next_rule_id(), &tokens);
                rule.add_elem(synth(TokenKind::Identifier, "__tokens"));
                rule.add_elem(synth(TokenKind::Identifier, first_name.as_str()));
                tokens.add_rule(rule);

                let rule = ProductionRule::new(tokens.next_rule_id(), &tokens);
                rule.add_elem(synth(TokenKind::Identifier, first_name.as_str()));
                tokens.add_rule(rule);

                let rule = ProductionRule::new(start.next_rule_id(), &start);
                rule.add_elem(synth(TokenKind::Identifier, "__tokens"));
                rule.add_elem(synth(TokenKind::End, ""));
                start.add_rule(rule);

                let rule = ProductionRule::new(start.next_rule_id(), &start);
                rule.add_elem(synth(TokenKind::End, ""));
                start.add_rule(rule);

                self.finished |= 1;
            }
        }

        if let Some((first_name, _)) = self.context.first_non_terminal(Section::Grammar) {
            if self.finished & 2 == 0 {
                let start = self.context.add_non_terminal(
                    Section::Grammar,
                    NonTerminal::new(0, LStr::intern("__start__")),
                );

                let rule = ProductionRule::new(start.next_rule_id(), &start);
                rule.add_elem(synth(TokenKind::Identifier, first_name.as_str()));
                rule.add_elem(synth(TokenKind::End, ""));
                rule.set_action(LStr::intern("$0"));
                start.add_rule(rule);

                self.finished |= 2;

                if !self.ensure_type_consistency(Section::Grammar) {
                    return Err(Error::Inference);
                }
            }
        }

        Ok(())
    }

    /// Fixed-point return-type inference over the section. Returns false if
    /// a fatal inconsistency was found.
    fn ensure_type_consistency(&self, section: Section) -> bool {
        let mut settled: BTreeSet<u32> = BTreeSet::new();
        let mut consistent = true;

        loop {
            let mut progress = false;
            let mut deferred: Vec<NonTerminal> = Vec::new();

            for nonterm in self.context.non_terminals(section) {
                if nonterm.return_type().is_some() || settled.contains(&nonterm.id()) {
                    continue;
                }

                let mut candidate: Option<LStr> = None;
                let mut has_terminals = false;
                let mut empty_rules = 0;
                let mut waiting = false;
                let mut failed = false;

                for rule in nonterm.rules() {
                    if rule.is_empty() {
                        empty_rules += 1;
                        continue;
                    }

                    // A rule contributes a candidate only through exactly one
                    // non-self identifier reference.
                    let mut reference: Option<LStr> = None;
                    let mut multiple = false;
                    for elem in rule.elems() {
                        if elem.kind() != TokenKind::Identifier {
                            continue;
                        }
                        if elem.value() == nonterm.name() {
                            continue;
                        }
                        if reference.is_none() {
                            reference = Some(elem.value().clone());
                        } else {
                            multiple = true;
                            break;
                        }
                    }

                    let reference = match reference {
                        Some(reference) if !multiple => reference,
                        _ => {
                            has_terminals = true;
                            continue;
                        }
                    };

                    let target = match self.context.non_terminal(section, &reference) {
                        Some(target) => target,
                        None => {
                            has_terminals = true;
                            continue;
                        }
                    };

                    match target.return_type() {
                        Some(found) => match &candidate {
                            None => candidate = Some(found),
                            Some(existing) if *existing == found => (),
                            Some(_) => {
                                self.errmsg(
                                    None,
                                    E_INCONSISTENT_TYPE,
                                    format!(
                                        "Return types are inconsistent in `{}`.",
                                        nonterm.name()
                                    ),
                                );
                                consistent = false;
                                failed = true;
                                break;
                            }
                        },
                        None => {
                            if settled.contains(&target.id()) {
                                self.errmsg(
                                    None,
                                    E_INFER_FAILED,
                                    format!(
                                        "Unable to infer return type for `{}`.",
                                        nonterm.name()
                                    ),
                                );
                                failed = true;
                                break;
                            }
                            waiting = true;
                        }
                    }
                }

                if failed {
                    settled.insert(nonterm.id());
                    progress = true;
                    continue;
                }
                if waiting {
                    deferred.push(nonterm);
                    continue;
                }
                if let Some(candidate) = candidate {
                    nonterm.set_return_type(candidate);
                } else if has_terminals || nonterm.rule_count() == empty_rules {
                    nonterm.set_return_type(LStr::intern("void *"));
                } else {
                    settled.insert(nonterm.id());
                    continue;
                }
                progress = true;
            }

            if deferred.is_empty() {
                break;
            }
            if !progress {
                // Mutual recursion with no declared anchor: report each
                // remaining symbol once and stop.
                for nonterm in deferred {
                    self.errmsg(
                        None,
                        E_INFER_FAILED,
                        format!("Unable to infer return type for `{}`.", nonterm.name()),
                    );
                    settled.insert(nonterm.id());
                }
                break;
            }
        }

        consistent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_text(context: &Context, reporter: &Reporter, text: &str) -> Result<(), Error> {
        let mut scanner = Scanner::new("test.sx", text);
        let mut parser = Parser::new(context, reporter);
        parser.parse(&mut scanner)?;
        parser.finalize()
    }

    #[test]
    fn lexicon_literals_expand_per_byte() {
        let context = Context::new();
        let reporter = Reporter::new();
        parse_text(&context, &reporter, "[lexicon]\nkw : \"if\" ;\n").unwrap();
        let kw = context
            .non_terminal(Section::Lexicon, &LStr::intern("kw"))
            .unwrap();
        let rule = kw.rule(0).unwrap();
        assert_eq!(rule.len(), 2);
        assert_eq!(rule.elem(0).unwrap().value().as_str(), "i");
        assert_eq!(rule.elem(1).unwrap().value().as_str(), "f");
    }

    #[test]
    fn bracket_and_escape_literals_pass_through() {
        let context = Context::new();
        let reporter = Reporter::new();
        parse_text(
            &context,
            &reporter,
            "[lexicon]\nletter : [a-z] ;\nnl : '\\n' ;\n",
        )
        .unwrap();
        let letter = context
            .non_terminal(Section::Lexicon, &LStr::intern("letter"))
            .unwrap();
        assert_eq!(letter.rule(0).unwrap().len(), 1);
        let nl = context
            .non_terminal(Section::Lexicon, &LStr::intern("nl"))
            .unwrap();
        assert_eq!(nl.rule(0).unwrap().len(), 1);
        assert_eq!(nl.rule(0).unwrap().elem(0).unwrap().value().as_str(), "\\n");
    }

    #[test]
    fn finalization_installs_the_synthetic_symbols() {
        let context = Context::new();
        let reporter = Reporter::new();
        parse_text(
            &context,
            &reporter,
            "[lexicon]\ntokens : word ;\nword : letter word | letter ;\nletter : [a-z] ;\n",
        )
        .unwrap();

        let start = context
            .non_terminal(Section::Lexicon, &LStr::intern("__start__"))
            .unwrap();
        assert_eq!(start.id(), 0);
        assert_eq!(start.rule_count(), 2);

        let tokens = context
            .non_terminal(Section::Lexicon, &LStr::intern("__tokens"))
            .unwrap();
        assert_eq!(tokens.rule_count(), 2);
        let accum = tokens.rule(0).unwrap();
        assert_eq!(accum.elem(0).unwrap().value().as_str(), "__tokens");
        assert_eq!(accum.elem(1).unwrap().value().as_str(), "tokens");

        // The first non-terminal's productions became public exports.
        let exports = context.exports(Section::Lexicon);
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].0.as_str(), "word");
        let first = context
            .non_terminal(Section::Lexicon, &LStr::intern("tokens"))
            .unwrap();
        assert_eq!(first.rule(0).unwrap().visibility(), Visibility::Public);
    }

    #[test]
    fn empty_default_rules_turn_private() {
        let context = Context::new();
        let reporter = Reporter::new();
        parse_text(
            &context,
            &reporter,
            "[lexicon]\ntokens : word | ;\nword : [a-z] ;\n",
        )
        .unwrap();
        let first = context
            .non_terminal(Section::Lexicon, &LStr::intern("tokens"))
            .unwrap();
        assert_eq!(first.rule(1).unwrap().visibility(), Visibility::Private);
    }

    #[test]
    fn nvalues_attach_in_the_grammar_section() {
        let context = Context::new();
        let reporter = Reporter::new();
        parse_text(
            &context,
            &reporter,
            "[grammar]\nstmt : id ('if') expr ;\nexpr : 'n' ;\n",
        )
        .unwrap();
        let stmt = context
            .non_terminal(Section::Grammar, &LStr::intern("stmt"))
            .unwrap();
        let rule = stmt.rule(0).unwrap();
        assert_eq!(rule.len(), 2);
        let nvalue = rule.elem(0).unwrap().nvalue().unwrap();
        assert_eq!(nvalue.kind(), TokenKind::NValue);
        assert_eq!(nvalue.value().as_str(), "if");
    }

    #[test]
    fn nvalues_are_rejected_in_the_lexicon() {
        let context = Context::new();
        let reporter = Reporter::new();
        parse_text(
            &context,
            &reporter,
            "[lexicon]\nword : id ('if') ;\nid : [a-z] ;\n",
        )
        .unwrap();
        assert!(reporter.has_code(E_NOT_ALLOWED_VALUE));
        let word = context
            .non_terminal(Section::Lexicon, &LStr::intern("word"))
            .unwrap();
        assert!(word.rule(0).unwrap().elem(0).unwrap().nvalue().is_none());
    }

    #[test]
    fn self_only_recursion_is_flagged() {
        let context = Context::new();
        let reporter = Reporter::new();
        parse_text(&context, &reporter, "[grammar]\nloop : loop | 'x' ;\n").unwrap();
        assert!(reporter.has_code(E_INVALID_RECURSION));
    }

    #[test]
    fn arrays_map_keywords_onto_a_lexicon_symbol() {
        let context = Context::new();
        let reporter = Reporter::new();
        parse_text(
            &context,
            &reporter,
            "[lexicon]\ntokens : id ;\nid : [a-z] id | [a-z] ;\n[arrays]\nkw (id) : 'if', 'else' ;\n",
        )
        .unwrap();

        let kw = context
            .non_terminal(Section::Arrays, &LStr::intern("kw"))
            .unwrap();
        assert_eq!(kw.return_type().unwrap().as_str(), "id");
        let rule = kw.rule(0).unwrap();
        assert_eq!(rule.len(), 2);
        assert_eq!(rule.elem(0).unwrap().value().as_str(), "if");
        assert_eq!(rule.elem(1).unwrap().value().as_str(), "else");
        assert!(context.has_export(Section::Lexicon, &LStr::intern("kw")));
    }

    #[test]
    fn missing_semicolon_is_fatal() {
        let context = Context::new();
        let reporter = Reporter::new();
        let status = parse_text(&context, &reporter, "[lexicon]\nword : [a-z]\n");
        assert_eq!(status, Err(Error::Syntax));
        assert!(reporter.has_code(E_UNEXPECTED_EOF));
    }

    #[test]
    fn invalid_section_names_are_fatal() {
        let context = Context::new();
        let reporter = Reporter::new();
        let status = parse_text(&context, &reporter, "[tokens]\n");
        assert_eq!(status, Err(Error::Syntax));
        assert!(reporter.has_code(E_INCORRECT_SECTION));
    }

    #[test]
    fn return_types_flow_through_single_references() {
        let context = Context::new();
        let reporter = Reporter::new();
        parse_text(
            &context,
            &reporter,
            "[grammar]\na {int} : b ;\nb : 'x' ;\nc : a ;\n",
        )
        .unwrap();
        let a = context
            .non_terminal(Section::Grammar, &LStr::intern("a"))
            .unwrap();
        assert_eq!(a.return_type().unwrap().as_str(), "int");
        // b only derives terminals, so it falls back to the generic pointer.
        let b = context
            .non_terminal(Section::Grammar, &LStr::intern("b"))
            .unwrap();
        assert_eq!(b.return_type().unwrap().as_str(), "void *");
        let c = context
            .non_terminal(Section::Grammar, &LStr::intern("c"))
            .unwrap();
        assert_eq!(c.return_type().unwrap().as_str(), "int");
    }

    #[test]
    fn conflicting_candidate_types_are_inconsistent() {
        let context = Context::new();
        let reporter = Reporter::new();
        let status = parse_text(
            &context,
            &reporter,
            "[grammar]\na {int} : 'x' ;\nb {long} : 'y' ;\nc : a | b ;\n",
        );
        assert_eq!(status, Err(Error::Inference));
        assert!(reporter.has_code(E_INCONSISTENT_TYPE));
    }

    #[test]
    fn unresolvable_cycles_warn_and_continue() {
        let context = Context::new();
        let reporter = Reporter::new();
        parse_text(&context, &reporter, "[grammar]\na : b ;\nb : a ;\n").unwrap();
        assert!(reporter.has_code(E_INFER_FAILED));
        let a = context
            .non_terminal(Section::Grammar, &LStr::intern("a"))
            .unwrap();
        assert!(a.return_type().is_none());
    }
}
