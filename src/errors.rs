// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::strings::LStr;
use crate::token::Token;

// Four-digit diagnostic codes. First digit is the gravity (1-4 warning,
// 5-7 error, 8-9 fatal), second digit the stage (1 load, 2 scanner,
// 3 parser, 4 generator).

pub const E_UNEXPECTED_EOF: u16 = 8201;

pub const E_EXPECTED_LBRACKET: u16 = 8301;
pub const E_EXPECTED_IDENTIFIER: u16 = 8302;
pub const E_EXPECTED_RBRACKET: u16 = 8303;
pub const E_INCORRECT_SECTION: u16 = 8304;
pub const E_EXPECTED_COLON: u16 = 8305;
pub const E_MISSING_SEMICOLON: u16 = 8306;
pub const E_UNEXPECTED_ELEM: u16 = 8307;
pub const E_EXPECTED_VALUE: u16 = 8308;
pub const E_EXPECTED_RPAREN: u16 = 8309;
pub const E_INCONSISTENT_TYPE: u16 = 8310;
pub const E_EXPECTED_LPAREN: u16 = 8311;
pub const E_EXPECTED_LNONTERM: u16 = 8312;
pub const E_EXPECTED_RPAREN2: u16 = 8313;
pub const E_EXPECTED_COLON2: u16 = 8314;
pub const E_EXPECTED_ITEM: u16 = 8315;
pub const E_EXPECTED_COMMA: u16 = 8316;

pub const E_INVALID_RECURSION: u16 = 4301;
pub const E_REQUIRED_ELEM: u16 = 4302;
pub const E_NOT_ALLOWED_VALUE: u16 = 4303;
pub const E_INFER_FAILED: u16 = 4304;

pub const E_UNDEF_NONTERM: u16 = 8401;
pub const E_REDUCE_REDUCE: u16 = 8402;
pub const E_SHIFT_REDUCE: u16 = 8403;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn of(code: u16) -> Severity {
        match code / 1000 {
            1..=4 => Severity::Warning,
            5..=7 => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

/// One structured record pushed by a builder.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: u16,
    pub message: String,
    pub source: Option<LStr>,
    pub line: u32,
    pub col: u32,
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        Severity::of(self.code)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let letter = if self.code <= 4999 { 'W' } else { 'E' };
        match &self.source {
            Some(source) => write!(
                f,
                "[{}{}] {} {},{}: {}",
                letter, self.code, source, self.line, self.col, self.message
            ),
            None => write!(f, "[{}{}]: {}", letter, self.code, self.message),
        }
    }
}

#[derive(Debug, Default)]
struct ReporterData {
    records: RefCell<Vec<Diagnostic>>,
}

/// Shared diagnostic sink. Builders push records; the driver renders them
/// and maps the worst severity to the process exit code.
#[derive(Debug, Clone, Default)]
pub struct Reporter(Rc<ReporterData>);

impl Reporter {
    pub fn new() -> Reporter {
        Reporter::default()
    }

    pub fn report(&self, code: u16, token: Option<&Token>, message: String) {
        let (source, line, col) = match token {
            Some(token) => (Some(token.source().clone()), token.line(), token.col()),
            None => (None, 0, 0),
        };
        self.0.records.borrow_mut().push(Diagnostic {
            code,
            message,
            source,
            line,
            col,
        });
    }

    pub fn records(&self) -> Vec<Diagnostic> {
        self.0.records.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.records.borrow().is_empty()
    }

    pub fn warning_count(&self) -> usize {
        self.count_of(Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.count_of(Severity::Error)
    }

    pub fn has_fatal(&self) -> bool {
        self.count_of(Severity::Fatal) > 0
    }

    pub fn has_code(&self, code: u16) -> bool {
        self.0.records.borrow().iter().any(|record| record.code == code)
    }

    pub fn worst(&self) -> Option<Severity> {
        self.0
            .records
            .borrow()
            .iter()
            .map(|record| record.severity())
            .max()
    }

    /// Warnings never abort; anything of error gravity or worse maps to the
    /// grammar-semantic exit code.
    pub fn exit_code(&self) -> i32 {
        match self.worst() {
            Some(Severity::Error) | Some(Severity::Fatal) => 2,
            _ => 0,
        }
    }

    fn count_of(&self, severity: Severity) -> usize {
        self.0
            .records
            .borrow()
            .iter()
            .filter(|record| record.severity() == severity)
            .count()
    }
}
