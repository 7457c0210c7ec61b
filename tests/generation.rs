// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::fs;
use std::io::prelude::*;

use sxgen::context::{Context, Section};
use sxgen::errors::{Reporter, E_REDUCE_REDUCE, E_SHIFT_REDUCE};
use sxgen::generator::cpp::CppGenerator;
use sxgen::generator::Generator;
use sxgen::itemset::builder::ItemSetBuilder;
use sxgen::itemset::ItemSet;
use sxgen::parser::Parser;
use sxgen::scanner::Scanner;
use sxgen::state::{FsmState, FsmStateBuilder};
use sxgen::strings::LStr;

struct Run {
    context: Context,
    reporter: Reporter,
}

impl Run {
    fn new(text: &str) -> Run {
        let context = Context::new();
        let reporter = Reporter::new();
        {
            let mut scanner = Scanner::new("input.sx", text);
            let mut parser = Parser::new(&context, &reporter);
            parser.parse(&mut scanner).expect("grammar should parse");
            parser.finalize().expect("finalization should succeed");
        }
        Run { context, reporter }
    }

    fn build(&self, section: Section) -> (Vec<ItemSet>, Vec<FsmState>) {
        let sets = ItemSetBuilder::build(&self.context, section, &LStr::intern("__start__"))
            .expect("section should define __start__");
        let states = FsmStateBuilder::build(&self.context, section, &sets, &self.reporter);
        (sets, states)
    }

    fn generate(&self, section: Section, states: &[FsmState], name: &str) -> String {
        let generator = CppGenerator::new(&self.context);
        let mut out = Vec::new();
        generator
            .generate(states, section, name, &mut out)
            .expect("generation should succeed");
        String::from_utf8(out).expect("generated code is UTF-8")
    }
}

#[test]
fn minimal_lexicon_produces_an_accepting_scanner() {
    let run = Run::new(
        "[lexicon]\n\
         tokens : word ;\n\
         word : letter word | letter ;\n\
         letter : [a-z] ;\n",
    );

    // The dispatcher's production exports "word" as symbol 256.
    assert_eq!(
        run.context.export_index(Section::Lexicon, &LStr::intern("word")),
        Some(0)
    );

    let (sets, states) = run.build(Section::Lexicon);
    assert!(!run.reporter.has_fatal());
    assert!(sets.len() > 1);

    // Synthetic symbols surround the user's lexicon.
    assert!(run
        .context
        .non_terminal(Section::Lexicon, &LStr::intern("__start__"))
        .is_some());
    assert!(run
        .context
        .non_terminal(Section::Lexicon, &LStr::intern("__tokens"))
        .is_some());

    let code = run.generate(Section::Lexicon, &states, "demo");
    // At least one accepting state emits the exported token kind.
    assert!(code.contains("code = 256;"));
    // Scanning "foo" needs transitions over lowercase bytes.
    assert!(code.contains("case 102: "));
    assert!(code.contains("case 111: "));
}

#[test]
fn literal_expansion_requires_one_transition_per_byte() {
    let run = Run::new("[lexicon]\ntokens : kw ;\nkw : \"if\" ;\n");

    let kw = run
        .context
        .non_terminal(Section::Lexicon, &LStr::intern("kw"))
        .unwrap();
    assert_eq!(kw.rule(0).unwrap().len(), 2);

    let (_, states) = run.build(Section::Lexicon);
    let code = run.generate(Section::Lexicon, &states, "demo");
    assert!(code.contains(&format!("case {}: ", b'i')));
    assert!(code.contains(&format!("case {}: ", b'f')));
    assert!(code.contains("release = 2;"));
}

#[test]
fn factorization_splits_overlapping_classes() {
    let run = Run::new("[lexicon]\nt : a | b ;\na : [a-c] ;\nb : [b-d] ;\n");
    let (sets, _) = run.build(Section::Lexicon);

    use sxgen::charset::CharSet;
    let mut classes: Vec<CharSet> = Vec::new();
    for item in sets[0].items() {
        if let Some(elem) = item.elem() {
            if elem.kind().is_literal() {
                let class = CharSet::from_pattern(elem.value().as_str());
                if !classes.contains(&class) {
                    classes.push(class);
                }
            }
        }
    }
    assert_eq!(classes.len(), 3);
    for (position, lhs) in classes.iter().enumerate() {
        for rhs in classes.iter().skip(position + 1) {
            assert!((*lhs & *rhs).is_empty());
        }
    }
}

#[test]
fn ambiguous_expression_grammar_exits_with_a_conflict() {
    let run = Run::new("[grammar]\nexpr : expr '+' expr | 'n' ;\n");
    let (sets, _) = run.build(Section::Grammar);
    assert!(!sets.is_empty());

    assert!(run.reporter.has_code(E_SHIFT_REDUCE));
    let record = run
        .reporter
        .records()
        .into_iter()
        .find(|record| record.code == E_SHIFT_REDUCE)
        .unwrap();
    assert_eq!(record.code, 8403);
    assert!(record.message.contains("(State G"));
    assert_eq!(run.reporter.exit_code(), 2);
}

#[test]
fn inferred_types_reach_the_template_markers() {
    let run = Run::new(
        "[lexicon]\ntokens : x ;\nx : 'x' ;\n\
         [grammar]\na {int} : b ;\nb : x ;\n",
    );
    let b = run
        .context
        .non_terminal(Section::Grammar, &LStr::intern("b"))
        .unwrap();
    assert_eq!(b.return_type().unwrap().as_str(), "void *");

    let (_, states) = run.build(Section::Grammar);
    assert!(!run.reporter.has_fatal());
    let code = run.generate(Section::Grammar, &states, "demo");
    // $T resolves to the start symbol's first element type.
    assert!(code.contains("int parse ()"));
    assert!(code.contains("return (int)argv[0];"));
}

#[test]
fn arrays_reclassify_scanned_identifiers() {
    let run = Run::new(
        "[lexicon]\n\
         tokens : id ;\n\
         id : [a-z] id | [a-z] ;\n\
         [arrays]\n\
         kw (id) : 'if', 'else' ;\n",
    );
    let (_, states) = run.build(Section::Lexicon);
    let code = run.generate(Section::Lexicon, &states, "demo");

    // kw was exported while parsing (256); id followed at finalization.
    assert!(code.contains("if (token->getType() == 257)"));
    assert!(code.contains("if (token->equals(\"if\")) { return token->setType(256); }"));
    assert!(code.contains("if (token->equals(\"else\")) { return token->setType(256); }"));
}

#[test]
fn lexicon_reduce_reduce_conflicts_are_fatal() {
    let run = Run::new("[lexicon]\nt : a | b ;\na : 'x' ;\nb : 'x' ;\n");
    let _ = run.build(Section::Lexicon);
    assert!(run.reporter.has_code(E_REDUCE_REDUCE));
    assert_eq!(run.reporter.exit_code(), 2);
}

#[test]
fn generated_files_and_dumps_land_on_disk() {
    let run = Run::new(
        "[lexicon]\n\
         tokens : word ;\n\
         word : letter word | letter ;\n\
         letter : [a-z] ;\n",
    );
    let (sets, states) = run.build(Section::Lexicon);

    let dir = tempfile::tempdir().expect("temporary directory");

    let itemsets_path = dir.path().join("lexicon-itemsets.txt");
    let mut file = fs::File::create(&itemsets_path).unwrap();
    for set in sets.iter() {
        write!(file, "{}", set).unwrap();
    }
    let dumped = fs::read_to_string(&itemsets_path).unwrap();
    assert!(dumped.starts_with("ITEMSET 0"));
    assert!(dumped.contains("__start__"));

    let states_path = dir.path().join("lexicon-states.txt");
    let mut file = fs::File::create(&states_path).unwrap();
    for state in states.iter() {
        write!(file, "{}", state).unwrap();
    }
    let dumped = fs::read_to_string(&states_path).unwrap();
    assert!(dumped.starts_with("STATE 0"));
    assert!(dumped.contains("> GOTO"));
    assert!(dumped.contains("> SHIFT"));

    let scanner_path = dir.path().join("scanner.h");
    let generator = CppGenerator::new(&run.context);
    let mut file = fs::File::create(&scanner_path).unwrap();
    generator
        .generate(&states, Section::Lexicon, "demo", &mut file)
        .unwrap();
    let generated = fs::read_to_string(&scanner_path).unwrap();
    assert!(generated.contains("switch (state)"));
    assert!(generated.contains("demo"));
    assert!(!generated.contains("$1"));
}

#[test]
fn multiple_sources_accumulate_into_one_context() {
    let context = Context::new();
    let reporter = Reporter::new();
    let mut parser = Parser::new(&context, &reporter);

    let mut scanner = Scanner::new("first.sx", "[lexicon]\ntokens : word ;\n");
    parser.parse(&mut scanner).unwrap();
    let mut scanner = Scanner::new("second.sx", "[lexicon]\nword : [a-z] word | [a-z] ;\n");
    parser.parse(&mut scanner).unwrap();
    parser.finalize().unwrap();

    let sets = ItemSetBuilder::build(&context, Section::Lexicon, &LStr::intern("__start__"))
        .expect("lexicon should build");
    let states = FsmStateBuilder::build(&context, Section::Lexicon, &sets, &reporter);
    assert!(!reporter.has_fatal());
    assert!(states.len() == sets.len());
}
