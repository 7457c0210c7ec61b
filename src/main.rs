// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>
use clap::crate_authors;
use structopt::StructOpt;

use std::fmt::Display;
use std::fs;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use sxgen::context::{Context, Section};
use sxgen::errors::Reporter;
use sxgen::generator::cpp::CppGenerator;
use sxgen::generator::Generator;
use sxgen::itemset::builder::ItemSetBuilder;
use sxgen::parser::Parser;
use sxgen::scanner::Scanner;
use sxgen::state::FsmStateBuilder;
use sxgen::strings::LStr;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "sxgen",
    about = "Scanner and parser generator for sectioned syntax grammars",
    author = crate_authors!(),
)]
struct CLOptions {
    /// Code generation output format.
    #[structopt(short = "f", long = "format", default_value = "cpp")]
    format: String,
    /// Base name substituted for the $0 marker of the code templates.
    #[structopt(short = "n", long = "name", default_value = "")]
    name: String,
    /// Output directory for the generated files.
    #[structopt(short = "o", long = "output-dir", default_value = "")]
    output_dir: String,
    /// Dump finalized FSM states to *-states.txt.
    #[structopt(short = "d", long = "dump-states")]
    dump_states: bool,
    /// Dump item sets to *-itemsets.txt.
    #[structopt(short = "i", long = "dump-itemsets")]
    dump_itemsets: bool,
    /// Grammar source files, processed in order.
    #[structopt(parse(from_os_str), required = true)]
    sources: Vec<PathBuf>,
}

fn dump_to_file<T: Display>(path: &str, entries: &[T]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    for entry in entries {
        write!(file, "{}", entry)?;
    }
    Ok(())
}

fn run(options: &CLOptions) -> i32 {
    if options.format != "cpp" {
        writeln!(
            std::io::stderr(),
            "{}: unsupported output format",
            options.format
        )
        .unwrap();
        return 1;
    }

    let context = Context::new();
    let reporter = Reporter::new();
    let mut parser = Parser::new(&context, &reporter);

    for source in options.sources.iter() {
        let text = match fs::read_to_string(source) {
            Ok(text) => text,
            Err(error) => {
                writeln!(
                    std::io::stderr(),
                    "Error reading {}: {:?}",
                    source.to_string_lossy(),
                    error
                )
                .unwrap();
                return 2;
            }
        };
        let mut scanner = Scanner::new(&source.to_string_lossy(), &text);
        // A fatal error abandons this file; remaining files still parse so
        // one run reports as much as possible.
        let _ = parser.parse(&mut scanner);
    }
    let _ = parser.finalize();

    let start_symbol = LStr::intern("__start__");

    for &section in [Section::Lexicon, Section::Grammar].iter() {
        let sets = match ItemSetBuilder::build(&context, section, &start_symbol) {
            Some(sets) => sets,
            None => continue,
        };

        let tag = if section == Section::Lexicon {
            "lexicon"
        } else {
            "grammar"
        };

        if options.dump_itemsets {
            if let Err(error) = dump_to_file(&format!("{}-itemsets.txt", tag), &sets) {
                writeln!(std::io::stderr(), "Error writing item sets: {:?}", error).unwrap();
                return 2;
            }
        }

        let states = FsmStateBuilder::build(&context, section, &sets, &reporter);

        if options.dump_states {
            if let Err(error) = dump_to_file(&format!("{}-states.txt", tag), &states) {
                writeln!(std::io::stderr(), "Error writing states: {:?}", error).unwrap();
                return 2;
            }
        }

        if !reporter.has_fatal() {
            let file_name = if section == Section::Lexicon {
                "scanner.h"
            } else {
                "parser.h"
            };
            let path = Path::new(&options.output_dir).join(file_name);
            let generator = CppGenerator::new(&context);
            let status = fs::File::create(&path).and_then(|mut file| {
                generator.generate(&states, section, &options.name, &mut file)
            });
            if let Err(error) = status {
                writeln!(
                    std::io::stderr(),
                    "Error writing {}: {:?}",
                    path.to_string_lossy(),
                    error
                )
                .unwrap();
                return 2;
            }
        }
    }

    for record in reporter.records() {
        writeln!(std::io::stderr(), "{}", record).unwrap();
    }

    reporter.exit_code()
}

fn main() {
    let options = CLOptions::from_args();
    let status = run(&options);
    if LStr::pool_len() > 0 {
        writeln!(
            std::io::stderr(),
            "Warning: {} interned strings still alive at exit.",
            LStr::pool_len()
        )
        .unwrap();
    }
    std::process::exit(status);
}
