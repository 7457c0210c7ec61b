// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

pub mod charset;
pub mod context;
pub mod errors;
pub mod generator;
pub mod itemset;
pub mod nonterminal;
pub mod parser;
pub mod production;
pub mod scanner;
pub mod state;
pub mod strings;
pub mod token;
