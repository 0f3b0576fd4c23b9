pub mod builtin;
pub mod child;
pub mod config;
pub mod eval;
pub mod expand;
pub mod global;
pub mod job;
pub mod parser;
pub mod pipe;
pub mod search;
pub mod signal;
pub mod tokenizer;
pub mod types;
