pub mod ast;
pub mod interpreter;
pub mod natives;
pub mod parser;
pub mod span;
pub mod tokenizer;
