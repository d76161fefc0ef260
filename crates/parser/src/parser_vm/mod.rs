//! Parsing Virtual Machine
//!
//! A bytecode virtual machine for PEG parsing. Grammars are compiled once
//! into a flat program which is then executed against character or token
//! input with backtracking.
//!
//! # Architecture
//!
//! The [`Compiler`] lowers every rule of a [`Grammar`](crate::Grammar) into
//! bytecode; the [`VM`] interprets that bytecode with an explicit frame
//! stack. [`VMParser`] ties the two together.
//!
//! # Instruction Encoding
//!
//! Instructions are 32-bit words: 8-bit opcode + 24-bit operand.

mod compiler;
mod grammar;
mod instruction;
mod vm;
mod vmparser;

// Re-export public types
pub use compiler::Compiler;
pub use grammar::{CompiledGrammar, Matcher, MatcherKind};
pub use instruction::{
    encode, encode_jump, encode_signed, mnemonic, op, opcode, operand, operand_signed, MAX_OFFSET,
    MAX_OPERAND,
};
pub use vm::{Input, Outcome, VM};
pub use vmparser::VMParser;
