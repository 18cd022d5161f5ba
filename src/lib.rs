//! A small line-oriented instruction language compiled to a single-byte opcode
//! stream and executed on a stack machine with checkpoint recovery.
//!
//! # Example
//!
//! ```text
//! # everything before the first protocol is dropped
//! protocol main
//! instruct load 5
//! state counter 0
//! 0 double
//! instruct store 0
//!
//! protocol cleanup
//! instruct pop
//! ```
//!
//! Each non-blank line that does not start with `#` is one instruction. The first
//! token is a keyword (`instruct`, `guide`, `state`, `protocol`, `bubble`, `chain`,
//! `franchise`, any case) or a one-character overlay symbol (`0-9`, `a-z`). The
//! second token is the instruction name and the rest are parameters.
//!
//! # Pipeline
//!
//! source → [`parser::Parser`] → [`parser::build_protocols`] →
//! [`bytecode::generate`] → [`fold::fold`] → [`help::HelpContext::apply_optimizations`]
//! → artifact → [`vm::Runtime`]
//!
//! # Opcodes
//!
//! | Name           | Byte   | Operand | Brief |
//! |----------------|--------|---------|-------|
//! | NOP            | `0x00` |         | Do nothing. |
//! | LOAD           | `0x01` | u32     | Push the immediate. |
//! | STORE          | `0x02` | u32     | Pop a value and write it big-endian at the immediate address. |
//! | ADD, SUB, MUL  | `0x03`-`0x05` |  | Pop two, push the wrapping result. |
//! | CALL           | `0x07` | u32     | Push the return address and jump to the immediate. |
//! | RET            | `0x08` |         | Pop the return address and jump there. |
//! | JMP            | `0x09` | u32     | Jump to the immediate. |
//! | PUSH           | `0x0D` |         | Fails on an empty stack, otherwise nothing. |
//! | POP            | `0x0E` |         | Discard the top of the stack. |
//! | HELP_LEARN     | `0x20` |         | Logged only. |
//! | HELP_HEAL      | `0x22` |         | Attempt checkpoint recovery. |
//! | FRAME_CREATE   | `0x30` |         | Checkpoint pc and stack into the current frame. |
//! | FRAME_EXIT     | `0x32` |         | Logged only. |
//! | OVERLAY_EXPAND | `0x40` |         | Logged only; the overlay bytes follow inline. |
//!
//! Every other byte, including the reserved `DIV`, `JZ`, `JNZ`, `CMP`, `ALLOC`,
//! `FREE`, `0x21`, `0x23`, `0x31`, `0x33`, `0x34` and `0x41`, fails when executed.
//!
//! # Important notes
//!
//! - Instruction parameters are emitted as a 4-byte length plus raw text. `LOAD`
//!   reads that length as its immediate; text is never converted to a number.
//! - Folding is lossy. A folded artifact cannot be turned back into the stream it
//!   came from, so only unfolded output runs meaningfully.
//! - There is no header or magic number in the artifact.

pub mod bytecode;
pub mod compiler;
pub mod fold;
pub mod help;
mod lexer;
pub mod logging;
pub mod options;
pub mod parser;
pub mod registry;
pub mod token;
pub mod vm;

pub use compiler::Compiler;
pub use options::{CompilerOptions, RuntimeOptions};
pub use vm::Runtime;
