//! Opcode stream representation
//!
//! The stream is a flat sequence of `(opcode, operand)` records with no header.
//! Every protocol is wrapped in `FRAME_CREATE` / `FRAME_EXIT`. Integers are
//! 4-byte big-endian and parameters are emitted as a length followed by the raw
//! bytes.

use anyhow::Context;
use std::fmt;

use crate::{parser::Protocol, registry::Registry};

/// Single-byte opcodes
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x00,
    Load = 0x01,
    Store = 0x02,
    Add = 0x03,
    Sub = 0x04,
    Mul = 0x05,
    Div = 0x06,
    Call = 0x07,
    Ret = 0x08,
    Jmp = 0x09,
    Jz = 0x0A,
    Jnz = 0x0B,
    Cmp = 0x0C,
    Push = 0x0D,
    Pop = 0x0E,
    Alloc = 0x0F,
    Free = 0x10,
    // Learning hooks, 0x20-0x23
    HelpLearn = 0x20,
    HelpAdapt = 0x21,
    HelpHeal = 0x22,
    HelpRecommend = 0x23,
    // Frames and state, 0x30-0x34
    FrameCreate = 0x30,
    FrameEnter = 0x31,
    FrameExit = 0x32,
    StateSave = 0x33,
    StateRestore = 0x34,
    // Overlays
    OverlayExpand = 0x40,
    SymbolResolve = 0x41,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Opcode::Nop,
            0x01 => Opcode::Load,
            0x02 => Opcode::Store,
            0x03 => Opcode::Add,
            0x04 => Opcode::Sub,
            0x05 => Opcode::Mul,
            0x06 => Opcode::Div,
            0x07 => Opcode::Call,
            0x08 => Opcode::Ret,
            0x09 => Opcode::Jmp,
            0x0A => Opcode::Jz,
            0x0B => Opcode::Jnz,
            0x0C => Opcode::Cmp,
            0x0D => Opcode::Push,
            0x0E => Opcode::Pop,
            0x0F => Opcode::Alloc,
            0x10 => Opcode::Free,
            0x20 => Opcode::HelpLearn,
            0x21 => Opcode::HelpAdapt,
            0x22 => Opcode::HelpHeal,
            0x23 => Opcode::HelpRecommend,
            0x30 => Opcode::FrameCreate,
            0x31 => Opcode::FrameEnter,
            0x32 => Opcode::FrameExit,
            0x33 => Opcode::StateSave,
            0x34 => Opcode::StateRestore,
            0x40 => Opcode::OverlayExpand,
            0x41 => Opcode::SymbolResolve,
            _ => return None,
        })
    }

    /// Opcode for an instruction name. Unknown names become `NOP`.
    pub fn for_name(name: &str) -> Self {
        match name {
            "load" => Opcode::Load,
            "store" => Opcode::Store,
            "add" => Opcode::Add,
            "sub" => Opcode::Sub,
            "call" => Opcode::Call,
            "return" => Opcode::Ret,
            "jump" => Opcode::Jmp,
            "compare" => Opcode::Cmp,
            "push" => Opcode::Push,
            "pop" => Opcode::Pop,
            _ => Opcode::Nop,
        }
    }

    /// Width of the immediate the runtime reads after this opcode
    pub fn immediate_width(self) -> usize {
        match self {
            Opcode::Load | Opcode::Store | Opcode::Call | Opcode::Jmp => 4,
            _ => 0,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::Jmp => "JMP",
            Opcode::Jz => "JZ",
            Opcode::Jnz => "JNZ",
            Opcode::Cmp => "CMP",
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Alloc => "ALLOC",
            Opcode::Free => "FREE",
            Opcode::HelpLearn => "HELP_LEARN",
            Opcode::HelpAdapt => "HELP_ADAPT",
            Opcode::HelpHeal => "HELP_HEAL",
            Opcode::HelpRecommend => "HELP_RECOMMEND",
            Opcode::FrameCreate => "FRAME_CREATE",
            Opcode::FrameEnter => "FRAME_ENTER",
            Opcode::FrameExit => "FRAME_EXIT",
            Opcode::StateSave => "STATE_SAVE",
            Opcode::StateRestore => "STATE_RESTORE",
            Opcode::OverlayExpand => "OVERLAY_EXPAND",
            Opcode::SymbolResolve => "SYMBOL_RESOLVE",
        }
    }
}

fn emit_opcode(output: &mut Vec<u8>, opcode: Opcode) {
    output.push(opcode as u8);
}

fn emit_operand(output: &mut Vec<u8>, operand: u32) {
    output.extend_from_slice(&operand.to_be_bytes());
}

/// Serialize protocols into the opcode stream.
///
/// Overlay references are inlined verbatim after `OVERLAY_EXPAND`; their bytes are
/// not checked. Fails only if a parameter is too long for its 4-byte length prefix.
pub fn generate(protocols: &[Protocol], registry: &Registry) -> anyhow::Result<Vec<u8>> {
    let mut bytecode = Vec::new();

    for protocol in protocols {
        emit_opcode(&mut bytecode, Opcode::FrameCreate);

        for instruction in &protocol.instructions {
            if let Some(id) = instruction.overlay {
                emit_opcode(&mut bytecode, Opcode::OverlayExpand);
                bytecode.extend_from_slice(&registry.get(id).bytecode);
                continue;
            }

            emit_opcode(&mut bytecode, Opcode::for_name(instruction.name));
            for param in &instruction.params {
                let len = u32::try_from(param.len()).with_context(|| {
                    format!("parameter on line {} is too long to encode", instruction.line)
                })?;
                emit_operand(&mut bytecode, len);
                bytecode.extend_from_slice(param.as_bytes());
            }
        }

        emit_opcode(&mut bytecode, Opcode::FrameExit);
    }

    Ok(bytecode)
}

/// Decoded head of a record
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Decoded {
    Op(Opcode),
    Unknown(u8),
}

/// One record of a disassembly
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Record {
    pub offset: usize,
    pub decoded: Decoded,
    /// Set for opcodes that carry an immediate, `None` if the stream ends early
    pub immediate: Option<u32>,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06x}  ", self.offset)?;
        match self.decoded {
            Decoded::Op(op) => write!(f, "{}", op.mnemonic())?,
            Decoded::Unknown(byte) => write!(f, ".byte {:#04x}", byte)?,
        }
        match (self.decoded, self.immediate) {
            (_, Some(value)) => write!(f, " {:#010x}", value),
            (Decoded::Op(op), None) if op.immediate_width() > 0 => write!(f, " <truncated>"),
            _ => Ok(()),
        }
    }
}

/// Walk `bytecode` opcode by opcode, reading immediates the way the runtime does
pub fn disassemble(bytecode: &[u8]) -> Vec<Record> {
    let mut records = Vec::new();
    let mut offset = 0;

    while let Some(&byte) = bytecode.get(offset) {
        let decoded = Opcode::from_u8(byte).map_or(Decoded::Unknown(byte), Decoded::Op);
        let width = match decoded {
            Decoded::Op(op) => op.immediate_width(),
            Decoded::Unknown(_) => 0,
        };

        let operand = bytecode.get(offset + 1..offset + 1 + width);
        let immediate = match operand {
            Some(bytes) if width == 4 => Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            _ => None,
        };
        records.push(Record {
            offset,
            decoded,
            immediate,
        });

        if width > 0 && operand.is_none() {
            break;
        }
        offset += 1 + width;
    }

    records
}
