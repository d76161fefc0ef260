//! Bytecode instruction encoding and opcodes.
//!
//! Instructions are 32-bit words: 8-bit opcode + 24-bit operand.
//! Jump-like operands are signed offsets relative to the instruction itself,
//! so a compiled fragment can be copied anywhere in the program.

/// Opcode constants (8-bit)
pub mod op {
    // Character input matching
    pub const LITERAL: u8 = 0x01;
    pub const PATTERN: u8 = 0x02;
    pub const END_OF_INPUT: u8 = 0x03;

    // Token input matching
    pub const TOKEN_TYPE: u8 = 0x08;
    pub const TOKEN_TYPES: u8 = 0x09;
    pub const TOKEN_VALUE: u8 = 0x0A;
    pub const ANY_TOKEN: u8 = 0x0B;
    pub const BRIDGE: u8 = 0x0C;
    pub const TILL_NEW_LINE: u8 = 0x0D;
    pub const ADJACENT: u8 = 0x0E;

    // Control flow
    pub const CHOICE: u8 = 0x11;
    pub const COMMIT: u8 = 0x12;
    pub const FAIL: u8 = 0x13;
    pub const END: u8 = 0x14;

    // Predicates and loops
    pub const PREDICATE_CHOICE: u8 = 0x15;
    pub const COMMIT_VERIFY: u8 = 0x16;
    pub const BACK_COMMIT: u8 = 0x17;
    pub const FAIL_TWICE: u8 = 0x18;

    // Rule dispatch
    pub const CALL: u8 = 0x20;
    pub const RETURN: u8 = 0x21;

    // Token and trivia wrappers
    pub const OPEN: u8 = 0x30;
    pub const CLOSE: u8 = 0x31;
}

/// Largest offset a 24-bit signed operand can hold.
pub const MAX_OFFSET: i32 = 0x007F_FFFF;

/// Largest table index a 24-bit operand can hold.
pub const MAX_OPERAND: u32 = 0x00FF_FFFF;

/// Encode an instruction from opcode and operand
#[inline]
pub fn encode(opcode: u8, operand: u32) -> u32 {
    ((opcode as u32) << 24) | (operand & 0x00FF_FFFF)
}

/// Decode opcode from instruction
#[inline]
pub fn opcode(instr: u32) -> u8 {
    (instr >> 24) as u8
}

/// Decode operand from instruction (24-bit unsigned)
#[inline]
pub fn operand(instr: u32) -> u32 {
    instr & 0x00FF_FFFF
}

/// Decode operand as signed offset
#[inline]
pub fn operand_signed(instr: u32) -> i32 {
    let raw = instr & 0x00FF_FFFF;
    // Sign-extend from 24 bits
    if raw & 0x0080_0000 != 0 {
        (raw | 0xFF00_0000) as i32
    } else {
        raw as i32
    }
}

/// Encode a signed offset into 24-bit operand
#[inline]
pub fn encode_signed(offset: i32) -> u32 {
    (offset as u32) & 0x00FF_FFFF
}

/// Encode a jump-like instruction with a relative offset, or `None` when
/// the offset needs more than 24 bits.
#[inline]
pub fn encode_jump(opcode: u8, offset: i64) -> Option<u32> {
    if offset < -(MAX_OFFSET as i64) - 1 || offset > MAX_OFFSET as i64 {
        return None;
    }
    Some(encode(opcode, encode_signed(offset as i32)))
}

/// Mnemonic for an opcode, as printed by the disassembler.
pub fn mnemonic(opc: u8) -> &'static str {
    match opc {
        op::LITERAL => "LITERAL",
        op::PATTERN => "PATTERN",
        op::END_OF_INPUT => "END_OF_INPUT",
        op::TOKEN_TYPE => "TOKEN_TYPE",
        op::TOKEN_TYPES => "TOKEN_TYPES",
        op::TOKEN_VALUE => "TOKEN_VALUE",
        op::ANY_TOKEN => "ANY_TOKEN",
        op::BRIDGE => "BRIDGE",
        op::TILL_NEW_LINE => "TILL_NEW_LINE",
        op::ADJACENT => "ADJACENT",
        op::CHOICE => "CHOICE",
        op::COMMIT => "COMMIT",
        op::FAIL => "FAIL",
        op::END => "END",
        op::PREDICATE_CHOICE => "PRED_CHOICE",
        op::COMMIT_VERIFY => "COMMIT_VERIFY",
        op::BACK_COMMIT => "BACK_COMMIT",
        op::FAIL_TWICE => "FAIL_TWICE",
        op::CALL => "CALL",
        op::RETURN => "RETURN",
        op::OPEN => "OPEN",
        op::CLOSE => "CLOSE",
        _ => "???",
    }
}
