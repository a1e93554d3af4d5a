//! Instruction-level types consumed by the CFG
//!
//! The decoding layer hands the builder ordered, address-tagged instruction
//! batches; this module defines the shape of those batches and the address
//! type the whole graph is keyed on.

pub mod expr;
pub mod stmt;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A native address inside the decoded binary.
///
/// Two values are reserved: [`Address::ZERO`] marks address-less orphan
/// blocks (delay-slot artifacts and the like) and may appear more than once
/// in a CFG, and [`Address::INVALID`] marks a decoding failure upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub u64);

impl Address {
    /// Sentinel for orphan blocks without a native address.
    pub const ZERO: Address = Address(0);
    /// Sentinel for an address that could not be derived.
    pub const INVALID: Address = Address(u64::MAX);

    /// Whether this address is usable as a block key.
    pub fn is_valid(self) -> bool {
        self != Address::INVALID
    }

    /// The raw address value.
    pub fn value(self) -> u64 {
        self.0
    }

    /// The address `offset` bytes further on.
    pub fn offset_by(self, offset: u64) -> Address {
        Address(self.0 + offset)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// A single decoded machine instruction.
///
/// Only the fields the graph layer needs are carried: the native address,
/// the encoded size (for fall-through address computation) and the mnemonic
/// for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInstruction {
    /// Native address of this instruction
    pub addr: Address,
    /// Encoded size in bytes
    pub size: u32,
    /// Disassembled mnemonic
    pub mnemonic: String,
}

impl MachineInstruction {
    /// Create a new instruction record
    pub fn new(addr: Address, size: u32, mnemonic: impl Into<String>) -> Self {
        Self {
            addr,
            size,
            mnemonic: mnemonic.into(),
        }
    }

    /// Address of the first byte past this instruction
    pub fn end_addr(&self) -> Address {
        self.addr.offset_by(u64::from(self.size))
    }
}

impl fmt::Display for MachineInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.addr, self.mnemonic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_sentinels() {
        assert!(Address(0x1000).is_valid());
        assert!(!Address::INVALID.is_valid());
        assert_eq!(format!("{}", Address(0x1000)), "0x1000");
    }

    #[test]
    fn test_instruction_end_addr() {
        let insn = MachineInstruction::new(Address(0x10), 4, "add");
        assert_eq!(insn.end_addr(), Address(0x14));
    }
}
