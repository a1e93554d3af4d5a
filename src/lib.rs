//! proc-cfg: incremental control flow graph construction for decompiled procedures
//!
//! This library maintains the basic block graph of a single decompiled
//! procedure while instructions are discovered out of order (disassembly
//! follows branches rather than scanning addresses linearly). Blocks can be
//! created before their code is decoded, split when a branch lands inside
//! them, and stitched together with fall-through edges when discovered
//! regions overlap. A side structure, the implicit-definition cache, hands
//! the value-analysis layer exactly one "defined at procedure entry"
//! statement per distinct location.

pub mod cfg;
pub mod error;
pub mod ir;
pub mod proc;

pub use error::{Error, Result};

// Re-export commonly used types
pub use cfg::{BasicBlock, BlockId, BlockKind, ProcCfg};
pub use ir::{Address, MachineInstruction};
pub use proc::{Parameter, ProcId, ProcTable, Procedure};
