//! An Intcode virtual machine
//!
//! Programs are flat sequences of integers; the machine executes them with
//! variable-width instructions, three addressing modes and memory that grows
//! on demand. Input is the only suspension point: a machine that runs out of
//! input returns to its caller and picks up at the same instruction once more
//! input is pushed, which is what lets several machines be interleaved by
//! the orchestrators in [`orchestrate`].

pub mod disasm;
pub mod io;
pub mod memory;
pub mod opcode;
pub mod orchestrate;
pub mod program;
pub mod vm;

/// The type of a single memory cell in our virtual machine
pub type Word = i64;
