use crate::Word;

/// The low two digits of an instruction word.
///
/// `a` and `b` are read-source parameters, `t` is a write-target parameter.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
  /// | Operation | Semantics         | Words       |
  /// |-----------|-------------------|-------------|
  /// | Add       | `m[t] ← a + b`    | `1, a, b, t`|
  Add = 1,

  /// | Operation | Semantics         | Words       |
  /// |-----------|-------------------|-------------|
  /// | Multiply  | `m[t] ← a × b`    | `2, a, b, t`|
  Multiply = 2,

  /// Consumes the oldest pending input. With nothing pending the machine
  /// suspends here without advancing.
  ///
  /// | Operation | Semantics          | Words  |
  /// |-----------|--------------------|--------|
  /// | Input     | `m[t] ← pop(in)`   | `3, t` |
  Input = 3,

  /// | Operation | Semantics          | Words  |
  /// |-----------|--------------------|--------|
  /// | Output    | `push(out, a)`     | `4, a` |
  Output = 4,

  /// | Operation    | Semantics                | Words     |
  /// |--------------|--------------------------|-----------|
  /// | Jump If True | `if a ≠ 0 : pc ← b`      | `5, a, b` |
  JumpIfTrue = 5,

  /// | Operation     | Semantics               | Words     |
  /// |---------------|-------------------------|-----------|
  /// | Jump If False | `if a = 0 : pc ← b`     | `6, a, b` |
  JumpIfFalse = 6,

  /// | Operation | Semantics                  | Words        |
  /// |-----------|----------------------------|--------------|
  /// | Less Than | `m[t] ← 1 if a < b else 0` | `7, a, b, t` |
  LessThan = 7,

  /// | Operation | Semantics                  | Words        |
  /// |-----------|----------------------------|--------------|
  /// | Equals    | `m[t] ← 1 if a = b else 0` | `8, a, b, t` |
  Equals = 8,

  /// | Operation            | Semantics   | Words  |
  /// |----------------------|-------------|--------|
  /// | Adjust Relative Base | `rb ← rb + a` | `9, a` |
  AdjustRelativeBase = 9,

  /// | Operation | Semantics          | Words |
  /// |-----------|--------------------|-------|
  /// | Halt      | `(stop execution)` | `99`  |
  Halt = 99,
}

impl Opcode {
  /// Number of parameter words following the instruction word
  pub const fn arity(self) -> usize {
    match self {
      Self::Add | Self::Multiply | Self::LessThan | Self::Equals => 3,
      Self::JumpIfTrue | Self::JumpIfFalse => 2,
      Self::Input | Self::Output | Self::AdjustRelativeBase => 1,
      Self::Halt => 0,
    }
  }

  pub const fn mnemonic(self) -> &'static str {
    match self {
      Self::Add => "add",
      Self::Multiply => "mul",
      Self::Input => "in",
      Self::Output => "out",
      Self::JumpIfTrue => "jnz",
      Self::JumpIfFalse => "jz",
      Self::LessThan => "lt",
      Self::Equals => "eq",
      Self::AdjustRelativeBase => "arb",
      Self::Halt => "halt",
    }
  }
}

impl TryFrom<Word> for Opcode {
  type Error = DecodeError;

  fn try_from(code: Word) -> Result<Self, Self::Error> {
    match code {
      1 => Ok(Self::Add),
      2 => Ok(Self::Multiply),
      3 => Ok(Self::Input),
      4 => Ok(Self::Output),
      5 => Ok(Self::JumpIfTrue),
      6 => Ok(Self::JumpIfFalse),
      7 => Ok(Self::LessThan),
      8 => Ok(Self::Equals),
      9 => Ok(Self::AdjustRelativeBase),
      99 => Ok(Self::Halt),
      _ => Err(DecodeError::UnknownOpcode(code)),
    }
  }
}

/// How a parameter word is interpreted
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
  /// The parameter is an address
  #[default]
  Position = 0,
  /// The parameter is the value itself, never a valid write target
  Immediate = 1,
  /// The parameter is an offset from the relative base
  Relative = 2,
}

impl TryFrom<Word> for Mode {
  type Error = DecodeError;

  fn try_from(digit: Word) -> Result<Self, Self::Error> {
    match digit {
      0 => Ok(Self::Position),
      1 => Ok(Self::Immediate),
      2 => Ok(Self::Relative),
      _ => Err(DecodeError::UnknownMode(digit)),
    }
  }
}

/// A malformed instruction word
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
  #[error("unknown opcode `{0}`")]
  UnknownOpcode(Word),

  #[error("unknown addressing mode `{0}`")]
  UnknownMode(Word),
}

/// A decoded instruction word: the opcode plus one mode per parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
  pub opcode: Opcode,
  modes: [Mode; 3],
}

impl Instruction {
  /// Split an instruction word into its opcode and parameter modes.
  ///
  /// Only the mode digits the opcode actually uses are inspected, so unused
  /// high digits never make an instruction malformed.
  pub fn decode(word: Word) -> Result<Self, DecodeError> {
    if word < 0 {
      return Err(DecodeError::UnknownOpcode(word));
    }
    let opcode = Opcode::try_from(word % 100)?;
    let mut modes = [Mode::Position; 3];
    let mut digits = word / 100;
    for mode in modes.iter_mut().take(opcode.arity()) {
      *mode = Mode::try_from(digits % 10)?;
      digits /= 10;
    }
    Ok(Self { opcode, modes })
  }

  /// Exactly one mode per parameter of the opcode
  pub fn modes(&self) -> &[Mode] {
    &self.modes[..self.opcode.arity()]
  }

  /// Words taken up by this instruction, including the instruction word
  pub fn width(&self) -> usize {
    1 + self.opcode.arity()
  }
}
