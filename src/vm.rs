use tracing::{debug, trace, warn};

use crate::io::Channel;
use crate::memory::{Memory, NegativeAddress};
use crate::opcode::{DecodeError, Instruction, Mode, Opcode};
use crate::program::Program;
use crate::Word;

/// Where a machine stands between calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Running,
  /// Parked on an input instruction with nothing to read; the program counter
  /// still points at that instruction
  WaitingForInput,
  Halted,
}

/// Everything besides memory that a machine needs to be resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
  pub pc: usize,
  pub relative_base: Word,
  pub status: Status,
}

impl Default for Context {
  fn default() -> Self {
    Self {
      pc: 0,
      relative_base: 0,
      status: Status::Running,
    }
  }
}

/// An Intcode machine.
///
/// Each machine exclusively owns its memory, context and I/O queues. A caller
/// drives it with [`Vm::step_until_suspend`], feeding input and draining
/// output between calls; several machines are interleaved simply by calling
/// them in turn.
#[derive(Debug, Clone)]
pub struct Vm {
  context: Context,
  memory: Memory,
  channel: Channel,
  fault: Option<Error>,
}

impl Vm {
  /// Create a machine with a fresh copy of `program` loaded at address `0`
  pub fn new(program: &Program) -> Self {
    Self {
      context: Context::default(),
      memory: Memory::from(program.as_words()),
      channel: Channel::new(),
      fault: None,
    }
  }

  /// Execute instructions until the machine halts or needs input it does not
  /// have.
  ///
  /// Suspending on input is not an error; push more input and call again to
  /// resume at the same input instruction. Calling this on a halted machine
  /// does nothing. A fatal error leaves the machine permanently faulted and
  /// every later call reports the same error.
  pub fn step_until_suspend(&mut self) -> Result<Status, Error> {
    if self.fault.is_none() && self.context.status == Status::Halted {
      return Ok(Status::Halted);
    }
    loop {
      match self.step()? {
        Status::Running => continue,
        status => {
          debug!(pc = self.context.pc, ?status, "machine suspended");
          return Ok(status);
        }
      }
    }
  }

  /// Execute a single instruction
  pub fn step(&mut self) -> Result<Status, Error> {
    if let Some(error) = &self.fault {
      return Err(error.clone());
    }
    if self.context.status == Status::Halted {
      return Err(Error::MachineHalted);
    }
    let outcome = Task::new(self).and_then(Task::run);
    match outcome {
      Ok(status) => {
        self.context.status = status;
        Ok(status)
      }
      Err(error) => {
        warn!(pc = self.context.pc, %error, "machine faulted");
        self.fault = Some(error.clone());
        Err(error)
      }
    }
  }

  pub fn push_input(&mut self, value: Word) {
    self.channel.push_input(value);
  }

  pub fn extend_input<I>(&mut self, values: I)
  where
    I: IntoIterator<Item = Word>,
  {
    self.channel.extend_input(values);
  }

  pub fn pop_output(&mut self) -> Option<Word> {
    self.channel.pop_output()
  }

  pub fn drain_output(&mut self) -> Vec<Word> {
    self.channel.drain_output()
  }

  pub fn channel(&self) -> &Channel {
    &self.channel
  }

  pub fn peek_memory(&self, address: Word) -> Result<Word, NegativeAddress> {
    self.memory.read(address)
  }

  pub fn poke_memory(&mut self, address: Word, value: Word) -> Result<(), NegativeAddress> {
    self.memory.write(address, value)
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn context(&self) -> Context {
    self.context
  }

  pub fn status(&self) -> Status {
    self.context.status
  }

  pub fn is_halted(&self) -> bool {
    self.fault.is_none() && self.context.status == Status::Halted
  }

  /// The fatal error that stopped this machine, if any
  pub fn fault(&self) -> Option<&Error> {
    self.fault.as_ref()
  }
}

/// A fatal condition; the machine cannot continue after one of these
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
  #[error("malformed instruction at address {address}: {source}")]
  Decode {
    address: usize,
    #[source]
    source: DecodeError,
  },

  #[error(transparent)]
  NegativeAddress(#[from] NegativeAddress),

  #[error("instruction at address {address} writes through an immediate parameter")]
  WriteToImmediate { address: usize },

  #[error("arithmetic overflow in instruction at address {address}")]
  Overflow { address: usize },

  #[error("machine is halted")]
  MachineHalted,
}

/// One instruction in flight: the machine plus the decoded word at `pc`
struct Task<'vm> {
  vm: &'vm mut Vm,
  pc: usize,
  instruction: Instruction,
}

impl<'vm> Task<'vm> {
  fn new(vm: &'vm mut Vm) -> Result<Self, Error> {
    let pc = vm.context.pc;
    let word = vm.memory.read(pc as Word)?;
    let instruction = Instruction::decode(word).map_err(|source| Error::Decode {
      address: pc,
      source,
    })?;
    Ok(Self {
      vm,
      pc,
      instruction,
    })
  }

  #[inline]
  fn raw(&self, n: usize) -> Result<Word, Error> {
    Ok(self.vm.memory.read((self.pc + 1 + n) as Word)?)
  }

  fn relative(&self, offset: Word) -> Result<Word, Error> {
    self
      .vm
      .context
      .relative_base
      .checked_add(offset)
      .ok_or(Error::Overflow { address: self.pc })
  }

  /// Resolve parameter `n` as a read source
  fn read(&self, n: usize) -> Result<Word, Error> {
    let raw = self.raw(n)?;
    match self.instruction.modes()[n] {
      Mode::Position => Ok(self.vm.memory.read(raw)?),
      Mode::Immediate => Ok(raw),
      Mode::Relative => Ok(self.vm.memory.read(self.relative(raw)?)?),
    }
  }

  /// Resolve parameter `n` as a write target
  fn address(&self, n: usize) -> Result<Word, Error> {
    let raw = self.raw(n)?;
    match self.instruction.modes()[n] {
      Mode::Position => Ok(raw),
      Mode::Immediate => Err(Error::WriteToImmediate { address: self.pc }),
      Mode::Relative => self.relative(raw),
    }
  }

  fn write(&mut self, address: Word, value: Word) -> Result<(), Error> {
    self.vm.memory.write(address, value)?;
    Ok(())
  }

  fn advance(&mut self) -> Status {
    self.vm.context.pc = self.pc + self.instruction.width();
    Status::Running
  }

  fn jump(&mut self, target: Word) -> Result<Status, Error> {
    self.vm.context.pc = usize::try_from(target).map_err(|_| NegativeAddress(target))?;
    Ok(Status::Running)
  }

  fn run(mut self) -> Result<Status, Error> {
    trace!(pc = self.pc, opcode = ?self.instruction.opcode, "step");
    match self.instruction.opcode {
      Opcode::Add => arithmetic(&mut self, Word::checked_add),
      Opcode::Multiply => arithmetic(&mut self, Word::checked_mul),
      Opcode::Input => input(&mut self),
      Opcode::Output => output(&mut self),
      Opcode::JumpIfTrue => jump_if(&mut self, true),
      Opcode::JumpIfFalse => jump_if(&mut self, false),
      Opcode::LessThan => compare(&mut self, |a, b| a < b),
      Opcode::Equals => compare(&mut self, |a, b| a == b),
      Opcode::AdjustRelativeBase => adjust_relative_base(&mut self),
      Opcode::Halt => halt(&mut self),
    }
  }
}

// m[t] ← a + b
// m[t] ← a × b
fn arithmetic(task: &mut Task<'_>, op: fn(Word, Word) -> Option<Word>) -> Result<Status, Error> {
  let a = task.read(0)?;
  let b = task.read(1)?;
  let t = task.address(2)?;
  let value = op(a, b).ok_or(Error::Overflow { address: task.pc })?;
  task.write(t, value)?;
  Ok(task.advance())
}

// m[t] ← pop(in), or park here until there is something to pop
fn input(task: &mut Task<'_>) -> Result<Status, Error> {
  let t = task.address(0)?;
  let Some(value) = task.vm.channel.pop_input() else {
    return Ok(Status::WaitingForInput);
  };
  task.write(t, value)?;
  Ok(task.advance())
}

// push(out, a)
fn output(task: &mut Task<'_>) -> Result<Status, Error> {
  let a = task.read(0)?;
  task.vm.channel.push_output(a);
  Ok(task.advance())
}

// if (a ≠ 0) == expected : pc ← b
fn jump_if(task: &mut Task<'_>, expected: bool) -> Result<Status, Error> {
  let a = task.read(0)?;
  let b = task.read(1)?;
  if (a != 0) == expected {
    task.jump(b)
  } else {
    Ok(task.advance())
  }
}

// m[t] ← 1 if a ? b else 0
fn compare(task: &mut Task<'_>, predicate: fn(&Word, &Word) -> bool) -> Result<Status, Error> {
  let a = task.read(0)?;
  let b = task.read(1)?;
  let t = task.address(2)?;
  task.write(t, Word::from(predicate(&a, &b)))?;
  Ok(task.advance())
}

// rb ← rb + a
fn adjust_relative_base(task: &mut Task<'_>) -> Result<Status, Error> {
  let a = task.read(0)?;
  task.vm.context.relative_base = task.relative(a)?;
  Ok(task.advance())
}

// (stop execution)
fn halt(task: &mut Task<'_>) -> Result<Status, Error> {
  debug!(pc = task.pc, "machine halted");
  Ok(Status::Halted)
}
