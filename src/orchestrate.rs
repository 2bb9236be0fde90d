//! Drivers that run one or more machines cooperatively.
//!
//! Everything here is single threaded: machines are resumed one after
//! another and values move between them only through their I/O queues, in
//! between calls to [`Vm::step_until_suspend`].

use tracing::{debug, instrument};

use crate::program::Program;
use crate::vm::{self, Status, Vm};
use crate::Word;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
  #[error("machine {machine} faulted: {source}")]
  Machine {
    machine: usize,
    #[source]
    source: vm::Error,
  },

  #[error("machine is waiting for input at address {pc} but none is left")]
  Starved { pc: usize },

  #[error("program produced no output")]
  NoOutput,

  #[error("diagnostic check {index} failed with {value}")]
  DiagnosticFailed { index: usize, value: Word },

  #[error("pipeline needs at least one phase")]
  EmptyPipeline,

  #[error("every running machine is waiting for input and none is in flight")]
  Deadlock,

  #[error("packet sent to unknown address {destination}")]
  UnknownDestination { destination: Word },

  #[error("network did not settle within {0} rounds")]
  RoundLimit(usize),

  #[error("network went idle before anything reached the monitor")]
  SilentMonitor,
}

fn resume(vm: &mut Vm, machine: usize) -> Result<Status, Error> {
  vm.step_until_suspend()
    .map_err(|source| Error::Machine { machine, source })
}

/// Run a fresh machine to completion with a fixed list of inputs, returning
/// everything it printed
pub fn run_with_input<I>(program: &Program, inputs: I) -> Result<Vec<Word>, Error>
where
  I: IntoIterator<Item = Word>,
{
  let mut vm = Vm::new(program);
  vm.extend_input(inputs);
  match resume(&mut vm, 0)? {
    Status::Halted => Ok(vm.drain_output()),
    _ => Err(Error::Starved {
      pc: vm.context().pc,
    }),
  }
}

/// Run a self-test program with a single input.
///
/// Every output before the last reports one check and must be `0`; the last
/// output is the diagnostic code.
pub fn diagnostic(program: &Program, input: Word) -> Result<Word, Error> {
  let outputs = run_with_input(program, [input])?;
  let (code, checks) = outputs.split_last().ok_or(Error::NoOutput)?;
  if let Some((index, &value)) = checks.iter().enumerate().find(|&(_, &value)| value != 0) {
    return Err(Error::DiagnosticFailed { index, value });
  }
  Ok(*code)
}

/// Machines connected in a ring, each one's output feeding the next one's
/// input and the last feeding back into the first.
#[derive(Debug, Clone)]
pub struct Pipeline {
  machines: Vec<Vm>,
}

impl Pipeline {
  /// One machine per phase, each given its phase as the first input
  pub fn new(program: &Program, phases: &[Word]) -> Result<Self, Error> {
    if phases.is_empty() {
      return Err(Error::EmptyPipeline);
    }
    let machines = phases
      .iter()
      .map(|&phase| {
        let mut vm = Vm::new(program);
        vm.push_input(phase);
        vm
      })
      .collect();
    Ok(Self { machines })
  }

  pub fn machines(&self) -> &[Vm] {
    &self.machines
  }

  /// Feed `signal` to the first machine and cycle through the ring until
  /// every machine halts, returning the last value the final machine sent.
  #[instrument(skip(self))]
  pub fn run(&mut self, signal: Word) -> Result<Word, Error> {
    let n = self.machines.len();
    self.machines[0].push_input(signal);
    let mut last = None;
    loop {
      for i in 0..n {
        if self.machines[i].is_halted() {
          continue;
        }
        resume(&mut self.machines[i], i)?;
        let values = self.machines[i].drain_output();
        if i == n - 1 {
          last = values.last().copied().or(last);
        }
        debug!(machine = i, forwarded = values.len(), "pipeline transfer");
        self.machines[(i + 1) % n].extend_input(values);
      }
      if self.machines.iter().all(Vm::is_halted) {
        break;
      }
      let stuck = self
        .machines
        .iter()
        .filter(|vm| !vm.is_halted())
        .all(|vm| vm.channel().pending_input() == 0);
      if stuck {
        return Err(Error::Deadlock);
      }
    }
    last.ok_or(Error::NoOutput)
  }

  /// Try every ordering of `phases` and return the strongest final signal
  /// along with the ordering that produced it
  pub fn max_signal(
    program: &Program,
    phases: &[Word],
    signal: Word,
  ) -> Result<(Word, Vec<Word>), Error> {
    let mut best: Option<(Word, Vec<Word>)> = None;
    for order in permutations(phases) {
      let output = Self::new(program, &order)?.run(signal)?;
      match &best {
        Some((value, _)) if *value >= output => {}
        _ => best = Some((output, order)),
      }
    }
    best.ok_or(Error::EmptyPipeline)
  }
}

// heap's algorithm
fn permutations(items: &[Word]) -> Vec<Vec<Word>> {
  let mut items = items.to_vec();
  if items.is_empty() {
    return Vec::new();
  }
  let mut counters = vec![0; items.len()];
  let mut result = vec![items.clone()];
  let mut i = 1;
  while i < items.len() {
    if counters[i] < i {
      let j = if i % 2 == 0 { 0 } else { counters[i] };
      items.swap(j, i);
      result.push(items.clone());
      counters[i] += 1;
      i = 1;
    } else {
      counters[i] = 0;
      i += 1;
    }
  }
  result
}

/// Knobs for a [`Network`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
  /// Machines get addresses `0..size`
  pub size: usize,
  /// Packets sent here land in the monitor side channel instead of a machine
  pub monitor: Word,
  /// Fed to a machine that has nothing queued when it is resumed
  pub idle_input: Word,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      size: 50,
      monitor: 255,
      idle_input: -1,
    }
  }
}

/// A `(destination, x, y)` triple sent by a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
  pub destination: Word,
  pub x: Word,
  pub y: Word,
}

/// What happened during one [`Network::round`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round {
  /// Complete packets sent by all machines this round
  pub sent: usize,
  /// Every machine was starved and silent, and nothing is left in flight
  pub idle: bool,
}

/// Machines addressed `0..size` exchanging packets.
///
/// Each machine is booted with its own address as its first input. Packets
/// are routed into the destination machine's input queue as `x, y`, or into
/// the monitor side channel when addressed to the monitor.
#[derive(Debug, Clone)]
pub struct Network {
  config: NetworkConfig,
  machines: Vec<Vm>,
  // output words not yet forming a full packet, per machine
  partial: Vec<Vec<Word>>,
  monitor: Vec<Packet>,
  first_monitor: Option<Packet>,
  last_monitor: Option<Packet>,
}

impl Network {
  pub fn new(program: &Program, config: NetworkConfig) -> Self {
    let machines = (0..config.size)
      .map(|address| {
        let mut vm = Vm::new(program);
        vm.push_input(address as Word);
        vm
      })
      .collect();
    Self {
      config,
      machines,
      partial: vec![Vec::new(); config.size],
      monitor: Vec::new(),
      first_monitor: None,
      last_monitor: None,
    }
  }

  pub fn config(&self) -> NetworkConfig {
    self.config
  }

  pub fn machines(&self) -> &[Vm] {
    &self.machines
  }

  /// Resume every machine once, in address order, routing whatever it sends
  pub fn round(&mut self) -> Result<Round, Error> {
    let mut sent = 0;
    let mut idle = true;
    for address in 0..self.machines.len() {
      let vm = &mut self.machines[address];
      if vm.is_halted() {
        continue;
      }
      if vm.channel().pending_input() == 0 {
        vm.push_input(self.config.idle_input);
      } else {
        idle = false;
      }
      resume(vm, address)?;
      let words = vm.drain_output();
      if !words.is_empty() {
        idle = false;
      }
      let partial = &mut self.partial[address];
      partial.extend(words);
      let complete = partial.len() - partial.len() % 3;
      let packets: Vec<Packet> = partial
        .drain(..complete)
        .collect::<Vec<_>>()
        .chunks_exact(3)
        .map(|triple| Packet {
          destination: triple[0],
          x: triple[1],
          y: triple[2],
        })
        .collect();
      for packet in packets {
        debug!(sender = address, ?packet, "routing packet");
        self.deliver(packet)?;
        sent += 1;
      }
    }
    let in_flight = self
      .machines
      .iter()
      .any(|vm| !vm.is_halted() && vm.channel().pending_input() > 0);
    Ok(Round {
      sent,
      idle: idle && !in_flight,
    })
  }

  /// Route a packet as if a machine had sent it
  pub fn deliver(&mut self, packet: Packet) -> Result<(), Error> {
    if packet.destination == self.config.monitor {
      self.monitor.push(packet);
      self.first_monitor.get_or_insert(packet);
      self.last_monitor = Some(packet);
      return Ok(());
    }
    let vm = usize::try_from(packet.destination)
      .ok()
      .and_then(|address| self.machines.get_mut(address))
      .ok_or(Error::UnknownDestination {
        destination: packet.destination,
      })?;
    vm.extend_input([packet.x, packet.y]);
    Ok(())
  }

  /// Drain the packets sent to the monitor so far, oldest first
  pub fn take_monitor(&mut self) -> Vec<Packet> {
    std::mem::take(&mut self.monitor)
  }

  /// The earliest packet sent to the monitor, drained or not
  pub fn first_monitor(&self) -> Option<Packet> {
    self.first_monitor
  }

  /// The most recent packet sent to the monitor, drained or not
  pub fn last_monitor(&self) -> Option<Packet> {
    self.last_monitor
  }

  /// Run rounds until the network goes idle, returning the last packet the
  /// monitor saw
  #[instrument(skip(self))]
  pub fn run_until_idle(&mut self, limit: usize) -> Result<Option<Packet>, Error> {
    for round in 0..limit {
      if self.round()?.idle {
        debug!(round, "network idle");
        return Ok(self.last_monitor);
      }
    }
    Err(Error::RoundLimit(limit))
  }

  /// Run the network with the monitor acting as a wake-up service.
  ///
  /// Whenever the network goes idle, the last packet the monitor received is
  /// re-sent to machine `0`. The run ends the first time the same `y` is
  /// re-sent twice in a row; the result is the `y` of the first packet that
  /// ever reached the monitor and that repeated `y`.
  #[instrument(skip(self))]
  pub fn run_with_nat(&mut self, limit: usize) -> Result<(Word, Word), Error> {
    let mut last_sent: Option<Word> = None;
    for round in 0..limit {
      if !self.round()?.idle {
        continue;
      }
      let (Some(first), Some(wake)) = (self.first_monitor, self.last_monitor) else {
        return Err(Error::SilentMonitor);
      };
      if last_sent == Some(wake.y) {
        debug!(round, y = wake.y, "wake-up repeated");
        return Ok((first.y, wake.y));
      }
      debug!(round, ?wake, "waking machine 0");
      last_sent = Some(wake.y);
      self.deliver(Packet {
        destination: 0,
        ..wake
      })?;
    }
    Err(Error::RoundLimit(limit))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn program(words: &[Word]) -> Program {
    Program::from(words)
  }

  mod single {
    use super::*;

    #[test]
    fn run_with_input_collects_output() {
      let echo = program(&[3, 0, 4, 0, 99]);
      assert_eq!(run_with_input(&echo, [42]), Ok(vec![42]));
    }

    #[test]
    fn run_with_input_starved() {
      let echo = program(&[3, 0, 4, 0, 99]);
      assert_eq!(run_with_input(&echo, []), Err(Error::Starved { pc: 0 }));
    }

    #[test]
    fn run_with_input_fault() {
      let broken = program(&[42]);
      assert!(matches!(
        run_with_input(&broken, []),
        Err(Error::Machine { machine: 0, .. })
      ));
    }

    #[test]
    fn diagnostic_code() {
      // two passing checks, then the code is the input times 1000
      let selftest = program(&[3, 20, 104, 0, 104, 0, 1002, 20, 1000, 20, 4, 20, 99]);
      assert_eq!(diagnostic(&selftest, 5), Ok(5000));
    }

    #[test]
    fn diagnostic_failed_check() {
      let selftest = program(&[3, 20, 104, 0, 104, 3, 4, 20, 99]);
      assert_eq!(
        diagnostic(&selftest, 1),
        Err(Error::DiagnosticFailed { index: 1, value: 3 })
      );
    }

    #[test]
    fn diagnostic_without_output() {
      let silent = program(&[3, 0, 99]);
      assert_eq!(diagnostic(&silent, 1), Err(Error::NoOutput));
    }
  }

  mod pipeline {
    use super::*;

    #[rustfmt::skip]
    const SERIES: &[Word] = &[
      3, 15, 3, 16, 1002, 16, 10, 16, 1, 16, 15, 15, 4, 15, 99, 0, 0,
    ];

    #[rustfmt::skip]
    const FEEDBACK: &[Word] = &[
      3, 26, 1001, 26, -4, 26, 3, 27, 1002, 27, 2, 27, 1, 27, 26, 27, 4, 27,
      1001, 28, -1, 28, 1005, 28, 6, 99, 0, 0, 5,
    ];

    #[test]
    fn series() {
      let mut pipeline = Pipeline::new(&program(SERIES), &[4, 3, 2, 1, 0]).unwrap();
      assert_eq!(pipeline.run(0), Ok(43210));
      assert!(pipeline.machines().iter().all(Vm::is_halted));
    }

    #[test]
    fn feedback_loop() {
      let mut pipeline = Pipeline::new(&program(FEEDBACK), &[9, 8, 7, 6, 5]).unwrap();
      assert_eq!(pipeline.run(0), Ok(139629729));
    }

    #[test]
    fn max_signal_series() {
      let best = Pipeline::max_signal(&program(SERIES), &[0, 1, 2, 3, 4], 0);
      assert_eq!(best, Ok((43210, vec![4, 3, 2, 1, 0])));
    }

    #[test]
    fn max_signal_feedback() {
      let best = Pipeline::max_signal(&program(FEEDBACK), &[5, 6, 7, 8, 9], 0);
      assert_eq!(best, Ok((139629729, vec![9, 8, 7, 6, 5])));
    }

    #[test]
    fn empty() {
      assert!(matches!(
        Pipeline::new(&program(SERIES), &[]),
        Err(Error::EmptyPipeline)
      ));
    }

    #[test]
    fn deadlock() {
      // wants a third input that never comes
      let greedy = program(&[3, 0, 3, 0, 3, 0, 99]);
      let mut pipeline = Pipeline::new(&greedy, &[1]).unwrap();
      assert_eq!(pipeline.run(0), Err(Error::Deadlock));
    }

    #[test]
    fn no_output() {
      let silent = program(&[3, 0, 3, 0, 99]);
      let mut pipeline = Pipeline::new(&silent, &[1]).unwrap();
      assert_eq!(pipeline.run(0), Err(Error::NoOutput));
    }

    #[test]
    fn permutation_count() {
      let all = permutations(&[0, 1, 2, 3]);
      assert_eq!(all.len(), 24);
      let mut unique = all.clone();
      unique.sort();
      unique.dedup();
      assert_eq!(unique.len(), 24);
      assert!(permutations(&[]).is_empty());
    }
  }

  mod network {
    use super::*;

    // machine 0 kicks off with (1, 10, 20); every machine forwards packets
    // to the next address with y + 1, the last one to the monitor
    #[rustfmt::skip]
    const RELAY: &[Word] = &[
      3, 100,
      1005, 100, 11,
      104, 1, 104, 10, 104, 20,
      3, 101,
      1008, 101, -1, 103,
      1005, 103, 11,
      3, 102,
      1001, 100, 1, 104,
      1008, 104, 3, 105,
      1006, 105, 37,
      1101, 0, 255, 104,
      4, 104,
      4, 101,
      1001, 102, 1, 102,
      4, 102,
      1105, 1, 11,
      99,
    ];

    fn config(size: usize) -> NetworkConfig {
      NetworkConfig {
        size,
        ..NetworkConfig::default()
      }
    }

    #[test]
    fn default_config() {
      let config = NetworkConfig::default();
      assert_eq!((config.size, config.monitor, config.idle_input), (50, 255, -1));
    }

    #[test]
    fn relay_reaches_monitor() {
      let mut network = Network::new(&program(RELAY), config(3));
      let first = network.round().unwrap();
      assert_eq!(first, Round { sent: 3, idle: false });
      let monitor = network.take_monitor();
      assert_eq!(
        monitor,
        vec![Packet {
          destination: 255,
          x: 10,
          y: 22
        }]
      );
      assert!(network.take_monitor().is_empty());

      // everybody is fed the idle input and stays quiet
      assert_eq!(network.round(), Ok(Round { sent: 0, idle: true }));
    }

    #[test]
    fn run_until_idle_and_deliver() {
      let mut network = Network::new(&program(RELAY), config(3));
      let last = network.run_until_idle(10).unwrap();
      assert_eq!(last.map(|p| (p.x, p.y)), Some((10, 22)));

      let packet = Packet {
        destination: 0,
        x: 5,
        y: 6,
      };
      network.deliver(packet).unwrap();
      let last = network.run_until_idle(10).unwrap();
      assert_eq!(last.map(|p| (p.x, p.y)), Some((5, 9)));
      assert_eq!(network.take_monitor().len(), 2);
    }

    // like RELAY, but y only grows while it is below 24
    #[rustfmt::skip]
    const CAPPED_RELAY: &[Word] = &[
      3, 100,
      1005, 100, 11,
      104, 1, 104, 10, 104, 20,
      3, 101,
      1008, 101, -1, 103,
      1005, 103, 11,
      3, 102,
      1001, 100, 1, 104,
      1008, 104, 3, 105,
      1006, 105, 37,
      1101, 0, 255, 104,
      4, 104,
      4, 101,
      1007, 102, 24, 106,
      1, 102, 106, 102,
      4, 102,
      1105, 1, 11,
      99,
    ];

    #[test]
    fn nat_stops_on_repeated_wake_up() {
      let mut network = Network::new(&program(CAPPED_RELAY), config(3));
      assert_eq!(network.run_with_nat(20), Ok((22, 24)));
      let ys: Vec<Word> = network.take_monitor().iter().map(|p| p.y).collect();
      assert_eq!(ys, vec![22, 24, 24]);
      assert_eq!(network.first_monitor().map(|p| p.y), Some(22));
    }

    #[test]
    fn nat_never_repeats() {
      // RELAY adds 3 to y on every pass, so the wake-up never repeats
      let mut network = Network::new(&program(RELAY), config(3));
      assert_eq!(network.run_with_nat(12), Err(Error::RoundLimit(12)));
    }

    #[test]
    fn nat_with_silent_monitor() {
      // reads its address and idles forever without sending
      let quiet = program(&[3, 100, 3, 101, 1105, 1, 2]);
      let mut network = Network::new(&quiet, config(2));
      assert_eq!(network.run_with_nat(10), Err(Error::SilentMonitor));
    }

    #[test]
    fn packets_split_across_rounds() {
      #[rustfmt::skip]
      let split = program(&[
        3, 100,
        104, 255, 104, 7,
        3, 101,
        104, 8,
        3, 101,
        1105, 1, 10,
      ]);
      let mut network = Network::new(&split, config(1));
      assert_eq!(network.round(), Ok(Round { sent: 0, idle: false }));
      assert!(network.take_monitor().is_empty());
      assert_eq!(network.round(), Ok(Round { sent: 1, idle: false }));
      assert_eq!(
        network.last_monitor(),
        Some(Packet {
          destination: 255,
          x: 7,
          y: 8
        })
      );
      assert_eq!(network.round(), Ok(Round { sent: 0, idle: true }));
    }

    #[test]
    fn unknown_destination() {
      let stray = program(&[3, 100, 104, 7, 104, 1, 104, 2, 99]);
      let mut network = Network::new(&stray, config(1));
      assert_eq!(
        network.round(),
        Err(Error::UnknownDestination { destination: 7 })
      );
    }

    #[test]
    fn round_limit() {
      // keeps talking to itself forever
      let chatty = program(&[3, 100, 104, 0, 104, 1, 104, 2, 3, 101, 3, 101, 1105, 1, 2]);
      let mut network = Network::new(&chatty, config(1));
      assert_eq!(network.run_until_idle(5), Err(Error::RoundLimit(5)));
    }
  }
}
