use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use intcode::disasm::disassemble;
use intcode::orchestrate::{self, Network, NetworkConfig, Pipeline};
use intcode::program::Program;
use intcode::Word;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "intcode", about = "Run and inspect Intcode programs")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run a program to completion and print its output.
  Run {
    program: PathBuf,

    /// Input value, may be repeated.
    #[arg(long = "input", allow_negative_numbers = true)]
    inputs: Vec<Word>,
  },

  /// Run a self-test program with one input and print its diagnostic code.
  Diagnostic {
    program: PathBuf,

    #[arg(long, allow_negative_numbers = true)]
    input: Word,
  },

  /// Print a linear disassembly of a program.
  Disasm { program: PathBuf },

  /// Run copies of a program as a feedback loop, one per phase.
  Amplify {
    program: PathBuf,

    /// Comma separated phase settings.
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    phases: Vec<Word>,

    /// Signal fed to the first machine.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    signal: Word,

    /// Try every ordering of the phases and report the best one.
    #[arg(long)]
    search: bool,
  },

  /// Run copies of a program as a packet network until it goes idle.
  Network {
    program: PathBuf,

    #[arg(long, default_value_t = NetworkConfig::default().size)]
    size: usize,

    /// Address whose packets are reported instead of routed.
    #[arg(long, default_value_t = NetworkConfig::default().monitor)]
    monitor: Word,

    /// Input given to a machine with nothing queued.
    #[arg(long, default_value_t = NetworkConfig::default().idle_input, allow_negative_numbers = true)]
    idle_input: Word,

    /// Give up after this many rounds.
    #[arg(long, default_value_t = 100_000)]
    rounds: usize,

    /// Re-send the last monitor packet to machine 0 whenever the network
    /// goes idle, until the same y is re-sent twice in a row.
    #[arg(long)]
    nat: bool,
  },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
  #[error("could not read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },

  #[error("could not parse {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    source: intcode::program::ParseError,
  },

  #[error(transparent)]
  Run(#[from] orchestrate::Error),
}

fn load(path: &Path) -> Result<Program, CliError> {
  let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
    path: path.to_owned(),
    source,
  })?;
  text.parse().map_err(|source| CliError::Parse {
    path: path.to_owned(),
    source,
  })
}

fn execute(command: Command) -> Result<(), CliError> {
  match command {
    Command::Run { program, inputs } => {
      let program = load(&program)?;
      for value in orchestrate::run_with_input(&program, inputs)? {
        println!("{value}");
      }
    }
    Command::Diagnostic { program, input } => {
      let program = load(&program)?;
      println!("{}", orchestrate::diagnostic(&program, input)?);
    }
    Command::Disasm { program } => {
      let program = load(&program)?;
      print!("{}", disassemble(program.as_words()));
    }
    Command::Amplify {
      program,
      phases,
      signal,
      search,
    } => {
      let program = load(&program)?;
      if search {
        let (best, order) = Pipeline::max_signal(&program, &phases, signal)?;
        info!(?order, "best phase order");
        println!("{best}");
      } else {
        println!("{}", Pipeline::new(&program, &phases)?.run(signal)?);
      }
    }
    Command::Network {
      program,
      size,
      monitor,
      idle_input,
      rounds,
      nat,
    } => {
      let program = load(&program)?;
      let config = NetworkConfig {
        size,
        monitor,
        idle_input,
      };
      let mut network = Network::new(&program, config);
      if nat {
        let (first, repeated) = network.run_with_nat(rounds)?;
        println!("{first}");
        println!("{repeated}");
        return Ok(());
      }
      let last = network.run_until_idle(rounds)?;
      for packet in network.take_monitor() {
        println!("{} {}", packet.x, packet.y);
      }
      if last.is_none() {
        info!("network went idle without reaching the monitor");
      }
    }
  }
  Ok(())
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("intcode=info")),
    )
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  match execute(cli.command) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!("{e}");
      ExitCode::FAILURE
    }
  }
}
