use crate::opcode::{Instruction, Mode};
use crate::Word;

/// Render a program image as one line per instruction.
///
/// Operands are shown as `[a]` for position, `#v` for immediate and
/// `[rb+o]` for relative parameters. Words that do not decode, and
/// instructions cut off by the end of the image, are listed as data one cell
/// at a time. Intcode freely mixes code and data, so this is a linear sweep
/// and may well decode data as instructions.
pub fn disassemble(words: &[Word]) -> String {
  let mut out = String::new();
  let mut pc = 0;
  while pc < words.len() {
    let decoded = Instruction::decode(words[pc])
      .ok()
      .filter(|instruction| pc + instruction.width() <= words.len());
    let Some(instruction) = decoded else {
      out.push_str(&format!("{pc:05}: {:<24} .word {}\n", words[pc], words[pc]));
      pc += 1;
      continue;
    };
    let raw = &words[pc..pc + instruction.width()];
    let raw_text = raw.iter().map(Word::to_string).collect::<Vec<_>>().join(" ");
    let operands = instruction
      .modes()
      .iter()
      .zip(&raw[1..])
      .map(|(&mode, &param)| operand(mode, param))
      .collect::<Vec<_>>()
      .join(", ");
    out.push_str(&format!(
      "{pc:05}: {raw_text:<24} {} {operands}\n",
      instruction.opcode.mnemonic()
    ));
    pc += instruction.width();
  }
  out
}

fn operand(mode: Mode, param: Word) -> String {
  match mode {
    Mode::Position => format!("[{param}]"),
    Mode::Immediate => format!("#{param}"),
    Mode::Relative if param < 0 => format!("[rb{param}]"),
    Mode::Relative => format!("[rb+{param}]"),
  }
}
