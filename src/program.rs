use std::fmt;
use std::str::FromStr;

use crate::Word;

/// A program image, the initial contents of memory starting at address `0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
  words: Vec<Word>,
}

impl Program {
  pub fn as_words(&self) -> &[Word] {
    &self.words
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  /// A copy of this image with some cells overwritten before execution.
  ///
  /// Cells past the end of the image are zero filled up to the patched
  /// address.
  pub fn patched(&self, patches: &[(usize, Word)]) -> Self {
    let mut words = self.words.clone();
    for &(address, value) in patches {
      if address >= words.len() {
        words.resize(address + 1, 0);
      }
      words[address] = value;
    }
    Self { words }
  }
}

impl From<Vec<Word>> for Program {
  fn from(words: Vec<Word>) -> Self {
    Self { words }
  }
}

impl From<&[Word]> for Program {
  fn from(words: &[Word]) -> Self {
    Self {
      words: words.to_vec(),
    }
  }
}

/// Program text that is not a comma separated list of integers
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
  #[error("program text is empty")]
  Empty,

  #[error("token {index} (`{token}`) is not an integer")]
  InvalidToken { index: usize, token: String },
}

impl FromStr for Program {
  type Err = ParseError;

  fn from_str(text: &str) -> Result<Self, Self::Err> {
    let text = text.trim();
    if text.is_empty() {
      return Err(ParseError::Empty);
    }
    // a single trailing comma is tolerated
    let text = text.strip_suffix(',').unwrap_or(text);
    let words = text
      .split(',')
      .enumerate()
      .map(|(index, token)| {
        let token = token.trim();
        token.parse::<Word>().map_err(|_| ParseError::InvalidToken {
          index,
          token: token.to_owned(),
        })
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self { words })
  }
}

impl fmt::Display for Program {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, word) in self.words.iter().enumerate() {
      if i > 0 {
        f.write_str(",")?;
      }
      write!(f, "{word}")?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_signed_words() {
    let program: Program = "109,-1,204,+3,99\n".parse().unwrap();
    assert_eq!(program.as_words(), &[109, -1, 204, 3, 99]);
    assert_eq!(program.len(), 5);
  }

  #[test]
  fn parse_tolerates_whitespace_and_trailing_comma() {
    let program: Program = "  1, 0 ,0,0,\n99,\n".parse().unwrap();
    assert_eq!(program.as_words(), &[1, 0, 0, 0, 99]);
  }

  #[test]
  fn parse_rejects_garbage() {
    assert_eq!("".parse::<Program>(), Err(ParseError::Empty));
    assert_eq!(" \n".parse::<Program>(), Err(ParseError::Empty));
    assert_eq!(
      "1,two,3".parse::<Program>(),
      Err(ParseError::InvalidToken {
        index: 1,
        token: "two".into()
      })
    );
    assert_eq!(
      "1,,3".parse::<Program>(),
      Err(ParseError::InvalidToken {
        index: 1,
        token: String::new()
      })
    );
  }

  #[test]
  fn parse_large_words() {
    let program: Program = "104,1125899906842624,99".parse().unwrap();
    assert_eq!(program.as_words()[1], 1125899906842624);
  }

  #[test]
  fn display_round_trips_text() {
    let text = "1,9,10,3,2,3,11,0,99,30,40,50";
    let program: Program = text.parse().unwrap();
    assert_eq!(program.to_string(), text);
  }

  #[test]
  fn patched_copies() {
    let program = Program::from(vec![1, 0, 0, 0, 99]);
    let patched = program.patched(&[(1, 12), (2, 2), (7, 5)]);
    assert_eq!(patched.as_words(), &[1, 12, 2, 0, 99, 0, 0, 5]);
    // the unpatched image is left alone
    assert_eq!(program.as_words(), &[1, 0, 0, 0, 99]);
  }
}
