use std::collections::BTreeMap;

use crate::Word;

/// Attempted to access memory through a negative address
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("negative address {0}")]
pub struct NegativeAddress(pub Word);

/// How far past the dense cells a write may land and still extend them
const DENSE_SLACK: usize = 4096;

/// Conceptually infinite memory of words.
///
/// Every non-negative address is valid: cells that were never written read as
/// `0`. The program image and anything written close past its end live in a
/// contiguous vector; writes far beyond it go to a sparse map, so storage
/// never grows in proportion to the address. Only negative addresses are
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
  cells: Vec<Word>,
  sparse: BTreeMap<usize, Word>,
}

impl Memory {
  /// Create an empty memory, every cell reads as `0`
  pub fn new() -> Self {
    Self::default()
  }

  pub fn read(&self, address: Word) -> Result<Word, NegativeAddress> {
    let index = index(address)?;
    let value = match self.cells.get(index) {
      Some(&value) => value,
      None => self.sparse.get(&index).copied().unwrap_or(0),
    };
    Ok(value)
  }

  pub fn write(&mut self, address: Word, value: Word) -> Result<(), NegativeAddress> {
    let index = index(address)?;
    if index < self.cells.len() {
      self.cells[index] = value;
    } else if index - self.cells.len() < DENSE_SLACK {
      self.grow(index + 1);
      self.cells[index] = value;
    } else {
      self.sparse.insert(index, value);
    }
    Ok(())
  }

  // extend the dense cells to `len`, pulling in sparse cells now covered
  fn grow(&mut self, len: usize) {
    self.cells.resize(len, 0);
    let beyond = self.sparse.split_off(&len);
    for (index, value) in std::mem::replace(&mut self.sparse, beyond) {
      self.cells[index] = value;
    }
  }

  /// One past the highest address of the contiguous cells
  pub fn len(&self) -> usize {
    self.cells.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cells.is_empty() && self.sparse.is_empty()
  }

  /// The contiguous cells, starting at address `0`
  pub fn as_slice(&self) -> &[Word] {
    &self.cells
  }
}

impl From<Vec<Word>> for Memory {
  fn from(cells: Vec<Word>) -> Self {
    Self {
      cells,
      sparse: BTreeMap::new(),
    }
  }
}

impl From<&[Word]> for Memory {
  fn from(cells: &[Word]) -> Self {
    Self::from(cells.to_vec())
  }
}

fn index(address: Word) -> Result<usize, NegativeAddress> {
  usize::try_from(address).map_err(|_| NegativeAddress(address))
}
