use std::collections::VecDeque;

use crate::Word;

/// The two independent queues a machine talks to its caller through.
///
/// The caller pushes onto `inbound` and pops from `outbound`; the machine does
/// the opposite. Nothing here ever blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
  inbound: VecDeque<Word>,
  outbound: VecDeque<Word>,
}

impl Channel {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push_input(&mut self, value: Word) {
    self.inbound.push_back(value);
  }

  pub fn extend_input<I>(&mut self, values: I)
  where
    I: IntoIterator<Item = Word>,
  {
    self.inbound.extend(values);
  }

  /// Remove the oldest unread output, if any
  pub fn pop_output(&mut self) -> Option<Word> {
    self.outbound.pop_front()
  }

  /// Remove every unread output, oldest first
  pub fn drain_output(&mut self) -> Vec<Word> {
    self.outbound.drain(..).collect()
  }

  pub fn pending_input(&self) -> usize {
    self.inbound.len()
  }

  pub fn pending_output(&self) -> usize {
    self.outbound.len()
  }

  pub(crate) fn pop_input(&mut self) -> Option<Word> {
    self.inbound.pop_front()
  }

  pub(crate) fn push_output(&mut self, value: Word) {
    self.outbound.push_back(value);
  }
}
