//! FIFO command queue
//!
//! Owned by the device's shared state behind a mutex. Producers append at
//! the tail from any task; only the drive loop looks at or removes the head.

use std::collections::VecDeque;

use crate::command::Command;

/// Strict FIFO of pending commands
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: VecDeque<Command>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail
    pub fn push_back(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    /// The command currently in flight, or next to be sent
    pub fn front(&self) -> Option<&Command> {
        self.commands.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut Command> {
        self.commands.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<Command> {
        self.commands.pop_front()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Remove every pending command, head first
    pub fn drain(&mut self) -> Vec<Command> {
        self.commands.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use korad_protocol::{mnemonic, Arg};
    use proptest::prelude::*;

    fn output(on: bool) -> Command {
        Command::new(mnemonic::OUTPUT, &[Arg::from(on)]).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = CommandQueue::new();
        queue.push_back(output(true));
        queue.push_back(output(false));

        assert_eq!(queue.pop_front().unwrap().wire(), b"OUT1");
        assert_eq!(queue.pop_front().unwrap().wire(), b"OUT0");
        assert!(queue.is_empty());
        assert!(queue.front().is_none());
    }

    #[test]
    fn test_front_mut_marks_head() {
        let mut queue = CommandQueue::new();
        queue.push_back(output(true));
        queue.push_back(output(false));

        queue.front_mut().unwrap().mark_sent();
        assert!(queue.front().unwrap().is_sent());
        queue.pop_front();
        assert!(!queue.front().unwrap().is_sent());
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = CommandQueue::new();
        queue.push_back(output(true));
        queue.push_back(output(false));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].wire(), b"OUT1");
        assert_eq!(queue.len(), 0);
    }

    proptest! {
        #[test]
        fn prop_pops_follow_push_order(slots in prop::collection::vec(1u32..=5, 0..32)) {
            let mut queue = CommandQueue::new();
            for &slot in &slots {
                queue.push_back(Command::new(mnemonic::RECALL, &[Arg::from(slot)]).unwrap());
            }
            prop_assert_eq!(queue.len(), slots.len());

            for &slot in &slots {
                let cmd = queue.pop_front().unwrap();
                let expected = format!("RCL{}", slot);
                prop_assert_eq!(cmd.wire(), expected.as_bytes());
            }
            prop_assert!(queue.is_empty());
        }
    }
}
