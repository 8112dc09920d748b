use std::collections::VecDeque;

use super::{KernelError, Pid, ProcessControlBlock, ProcessState};

/// FIFO of process control blocks. Every member holds the queue's managed state.
pub struct ProcessQueue {
    queue: VecDeque<ProcessControlBlock>,
    managed_state: ProcessState,
}

impl ProcessQueue {
    pub fn new(managed_state: ProcessState) -> ProcessQueue {
        ProcessQueue {
            queue: VecDeque::new(),
            managed_state,
        }
    }

    pub fn managed_state(&self) -> ProcessState {
        self.managed_state
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Appends `pcb` to the tail, coercing its state to the managed state.
    pub fn add(&mut self, mut pcb: ProcessControlBlock) {
        pcb.state = self.managed_state;
        self.queue.push_back(pcb);
    }

    pub fn remove(&mut self) -> Result<ProcessControlBlock, KernelError> {
        self.queue.pop_front().ok_or(KernelError::EmptyQueue(self.managed_state))
    }

    pub fn peek(&self) -> Option<&ProcessControlBlock> {
        self.queue.front()
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.queue.iter().any(|pcb| pcb.get_pid() == pid)
    }

    /// Removes the first member with the given pid, wherever it sits in the queue.
    pub fn remove_identity(&mut self, pid: Pid) -> Option<ProcessControlBlock> {
        let position = self.queue.iter().position(|pcb| pcb.get_pid() == pid)?;
        self.queue.remove(position)
    }

    /// Members from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &ProcessControlBlock> + '_ {
        self.queue.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::io::Program;

    fn pcb(pid: Pid) -> ProcessControlBlock {
        let base = pid as usize * 10;
        ProcessControlBlock::new(pid, base, base + 9, Program::new(10, pid))
    }

    fn pids(queue: &ProcessQueue) -> Vec<Pid> {
        queue.iter().map(|pcb| pcb.get_pid()).collect()
    }

    #[test]
    fn test_process_queue_fifo_order() {
        let mut queue = ProcessQueue::new(ProcessState::Ready);
        queue.add(pcb(10));
        queue.add(pcb(11));
        queue.add(pcb(12));

        assert_eq!(pids(&queue), vec![10, 11, 12]);
        assert_eq!(queue.remove().unwrap().get_pid(), 10);
        assert_eq!(queue.remove().unwrap().get_pid(), 11);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_process_queue_add_coerces_state() {
        let mut queue = ProcessQueue::new(ProcessState::Waiting);
        let mut running = pcb(10);
        running.state = ProcessState::Running;
        queue.add(running);

        assert_eq!(queue.peek().unwrap().state, ProcessState::Waiting);
        assert_eq!(queue.managed_state(), ProcessState::Waiting);
    }

    #[test]
    fn test_process_queue_remove_empty() {
        let mut queue = ProcessQueue::new(ProcessState::Ready);
        assert!(queue.is_empty());
        assert!(queue.peek().is_none());
        assert_eq!(queue.remove(), Err(KernelError::EmptyQueue(ProcessState::Ready)));
    }

    #[test]
    fn test_process_queue_remove_identity() {
        let mut queue = ProcessQueue::new(ProcessState::Waiting);
        queue.add(pcb(10));
        queue.add(pcb(11));
        queue.add(pcb(12));

        assert!(queue.contains(11));
        assert_eq!(queue.remove_identity(11).map(|pcb| pcb.get_pid()), Some(11));
        assert!(!queue.contains(11));
        assert_eq!(pids(&queue), vec![10, 12]);
        assert!(queue.remove_identity(11).is_none());
    }
}
