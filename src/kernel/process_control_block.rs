use super::Word;

use crate::config::REGISTER_COUNT;
use crate::io::Program;

pub type Pid = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Waiting,
    Terminated,
}

/// Everything the kernel knows about one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessControlBlock {
    pub program_counter: usize,
    pub registers: [Word; REGISTER_COUNT],
    pub state: ProcessState,

    pid: Pid,
    program: Program,

    base: usize,
    limit: usize,
}

impl ProcessControlBlock {
    /// Creates a ready process occupying the inclusive region `[base, limit]`.
    /// Execution starts at `base` with zeroed registers.
    pub fn new(pid: Pid, base: usize, limit: usize, program: Program) -> ProcessControlBlock {
        ProcessControlBlock {
            pid,
            program,
            base,
            limit,
            program_counter: base,
            registers: [0; REGISTER_COUNT],
            state: ProcessState::Ready,
        }
    }

    pub fn get_pid(&self) -> Pid {
        self.pid
    }

    pub fn get_program(&self) -> &Program {
        &self.program
    }

    pub fn get_base(&self) -> usize {
        self.base
    }

    pub fn get_limit(&self) -> usize {
        self.limit
    }

    pub fn get_size(&self) -> usize {
        self.limit - self.base + 1
    }

    pub(crate) fn set_region(&mut self, base: usize, limit: usize, program: Program) {
        self.base = base;
        self.limit = limit;
        self.program = program;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_control_block_new() {
        let pcb = ProcessControlBlock::new(10, 100, 199, Program::new(100, 0xFF00FF00));

        assert_eq!(pcb.get_pid(), 10);
        assert_eq!(pcb.get_base(), 100);
        assert_eq!(pcb.get_limit(), 199);
        assert_eq!(pcb.get_size(), 100);
        assert_eq!(pcb.program_counter, 100);
        assert_eq!(pcb.registers, [0; REGISTER_COUNT]);
        assert_eq!(pcb.state, ProcessState::Ready);
        assert_eq!(pcb.get_program().color, 0xFF00FF00);
    }
}
