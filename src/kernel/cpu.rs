use super::{ProcessControlBlock, Word};

use crate::config::REGISTER_COUNT;
use crate::io::Program;

/// The simulated processor. A cycle is a no-op fetch that advances the
/// program counter; the CPU never touches memory or the process queues.
pub struct Cpu {
    cycle_count: u64,
    program_counter: usize,
    registers: [Word; REGISTER_COUNT],
    base_register: usize,
    limit_register: usize,
    is_idle: bool,
    current_program: Option<Program>,
}

impl Cpu {
    pub fn new() -> Cpu {
        Cpu {
            cycle_count: 0,
            program_counter: 0,
            registers: [0; REGISTER_COUNT],
            base_register: 0,
            limit_register: 0,
            is_idle: true,
            current_program: None,
        }
    }

    /// Runs one cycle and returns its index (the number of cycles that
    /// completed before it).
    pub fn tick(&mut self) -> u64 {
        let cycle = self.cycle_count;
        self.cycle_count += 1;

        if !self.is_idle {
            self.program_counter += 1;

            // Programs loop; execution never leaves [base, limit].
            if self.program_counter > self.limit_register {
                self.program_counter = self.base_register;
            }
        }

        cycle
    }

    pub fn load_context(&mut self, pcb: &ProcessControlBlock) {
        self.program_counter = pcb.program_counter;
        self.registers.copy_from_slice(&pcb.registers);
        self.base_register = pcb.get_base();
        self.limit_register = pcb.get_limit();
        self.current_program = Some(*pcb.get_program());
        self.is_idle = false;
    }

    pub fn save_context_into(&self, pcb: &mut ProcessControlBlock) {
        pcb.program_counter = self.program_counter;
        pcb.registers.copy_from_slice(&self.registers);

        if let Some(program) = self.current_program {
            pcb.set_region(self.base_register, self.limit_register, program);
        }
    }

    pub fn go_idle(&mut self) {
        self.is_idle = true;
        self.current_program = None;
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn program_counter(&self) -> usize {
        self.program_counter
    }

    pub fn registers(&self) -> &[Word; REGISTER_COUNT] {
        &self.registers
    }

    pub fn base_register(&self) -> usize {
        self.base_register
    }

    pub fn limit_register(&self) -> usize {
        self.limit_register
    }

    pub fn is_idle(&self) -> bool {
        self.is_idle
    }

    pub fn current_program(&self) -> Option<&Program> {
        self.current_program.as_ref()
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new()
    }
}
