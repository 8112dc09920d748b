use log::{debug, info, warn};

use super::{Allocator, Cpu, KernelError, Memory, Pid, ProcessControlBlock, ProcessQueue, ProcessState};

use crate::config::{KernelConfig, IDLE_PID, INITIAL_USERSPACE_PID};
use crate::io::Program;

/// The kernel. Owns the CPU, physical memory, the allocator and both process
/// queues, and implements the system calls the host triggers.
///
/// The process the CPU is executing is owned here, outside of both queues, so
/// every live process sits in exactly one place.
pub struct OperatingSystem {
    config: KernelConfig,
    cpu: Cpu,
    memory: Memory,
    allocator: Allocator,
    ready_queue: ProcessQueue,
    wait_queue: ProcessQueue,
    running: Option<ProcessControlBlock>,
    next_available_pid: Pid,
}

impl OperatingSystem {
    pub fn new(config: KernelConfig) -> Result<OperatingSystem, KernelError> {
        config.validate()?;

        Ok(OperatingSystem {
            cpu: Cpu::new(),
            memory: Memory::new(config.memory_size),
            allocator: Allocator::new(config.memory_size, config.fit_policy),
            ready_queue: ProcessQueue::new(ProcessState::Ready),
            wait_queue: ProcessQueue::new(ProcessState::Waiting),
            running: None,
            next_available_pid: INITIAL_USERSPACE_PID,
            config,
        })
    }

    /// Advances the simulation by one cycle, then switches context when the
    /// CPU is idle or the running process used up its time slice, provided
    /// there is a ready process to switch to.
    pub fn tick(&mut self) -> Result<(), KernelError> {
        let cycle = self.cpu.tick();

        if !self.ready_queue.is_empty() && (self.cpu.is_idle() || self.time_slice_expired(cycle)) {
            self.switch_context()?;
        }

        Ok(())
    }

    /// Admits a new process for `program` at the tail of the ready queue.
    /// Nothing is created (and no pid consumed) when memory is short.
    pub fn exec(&mut self, program: Program) -> Result<Pid, KernelError> {
        let base = self.allocator.alloc(program.size).map_err(|err| {
            warn!("Rejected program of {} words: {}", program.size, err);
            err
        })?;
        let limit = base + program.size - 1;

        self.memory.fill(base, limit, program.color)?;

        let pid = self.next_available_pid;
        self.next_available_pid += 1;

        self.ready_queue.add(ProcessControlBlock::new(pid, base, limit, program));
        info!("Admitted pid {} at [{}, {}]", pid, base, limit);

        Ok(pid)
    }

    /// Moves the running process to the wait queue, as if it were waiting on a resource.
    pub fn block_current(&mut self) -> Result<(), KernelError> {
        let Some(pcb) = self.preempt()? else {
            return Ok(());
        };

        info!("Blocked pid {}", pcb.get_pid());
        self.wait_queue.add(pcb);

        self.dispatch_next()
    }

    /// Terminates the running process and releases its memory.
    pub fn kill_current(&mut self) -> Result<(), KernelError> {
        let Some(mut pcb) = self.preempt()? else {
            return Ok(());
        };
        pcb.state = ProcessState::Terminated;

        self.allocator
            .free(&mut self.memory, self.cpu.base_register(), self.cpu.limit_register())?;
        info!(
            "Killed pid {}, released [{}, {}]",
            pcb.get_pid(),
            pcb.get_base(),
            pcb.get_limit()
        );

        self.dispatch_next()
    }

    /// Simulates the interrupt that signals a waiting process that its
    /// resource is available. Returns whether a waiter with `pid` was moved
    /// back to the ready queue; any other pid is a spurious interrupt.
    pub fn interrupt_and_unblock(&mut self, pid: Pid) -> bool {
        match self.wait_queue.remove_identity(pid) {
            Some(pcb) => {
                self.ready_queue.add(pcb);
                info!("Unblocked pid {}", pid);
                true
            }
            None => {
                warn!("Spurious interrupt for pid {}", pid);
                false
            }
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn ready_queue(&self) -> &ProcessQueue {
        &self.ready_queue
    }

    pub fn wait_queue(&self) -> &ProcessQueue {
        &self.wait_queue
    }

    /// The process the CPU is executing, as of its last dispatch.
    pub fn running(&self) -> Option<&ProcessControlBlock> {
        self.running.as_ref()
    }

    /// Pid of the running process, or the idle pid.
    pub fn current_pid(&self) -> Pid {
        self.running.as_ref().map_or(IDLE_PID, ProcessControlBlock::get_pid)
    }

    pub fn next_pid(&self) -> Pid {
        self.next_available_pid
    }

    /// All live processes: the running one first, then the ready queue, then the wait queue.
    pub fn processes(&self) -> impl Iterator<Item = &ProcessControlBlock> + '_ {
        self.running
            .iter()
            .chain(self.ready_queue.iter())
            .chain(self.wait_queue.iter())
    }

    /// Verifies the structural invariants of the kernel state.
    pub fn check_invariants(&self) -> Result<(), KernelError> {
        self.check_cpu_ownership()
            .and_then(|_| self.check_queue_states())
            .and_then(|_| self.check_pids())
            .and_then(|_| self.allocator.check_free_map(self.memory.size()))
            .and_then(|_| self.check_memory_partition())
            .map_err(KernelError::InvariantViolation)
    }

    fn time_slice_expired(&self, cycle: u64) -> bool {
        cycle % self.config.round_robin_cycle_limit == 0
    }

    /// Places the running process at the tail of the ready queue and
    /// dispatches the process at the head.
    fn switch_context(&mut self) -> Result<(), KernelError> {
        if self.ready_queue.is_empty() {
            return Err(KernelError::InvariantViolation(
                "context switch with an empty ready queue".to_string(),
            ));
        }

        if let Some(pcb) = self.preempt()? {
            self.ready_queue.add(pcb);
        }

        let pcb = self.ready_queue.remove()?;
        self.dispatch(pcb);
        debug!("Ready queue has {} processes", self.ready_queue.len());

        Ok(())
    }

    fn dispatch(&mut self, mut pcb: ProcessControlBlock) {
        debug!("Dispatch pid {} at cycle {}", pcb.get_pid(), self.cpu.cycle_count());

        pcb.state = ProcessState::Running;
        self.cpu.load_context(&pcb);
        self.running = Some(pcb);
    }

    fn dispatch_next(&mut self) -> Result<(), KernelError> {
        if self.ready_queue.is_empty() {
            self.cpu.go_idle();
            debug!("CPU idle at cycle {}", self.cpu.cycle_count());
            return Ok(());
        }

        let pcb = self.ready_queue.remove()?;
        self.dispatch(pcb);
        Ok(())
    }

    /// Takes the running process off the CPU with its full context saved.
    /// Returns `None` when the CPU is idle.
    fn preempt(&mut self) -> Result<Option<ProcessControlBlock>, KernelError> {
        if self.cpu.is_idle() {
            return Ok(None);
        }

        let mut pcb = self.running.take().ok_or_else(|| {
            KernelError::InvariantViolation("CPU is busy without a running process".to_string())
        })?;
        self.cpu.save_context_into(&mut pcb);

        Ok(Some(pcb))
    }

    fn check_cpu_ownership(&self) -> Result<(), String> {
        match (&self.running, self.cpu.is_idle()) {
            (None, true) => Ok(()),
            (Some(pcb), false) if pcb.state == ProcessState::Running => Ok(()),
            (Some(pcb), false) => Err(format!("running pid {} is in state {:?}", pcb.get_pid(), pcb.state)),
            (Some(pcb), true) => Err(format!("CPU is idle but pid {} is running", pcb.get_pid())),
            (None, false) => Err("CPU is busy without a running process".to_string()),
        }
    }

    fn check_queue_states(&self) -> Result<(), String> {
        for queue in [&self.ready_queue, &self.wait_queue] {
            if let Some(pcb) = queue.iter().find(|pcb| pcb.state != queue.managed_state()) {
                return Err(format!(
                    "pid {} is {:?} inside the {:?} queue",
                    pcb.get_pid(),
                    pcb.state,
                    queue.managed_state()
                ));
            }
        }

        Ok(())
    }

    fn check_pids(&self) -> Result<(), String> {
        let mut pids: Vec<Pid> = self.processes().map(ProcessControlBlock::get_pid).collect();
        pids.sort_unstable();

        if pids.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err("duplicate pid".to_string());
        }
        if let Some(pid) = pids
            .iter()
            .find(|&&pid| pid < INITIAL_USERSPACE_PID || pid >= self.next_available_pid)
        {
            return Err(format!("pid {} was never handed out", pid));
        }

        Ok(())
    }

    fn check_memory_partition(&self) -> Result<(), String> {
        let mut regions: Vec<(usize, usize)> = self
            .allocator
            .free_intervals()
            .chain(self.processes().map(|pcb| (pcb.get_base(), pcb.get_size())))
            .collect();
        regions.sort_unstable();

        let mut next_address = 0;
        for (start, length) in regions {
            if start != next_address {
                return Err(format!("memory at {} is not accounted for exactly once", start.min(next_address)));
            }
            next_address = start + length;
        }

        if next_address != self.memory.size() {
            return Err(format!("memory from {} is not accounted for", next_address));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::FitPolicy;

    const A: Program = Program { size: 100, color: 0xFFA00000 };
    const B: Program = Program { size: 100, color: 0xFF00B000 };
    const C: Program = Program { size: 100, color: 0xFF0000C0 };

    fn os(memory_size: usize) -> OperatingSystem {
        OperatingSystem::new(KernelConfig::with_memory_size(memory_size)).unwrap()
    }

    fn ready_pids(os: &OperatingSystem) -> Vec<Pid> {
        os.ready_queue().iter().map(ProcessControlBlock::get_pid).collect()
    }

    fn wait_pids(os: &OperatingSystem) -> Vec<Pid> {
        os.wait_queue().iter().map(ProcessControlBlock::get_pid).collect()
    }

    fn free_map(os: &OperatingSystem) -> Vec<(usize, usize)> {
        os.allocator().free_intervals().collect()
    }

    fn tick(os: &mut OperatingSystem, times: usize) {
        for _ in 0..times {
            os.tick().unwrap();
            os.check_invariants().unwrap();
        }
    }

    #[test]
    fn test_operating_system_starts_idle() {
        let os = os(1000);
        assert!(os.cpu().is_idle());
        assert_eq!(os.current_pid(), 0);
        assert_eq!(os.next_pid(), 10);
        assert_eq!(free_map(&os), vec![(0, 1000)]);
        os.check_invariants().unwrap();
    }

    #[test]
    fn test_operating_system_rejects_invalid_config() {
        let config = KernelConfig {
            round_robin_cycle_limit: 0,
            ..KernelConfig::default()
        };
        assert!(OperatingSystem::new(config).is_err());
    }

    #[test]
    fn test_operating_system_idle_tick_without_work() {
        let mut os = os(1000);
        tick(&mut os, 45);
        assert!(os.cpu().is_idle());
        assert_eq!(os.cpu().cycle_count(), 45);
    }

    #[test]
    fn test_operating_system_spawn_and_run() {
        let mut os = os(1000);
        assert_eq!(os.exec(A), Ok(10));
        os.check_invariants().unwrap();

        tick(&mut os, 1);

        assert!(!os.cpu().is_idle());
        assert_eq!(os.cpu().current_program(), Some(&A));
        assert_eq!(os.current_pid(), 10);
        assert_eq!(os.running().unwrap().state, ProcessState::Running);
        assert!(os.ready_queue().is_empty());
        assert_eq!(free_map(&os), vec![(100, 900)]);
    }

    #[test]
    fn test_operating_system_exec_paints_region() {
        let mut os = os(1000);
        os.exec(A).unwrap();
        os.exec(B).unwrap();

        assert!(os.memory().read_block(0, 99).unwrap().iter().all(|&cell| cell == A.color));
        assert!(os.memory().read_block(100, 199).unwrap().iter().all(|&cell| cell == B.color));
        assert_eq!(os.memory().read(200), Ok(0));

        let pcb = os.ready_queue().peek().unwrap();
        assert_eq!((pcb.get_base(), pcb.get_limit(), pcb.program_counter), (0, 99, 0));
    }

    #[test]
    fn test_operating_system_exec_keeps_fifo_order() {
        let mut os = os(1000);
        os.exec(A).unwrap();
        os.exec(B).unwrap();
        os.exec(C).unwrap();

        assert_eq!(ready_pids(&os), vec![10, 11, 12]);
        let programs: Vec<Program> = os.ready_queue().iter().map(|pcb| *pcb.get_program()).collect();
        assert_eq!(programs, vec![A, B, C]);
        os.check_invariants().unwrap();
    }

    #[test]
    fn test_operating_system_round_robin_rotation() {
        let mut os = os(1000);
        os.exec(A).unwrap();
        os.exec(B).unwrap();
        os.exec(C).unwrap();

        tick(&mut os, 1);
        assert_eq!(os.current_pid(), 10);
        assert_eq!(ready_pids(&os), vec![11, 12]);

        tick(&mut os, 29);
        assert_eq!(os.current_pid(), 10);
        assert_eq!(os.cpu().program_counter(), 29);

        tick(&mut os, 1);
        assert_eq!(os.current_pid(), 11);
        assert_eq!(os.cpu().current_program(), Some(&B));
        assert_eq!(ready_pids(&os), vec![12, 10]);

        let preempted = os.ready_queue().iter().last().unwrap();
        assert_eq!(preempted.state, ProcessState::Ready);
        assert_eq!(preempted.program_counter, 30);

        tick(&mut os, 30);
        assert_eq!(os.current_pid(), 12);
        assert_eq!(ready_pids(&os), vec![10, 11]);
    }

    #[test]
    fn test_operating_system_resumes_saved_program_counter() {
        let mut os = os(1000);
        os.exec(A).unwrap();
        os.exec(B).unwrap();

        tick(&mut os, 61);

        assert_eq!(os.current_pid(), 10);
        assert_eq!(os.cpu().program_counter(), 30);
    }

    #[test]
    fn test_operating_system_single_process_keeps_running() {
        let mut os = os(1000);
        os.exec(A).unwrap();

        tick(&mut os, 100);

        assert_eq!(os.current_pid(), 10);
        assert!(os.ready_queue().is_empty());
    }

    #[test]
    fn test_operating_system_block_and_unblock() {
        let mut os = os(1000);
        os.exec(A).unwrap();
        tick(&mut os, 1);

        os.block_current().unwrap();
        os.check_invariants().unwrap();
        assert!(os.cpu().is_idle());
        assert_eq!(os.current_pid(), 0);
        assert_eq!(wait_pids(&os), vec![10]);
        assert_eq!(os.wait_queue().peek().unwrap().state, ProcessState::Waiting);

        os.exec(B).unwrap();
        tick(&mut os, 1);
        assert_eq!(os.current_pid(), 11);

        assert!(os.interrupt_and_unblock(10));
        os.check_invariants().unwrap();
        assert!(os.wait_queue().is_empty());
        assert_eq!(ready_pids(&os), vec![10]);
        assert_eq!(os.ready_queue().peek().unwrap().state, ProcessState::Ready);

        tick(&mut os, 28);
        assert_eq!(os.current_pid(), 11);

        tick(&mut os, 2);
        assert_eq!(os.current_pid(), 10);
        assert_eq!(os.running().unwrap().state, ProcessState::Running);
        assert_eq!(ready_pids(&os), vec![11]);
    }

    #[test]
    fn test_operating_system_block_dispatches_next_ready() {
        let mut os = os(1000);
        os.exec(A).unwrap();
        os.exec(B).unwrap();
        tick(&mut os, 1);

        os.block_current().unwrap();

        assert_eq!(os.current_pid(), 11);
        assert!(os.ready_queue().is_empty());
        assert_eq!(wait_pids(&os), vec![10]);
        os.check_invariants().unwrap();
    }

    #[test]
    fn test_operating_system_block_saves_context() {
        let mut os = os(1000);
        os.exec(A).unwrap();
        tick(&mut os, 6);

        os.block_current().unwrap();

        assert_eq!(os.wait_queue().peek().unwrap().program_counter, 5);
    }

    #[test]
    fn test_operating_system_block_when_idle_is_noop() {
        let mut os = os(1000);
        os.exec(A).unwrap();

        os.block_current().unwrap();
        os.kill_current().unwrap();

        assert!(os.wait_queue().is_empty());
        assert_eq!(ready_pids(&os), vec![10]);
        assert_eq!(free_map(&os), vec![(100, 900)]);
    }

    #[test]
    fn test_operating_system_unblock_out_of_order() {
        let mut os = os(1000);
        os.exec(A).unwrap();
        os.exec(B).unwrap();
        tick(&mut os, 1);
        os.block_current().unwrap();
        os.block_current().unwrap();
        assert_eq!(wait_pids(&os), vec![10, 11]);

        assert!(os.interrupt_and_unblock(11));

        assert_eq!(wait_pids(&os), vec![10]);
        assert_eq!(ready_pids(&os), vec![11]);
        os.check_invariants().unwrap();
    }

    #[test]
    fn test_operating_system_spurious_interrupt_changes_nothing() {
        let mut os = os(1000);
        os.exec(A).unwrap();
        os.exec(B).unwrap();
        tick(&mut os, 1);
        os.block_current().unwrap();

        let ready_before = ready_pids(&os);
        let wait_before = wait_pids(&os);
        let free_before = free_map(&os);
        let current_before = os.current_pid();

        assert!(!os.interrupt_and_unblock(11));
        assert!(!os.interrupt_and_unblock(99));

        assert_eq!(ready_pids(&os), ready_before);
        assert_eq!(wait_pids(&os), wait_before);
        assert_eq!(free_map(&os), free_before);
        assert_eq!(os.current_pid(), current_before);
    }

    #[test]
    fn test_operating_system_kill_frees_memory() {
        let mut os = os(300);
        assert_eq!(os.exec(A), Ok(10));
        assert_eq!(os.exec(B), Ok(11));
        assert_eq!(os.exec(C), Ok(12));
        let bases: Vec<usize> = os.ready_queue().iter().map(ProcessControlBlock::get_base).collect();
        assert_eq!(bases, vec![0, 100, 200]);

        tick(&mut os, 1);
        os.kill_current().unwrap();
        os.check_invariants().unwrap();

        assert_eq!(free_map(&os), vec![(0, 100)]);
        assert!(os.memory().read_block(0, 99).unwrap().iter().all(|&cell| cell == 0));
        assert_eq!(os.current_pid(), 11);

        let pid = os.exec(Program::new(50, 0xFFFFFFFF)).unwrap();
        let pcb = os.ready_queue().iter().find(|pcb| pcb.get_pid() == pid).unwrap();
        assert_eq!(pcb.get_base(), 0);
        assert_eq!(free_map(&os), vec![(50, 50)]);
        os.check_invariants().unwrap();
    }

    #[test]
    fn test_operating_system_kill_last_process_goes_idle() {
        let mut os = os(1000);
        os.exec(A).unwrap();
        tick(&mut os, 1);

        os.kill_current().unwrap();

        assert!(os.cpu().is_idle());
        assert_eq!(os.current_pid(), 0);
        assert!(os.running().is_none());
        os.check_invariants().unwrap();
    }

    #[test]
    fn test_operating_system_exec_kill_round_trip() {
        let mut os = os(1000);
        os.exec(A).unwrap();
        tick(&mut os, 1);
        os.kill_current().unwrap();

        assert_eq!(free_map(&os), vec![(0, 1000)]);

        os.exec(A).unwrap();
        assert_eq!(os.ready_queue().peek().unwrap().get_base(), 0);
    }

    #[test]
    fn test_operating_system_out_of_memory() {
        let mut os = os(100);
        assert_eq!(os.exec(Program::new(80, 1)), Ok(10));
        assert_eq!(
            os.exec(Program::new(30, 2)),
            Err(KernelError::OutOfMemory { requested: 30, largest_free: 20 })
        );

        assert_eq!(os.ready_queue().len(), 1);
        assert_eq!(os.next_pid(), 11);
        os.check_invariants().unwrap();
    }

    #[test]
    fn test_operating_system_zero_sized_program() {
        let mut os = os(100);
        assert_eq!(os.exec(Program::new(0, 1)), Err(KernelError::InvalidRequest));
        assert_eq!(os.next_pid(), 10);
    }

    /// Leaves holes of 100, 200 and 80 words at [0, 99], [150, 349] and [420, 499].
    fn fragmented_os(fit_policy: FitPolicy) -> OperatingSystem {
        let config = KernelConfig {
            memory_size: 500,
            fit_policy,
            ..KernelConfig::default()
        };
        let mut os = OperatingSystem::new(config).unwrap();
        os.exec(Program::new(100, 1)).unwrap();
        os.exec(Program::new(50, 2)).unwrap();
        os.exec(Program::new(200, 3)).unwrap();
        os.exec(Program::new(70, 4)).unwrap();

        tick(&mut os, 1);
        os.kill_current().unwrap();
        os.block_current().unwrap();
        os.kill_current().unwrap();
        os.check_invariants().unwrap();

        assert_eq!(os.current_pid(), 13);
        assert_eq!(free_map(&os), vec![(0, 100), (150, 200), (420, 80)]);
        os
    }

    fn exec_base(os: &mut OperatingSystem, program: Program) -> usize {
        let pid = os.exec(program).unwrap();
        os.check_invariants().unwrap();
        os.ready_queue().iter().find(|pcb| pcb.get_pid() == pid).unwrap().get_base()
    }

    #[test]
    fn test_operating_system_first_fit_takes_lowest_hole() {
        let mut os = fragmented_os(FitPolicy::FirstFit);
        assert_eq!(exec_base(&mut os, Program::new(40, 5)), 0);
        assert_eq!(free_map(&os), vec![(40, 60), (150, 200), (420, 80)]);
    }

    #[test]
    fn test_operating_system_best_fit_takes_smallest_hole() {
        let mut os = fragmented_os(FitPolicy::BestFit);
        assert_eq!(exec_base(&mut os, Program::new(40, 5)), 420);
        assert_eq!(free_map(&os), vec![(0, 100), (150, 200), (460, 40)]);
    }

    #[test]
    fn test_operating_system_worst_fit_takes_largest_hole() {
        let mut os = fragmented_os(FitPolicy::WorstFit);
        assert_eq!(exec_base(&mut os, Program::new(40, 5)), 150);
        assert_eq!(free_map(&os), vec![(0, 100), (190, 160), (420, 80)]);
    }

    #[test]
    fn test_operating_system_pids_are_unique_and_increasing() {
        let mut os = os(1000);
        let pids: Vec<Pid> = (0..5).map(|_| os.exec(Program::new(10, 1)).unwrap()).collect();
        assert_eq!(pids, vec![10, 11, 12, 13, 14]);

        tick(&mut os, 1);
        os.kill_current().unwrap();
        assert_eq!(os.exec(Program::new(10, 1)), Ok(15));
    }

    #[test]
    fn test_operating_system_colors_survive_until_kill() {
        let mut os = os(300);
        os.exec(A).unwrap();
        os.exec(B).unwrap();

        tick(&mut os, 45);
        os.block_current().unwrap();
        tick(&mut os, 10);

        assert!(os.memory().read_block(0, 99).unwrap().iter().all(|&cell| cell == A.color));
        assert!(os.memory().read_block(100, 199).unwrap().iter().all(|&cell| cell == B.color));
    }

    #[test]
    fn test_operating_system_custom_time_slice() {
        let config = KernelConfig {
            memory_size: 1000,
            round_robin_cycle_limit: 5,
            ..KernelConfig::default()
        };
        let mut os = OperatingSystem::new(config).unwrap();
        os.exec(A).unwrap();
        os.exec(B).unwrap();

        tick(&mut os, 5);
        assert_eq!(os.current_pid(), 10);
        tick(&mut os, 1);
        assert_eq!(os.current_pid(), 11);
    }

    #[test]
    fn test_operating_system_check_invariants_detects_broken_state() {
        let mut os = os(1000);
        os.exec(A).unwrap();
        os.ready_queue.add(ProcessControlBlock::new(10, 500, 599, B));

        assert!(matches!(os.check_invariants(), Err(KernelError::InvariantViolation(_))));
    }
}
