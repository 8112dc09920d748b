use std::fmt;
use std::str::FromStr;

use log::{error, info, warn};

use super::*;

use crate::io::Program;

/// Host input delivered between ticks. One event per script line:
///
/// ```text
/// spawn
/// block | b
/// kill | k
/// interrupt <pid> | click <pid>
/// tick [count]
/// status
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Spawn,
    Block,
    Kill,
    Interrupt(Pid),
    Tick(u64),
    Status,
}

impl FromStr for Event {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let command = words.next().ok_or("empty event")?.to_ascii_lowercase();
        let argument = words.next();

        if words.next().is_some() {
            return Err(format!("too many arguments: {}", s.trim()));
        }

        match (command.as_str(), argument) {
            ("spawn", None) => Ok(Event::Spawn),
            ("block" | "b", None) => Ok(Event::Block),
            ("kill" | "k", None) => Ok(Event::Kill),
            ("status", None) => Ok(Event::Status),
            ("tick", None) => Ok(Event::Tick(1)),
            ("tick", Some(count)) => count
                .parse()
                .map(Event::Tick)
                .map_err(|_| format!("invalid tick count: {}", count)),
            ("interrupt" | "click", Some(pid)) => pid
                .parse()
                .map(Event::Interrupt)
                .map_err(|_| format!("invalid pid: {}", pid)),
            ("interrupt" | "click", None) => Err("interrupt needs a pid".to_string()),
            _ => Err(format!("unknown event: {}", s.trim())),
        }
    }
}

/// Drives the kernel from a stream of host events, standing in for the
/// interactive event loop. Spawns cycle through the loaded programs.
pub struct Driver {
    os: OperatingSystem,
    programs: Vec<Program>,
    next_program_idx: usize,
    rejected_count: usize,
}

impl Driver {
    pub fn new(os: OperatingSystem, programs: Vec<Program>) -> Driver {
        Driver {
            os,
            programs,
            next_program_idx: 0,
            rejected_count: 0,
        }
    }

    pub fn os(&self) -> &OperatingSystem {
        &self.os
    }

    /// Number of spawns the kernel turned down.
    pub fn rejected_count(&self) -> usize {
        self.rejected_count
    }

    /// Runs every event of `script`, one per line. Unparseable lines are
    /// skipped; the first fatal kernel error stops the run.
    pub fn run(&mut self, script: &str) -> Result<(), KernelError> {
        info!("Starting the driver with {} programs.", self.programs.len());

        for (line_num, line) in script.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let event = match line.parse::<Event>() {
                Ok(event) => event,
                Err(err) => {
                    warn!("Skipping line {}: {}", line_num + 1, err);
                    continue;
                }
            };

            self.handle(event).map_err(|err| {
                error!("Halting simulation at line {}: {}", line_num + 1, err);
                err
            })?;
        }

        info!("Driver finished at cycle {}.", self.os.cpu().cycle_count());
        Ok(())
    }

    /// Applies one event. Recoverable kernel errors are reported and absorbed.
    pub fn handle(&mut self, event: Event) -> Result<(), KernelError> {
        match event {
            Event::Spawn => self.spawn()?,
            Event::Block => self.os.block_current()?,
            Event::Kill => self.os.kill_current()?,
            Event::Interrupt(pid) => {
                self.os.interrupt_and_unblock(pid);
            }
            Event::Tick(count) => {
                for _ in 0..count {
                    self.os.tick()?;
                }
            }
            Event::Status => println!("{}", self.status()),
        }

        if cfg!(debug_assertions) {
            self.os.check_invariants()?;
        }

        Ok(())
    }

    fn spawn(&mut self) -> Result<(), KernelError> {
        if self.programs.is_empty() {
            warn!("No programs to spawn.");
            return Ok(());
        }

        let program = self.programs[self.next_program_idx % self.programs.len()];
        self.next_program_idx += 1;

        match self.os.exec(program) {
            Ok(_) => Ok(()),
            Err(err) if !err.is_fatal() => {
                self.rejected_count += 1;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// One-line summary of the CPU and both queues.
    pub fn status(&self) -> String {
        let cpu = self.os.cpu();
        let pids = |queue: &ProcessQueue| {
            queue
                .iter()
                .map(|pcb| pcb.get_pid().to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };

        let running = if cpu.is_idle() {
            "idle (kernel idle process)".to_string()
        } else {
            format!("pid {} PC {}", self.os.current_pid(), cpu.program_counter())
        };

        format!(
            "cycle {} | CPU {} | ready [{}] | wait [{}] | free {} words",
            cpu.cycle_count(),
            running,
            pids(self.os.ready_queue()),
            pids(self.os.wait_queue()),
            self.os.allocator().free_words()
        )
    }

    /// Table of every live process plus the free map.
    pub fn report(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Processes at cycle {}:", self.os.cpu().cycle_count())?;
        writeln!(f, "... PID | State      | Base    | Limit   | PC      | Color")?;
        writeln!(f, "...-----|------------|---------|---------|---------|---------")?;
        for pcb in self.os.processes() {
            let program_counter = if pcb.state == ProcessState::Running {
                self.os.cpu().program_counter()
            } else {
                pcb.program_counter
            };
            writeln!(
                f,
                "... {:03} | {:<10} | {:07} | {:07} | {:07} | {:08X}",
                pcb.get_pid(),
                format!("{:?}", pcb.state),
                pcb.get_base(),
                pcb.get_limit(),
                program_counter,
                pcb.get_program().color
            )?;
        }

        writeln!(f, "Free intervals ({}):", self.os.allocator().policy())?;
        for (start, length) in self.os.allocator().free_intervals() {
            writeln!(f, "... [{}, {}] {} words", start, start + length - 1, length)?;
        }
        write!(f, "Rejected spawns: {}", self.rejected_count)
    }
}
