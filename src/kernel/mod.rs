mod allocator;
mod cpu;
mod error;
mod memory;
mod operating_system;
mod process_control_block;
mod process_queue;

pub mod driver;

pub use allocator::Allocator;
pub use cpu::Cpu;
pub use driver::{Driver, Event};
pub use error::KernelError;
pub use memory::{Memory, Word};
pub use operating_system::OperatingSystem;
pub use process_control_block::{Pid, ProcessControlBlock, ProcessState};
pub use process_queue::ProcessQueue;
