use std::error::Error;
use std::fmt;

use super::ProcessState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// No free interval can hold the requested number of words.
    OutOfMemory { requested: usize, largest_free: usize },
    /// A program or allocation asked for zero words.
    InvalidRequest,
    /// Memory access outside `[0, size)`.
    OutOfRange { address: usize, size: usize },
    /// Removal from an empty process queue.
    EmptyQueue(ProcessState),
    /// Release of a region that overlaps free space.
    DoubleFree { start: usize, end: usize },
    /// Release of a region that is not a valid inclusive range inside memory.
    InvalidRegion { start: usize, end: usize },
    InvalidConfig(&'static str),
    InvariantViolation(String),
}

impl KernelError {
    /// Fatal errors mean the kernel state can no longer be trusted and the
    /// simulation has to stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            KernelError::OutOfMemory { .. } | KernelError::InvalidRequest | KernelError::InvalidConfig(_)
        )
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::OutOfMemory { requested, largest_free } => write!(
                f,
                "Out of memory: requested {} words, largest free interval is {} words",
                requested, largest_free
            ),
            KernelError::InvalidRequest => write!(f, "Invalid request: cannot allocate zero words"),
            KernelError::OutOfRange { address, size } => write!(
                f,
                "Out of bounds memory access: address {} is outside memory of size {}",
                address, size
            ),
            KernelError::EmptyQueue(state) => write!(f, "Cannot remove from empty {:?} queue", state),
            KernelError::DoubleFree { start, end } => {
                write!(f, "Double free: region [{}, {}] overlaps free memory", start, end)
            }
            KernelError::InvalidRegion { start, end } => write!(f, "Invalid memory region [{}, {}]", start, end),
            KernelError::InvalidConfig(reason) => write!(f, "Invalid configuration: {}", reason),
            KernelError::InvariantViolation(reason) => write!(f, "Kernel invariant violated: {}", reason),
        }
    }
}

impl Error for KernelError {}
