/// A program handed to the kernel by an external loader.
/// The kernel only cares about how many words it occupies
/// and the color that its memory region is painted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Program {
    pub size: usize,
    pub color: u32,
}

impl Program {
    pub fn new(size: usize, color: u32) -> Program {
        Program { size, color }
    }
}
