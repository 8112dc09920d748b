use super::KernelError;

pub type Word = u32;

/// Flat physical memory of word cells. Memory performs bounds checks only;
/// whether a process may touch an address is decided by the kernel.
pub struct Memory {
    data: Vec<Word>,
}

impl Memory {
    pub fn new(size: usize) -> Memory {
        Memory { data: vec![0; size] }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn read(&self, address: usize) -> Result<Word, KernelError> {
        self.check_address(address)?;
        Ok(self.data[address])
    }

    pub fn write(&mut self, address: usize, value: Word) -> Result<(), KernelError> {
        self.check_address(address)?;
        self.data[address] = value;
        Ok(())
    }

    /// Returns the cells of the inclusive range `[start, end]`.
    pub fn read_block(&self, start: usize, end: usize) -> Result<&[Word], KernelError> {
        self.check_region(start, end)?;
        Ok(&self.data[start..=end])
    }

    /// Sets every cell of the inclusive range `[start, end]` to `value`.
    pub fn fill(&mut self, start: usize, end: usize, value: Word) -> Result<(), KernelError> {
        self.check_region(start, end)?;
        self.data[start..=end].fill(value);
        Ok(())
    }

    fn check_address(&self, address: usize) -> Result<(), KernelError> {
        if address >= self.data.len() {
            return Err(KernelError::OutOfRange {
                address,
                size: self.data.len(),
            });
        }

        Ok(())
    }

    fn check_region(&self, start: usize, end: usize) -> Result<(), KernelError> {
        if start > end {
            return Err(KernelError::InvalidRegion { start, end });
        }
        self.check_address(start)?;
        self.check_address(end)
    }
}
