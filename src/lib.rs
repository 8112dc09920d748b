//! A teaching simulator of a single-CPU operating system kernel: round-robin
//! scheduling over ready and wait queues, context switching against a
//! simulated CPU, and a contiguous memory allocator with a free list.

pub mod config;
pub mod io;
pub mod kernel;
