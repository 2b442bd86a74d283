mod allocator;
mod poll;

pub use allocator::PtyAllocator;
pub use poll::{wait_readable, wait_writable};
