mod allocator;
#[cfg(test)]
mod tests;

pub use allocator::*;
