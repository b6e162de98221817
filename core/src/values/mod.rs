pub mod dump;
pub mod raw;

pub use dump::write_value;
pub use raw::{BlockData, FIXED_SCALE};

#[cfg(test)]
mod raw_test;
