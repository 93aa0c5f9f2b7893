pub mod ignition;
pub mod reentrancy;

pub use ignition::*;
pub use reentrancy::is_in_intercept;
