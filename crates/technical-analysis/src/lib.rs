pub mod indicators;
pub mod engine;
pub mod classifier;


pub use indicators::*;
pub use engine::*;
pub use classifier::*;
