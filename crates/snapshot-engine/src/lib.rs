pub mod builder;
pub mod cache;
pub mod config;
pub mod market_hours;

#[cfg(test)]
mod testing;

pub use builder::*;
pub use cache::*;
pub use config::*;
pub use market_hours::*;
