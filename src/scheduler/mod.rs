pub mod active;
pub mod config;
pub mod manager;
pub mod project;

#[cfg(test)]
mod tests;

pub use active::*;
pub use config::*;
pub use manager::*;
pub use project::*;
