pub mod condition;
pub mod execution;
pub mod group;
pub mod types;


pub use condition::*;
pub use execution::*;
pub use group::*;
pub use types::*;
