//! Runtime components: graph construction, resolution and process supervision

pub mod graph;
pub mod launcher;
pub mod mock;
pub mod plan;
pub mod process;
pub mod supervisor;

pub use graph::*;
pub use launcher::*;
pub use plan::*;
pub use process::*;
pub use supervisor::*;
