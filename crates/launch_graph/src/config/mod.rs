//! Launch description data: expressions, arguments, conditions and the YAML schema

mod action;
mod condition;
mod expression;
mod launch_file;
mod registry;
mod substitution;

pub use action::*;
pub use condition::*;
pub use expression::*;
pub use launch_file::*;
pub use registry::*;
pub use substitution::*;
