//! Command implementations behind the CLI. Output goes to the given writer.

mod links;
mod packages;
mod project;

pub use links::links;
pub use packages::packages;
pub use project::{create_project, delete_project, subproject};
