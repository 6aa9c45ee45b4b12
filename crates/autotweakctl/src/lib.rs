//! AutoTweak front-end library
//!
//! Tuning recipes, the confirmation prompt and the read-only system
//! report. The binary wires these to the command line.

pub mod fstab;
pub mod prompt;
pub mod recipes;
pub mod system_info;

pub use prompt::{Confirm, TerminalPrompt};
pub use recipes::{run_recipe, select_kinds, RecipeContext, RecipePaths};
