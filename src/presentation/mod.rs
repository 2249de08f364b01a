//! Presentation layer handling terminal UI and user input.
//!
//! This module manages the terminal user interface using ratatui,
//! translates key presses into saga commands, and renders purchase progress.

pub mod ui;
pub mod input;

pub use ui::*;
pub use input::*;
