//! Change detection: path index, change lists, tree walker.

pub mod changes;
pub mod context;
pub mod index;
pub mod walker;
