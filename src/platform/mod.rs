//! Filesystem access behind a trait so the engine can be exercised with fault injection.

pub mod pal;
