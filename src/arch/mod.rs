//! Hardware bindings.

pub mod i386;
