//! # Data Structures Module
//!
//! Allocation-free containers shared by interrupt handlers and normal code.
//!
//! ## Modules
//!
//! - `ring`: fixed-capacity FIFO that producers in interrupt context and
//!   consumers in normal context can use concurrently

pub mod ring;

pub use ring::Ring;
