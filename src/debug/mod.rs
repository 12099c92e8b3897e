//! Diagnostics built on top of the primitives
//!
//! Contains the inactivity detector and the task dump.

pub mod dump;
pub mod inactivity;
