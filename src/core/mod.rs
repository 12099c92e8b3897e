//! Core OS modules
//!
//! Contains the OS context, handles, task, time and timer management.

pub mod config;
pub mod critical;
pub mod error;
pub mod handle;
pub mod isr;
pub mod kernel;
pub mod resource;
pub mod task;
pub mod time;
pub mod timer;
pub mod types;
