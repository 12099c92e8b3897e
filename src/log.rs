//! Logging macros for the OS abstraction layer
//!
//! Forwards to `defmt` on embedded targets, to the `log` crate on hosts, or
//! compiles to nothing when neither feature is enabled. Messages stick to
//! `{}` and `{:#x}` so that every backend accepts them.

/// Trace message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::__defmt::trace!($($arg)*) };
}

/// Debug message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::__defmt::debug!($($arg)*) };
}

/// Info message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::__defmt::info!($($arg)*) };
}

/// Warning message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::__defmt::warn!($($arg)*) };
}

/// Error message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::__defmt::error!($($arg)*) };
}

// Host builds go through the `log` facade
#[cfg(all(feature = "log", not(feature = "defmt")))]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::__log::trace!(target: "osal", $($arg)*) };
}
#[cfg(all(feature = "log", not(feature = "defmt")))]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::__log::debug!(target: "osal", $($arg)*) };
}
#[cfg(all(feature = "log", not(feature = "defmt")))]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::__log::info!(target: "osal", $($arg)*) };
}
#[cfg(all(feature = "log", not(feature = "defmt")))]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::__log::warn!(target: "osal", $($arg)*) };
}
#[cfg(all(feature = "log", not(feature = "defmt")))]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::__log::error!(target: "osal", $($arg)*) };
}

// No-op versions, arguments are still type-checked
#[cfg(not(any(feature = "defmt", feature = "log")))]
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => { if false { ::core::mem::drop(::core::format_args!($($arg)*)); } }; }
#[cfg(not(any(feature = "defmt", feature = "log")))]
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => { if false { ::core::mem::drop(::core::format_args!($($arg)*)); } }; }
#[cfg(not(any(feature = "defmt", feature = "log")))]
#[macro_export]
macro_rules! info { ($($arg:tt)*) => { if false { ::core::mem::drop(::core::format_args!($($arg)*)); } }; }
#[cfg(not(any(feature = "defmt", feature = "log")))]
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => { if false { ::core::mem::drop(::core::format_args!($($arg)*)); } }; }
#[cfg(not(any(feature = "defmt", feature = "log")))]
#[macro_export]
macro_rules! error { ($($arg:tt)*) => { if false { ::core::mem::drop(::core::format_args!($($arg)*)); } }; }
