//! Feature-gated logging macros.
//!
//! `log` is an optional dependency (Cargo.toml), so call sites can't
//! reference `log::debug!` unconditionally — a build with the `log`
//! feature off wouldn't even link the crate. These macros expand to the
//! real `log` macro when the feature is on and to nothing otherwise,
//! the same shape `smoltcp` uses for its own `net_trace!`.

#[cfg(feature = "log")]
macro_rules! core_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}
#[cfg(not(feature = "log"))]
macro_rules! core_debug {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! core_trace {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}
#[cfg(not(feature = "log"))]
macro_rules! core_trace {
    ($($arg:tt)*) => {};
}

pub(crate) use core_debug;
pub(crate) use core_trace;
