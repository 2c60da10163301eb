//! Profiling scopes based on the `puffin` crate.
//!
//! With the `profiling` feature disabled the macro expands to nothing, so
//! call sites never need their own `cfg`. Puffin scopes are `!Send`; only use
//! them in synchronous code, never across an `.await`.
//!
//! Frames are marked by the application (`puffin::GlobalProfiler::lock().new_frame()`),
//! never by library code.

#[cfg(feature = "profiling")]
pub use puffin::profile_function;

#[cfg(not(feature = "profiling"))]
pub use crate::__stowage_noop_profile as profile_function;

#[doc(hidden)]
#[macro_export]
macro_rules! __stowage_noop_profile {
    ($($arg:tt)*) => {};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiled() -> u32 {
        profile_function!();
        42
    }

    #[test]
    fn test_profile_function_is_transparent() {
        assert_eq!(profiled(), 42);
    }
}
