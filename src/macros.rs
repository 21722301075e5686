#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => {
        #[cfg(any(test, feature = "trace"))]
        tracing::trace!($($arg)+)
    };
}
pub(crate) use crate::trace;

#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        #[cfg(any(test, feature = "trace"))]
        tracing::debug!($($arg)+)
    };
}
pub(crate) use crate::debug;

#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        #[cfg(any(test, feature = "trace"))]
        tracing::info!($($arg)+)
    };
}
pub(crate) use crate::info;

#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        #[cfg(any(test, feature = "trace"))]
        tracing::warn!($($arg)+)
    };
}
pub(crate) use crate::warn;

#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {
        #[cfg(any(test, feature = "trace"))]
        tracing::error!($($arg)+)
    };
}
pub(crate) use crate::error;
