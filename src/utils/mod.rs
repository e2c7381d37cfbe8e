pub mod delay;
pub mod limiter;
pub(crate) mod shutdown;

pub use delay::ExpDelay;
pub use limiter::TimeoutLimiter;
pub(crate) use shutdown::Shutdown;
