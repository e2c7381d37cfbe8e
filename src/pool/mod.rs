//! Connection pools with admission control.

mod async_pool;
mod sync_pool;

pub use async_pool::AsyncPool;
pub use sync_pool::SyncPool;
