//! Hook implementations

pub mod async_hook;
pub mod sync_hook;

pub use async_hook::{AsyncClickHouseHook, AsyncHookBuilder};
pub use sync_hook::ClickHouseHook;

pub use crate::core::Hook;
