//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside a cache manager.
//!
//! # Tasks
//! - Expiry Cleanup: Removes entries past their max age at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;
