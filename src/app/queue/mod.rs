//! Download task queue
//!
//! Shared queue that fans [`DownloadTask`](crate::app::models::DownloadTask)s
//! out to the worker pool.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use playlist_fetcher::app::queue::TaskQueue;
//!
//! # async fn example(tasks: Vec<playlist_fetcher::app::models::DownloadTask>) {
//! let queue = TaskQueue::new();
//! queue.add_tasks(tasks).await;
//!
//! while let Some(claimed) = queue.claim_next(0).await {
//!     // process claimed.task ...
//!     queue.mark_finished(&claimed.task_id()).await;
//! }
//! # }
//! ```

pub mod core;
pub mod types;

pub use core::TaskQueue;
pub use types::{ClaimedTask, QueueStats, TaskStatus};
