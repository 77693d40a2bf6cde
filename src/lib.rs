//! Records which application or browser host is in focus as contiguous intervals, and
//! summarizes them over a lookback window: totals per activity, untracked time and gaps.
//!

pub mod cli;
pub mod config;
pub mod daemon;
pub mod utils;
pub mod window_api;
