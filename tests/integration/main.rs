//! Integration tests: the full snapshot → scan → execute pipeline against
//! an in-memory exchange and a real on-disk data directory.

mod mock_exchange;
mod pipeline;
