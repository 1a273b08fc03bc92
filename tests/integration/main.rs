//! End-to-end tests against an in-memory odds feed.

mod mock_source;
mod pipeline;
