//! Transport-independent streaming algorithms.
//!
//! Both algorithms take a cancellation token and talk to the outside world
//! through a sink or a source, so they are exercised directly in unit tests.
//!
//! - [`feed`] - paced, bounded notification feed (server streaming).
//! - [`upload`] - fragment aggregation into a single result (client
//!   streaming).
//! - [`sleep`] - pluggable pacing delay.

pub mod feed;
pub mod sleep;
pub mod upload;
