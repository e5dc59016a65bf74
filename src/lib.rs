//! # Sensor Pipeline
//! Concurrent streaming pipeline for synthetic temperature samples.
//!
//! Generator → Range Filter → Unit Transformer → Store, one thread per stage,
//! rendezvous channels between stages for backpressure, and a broadcast
//! cancellation token that can interrupt any stage while it is blocked.

pub mod pipeline;
pub mod utils;
