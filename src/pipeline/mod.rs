// Sensor pipeline: generator → filter → transformer → store.
// Stages run on their own threads and hand records off through
// zero-capacity channels; a shared CancelToken interrupts every
// blocking send and receive.

pub mod cancel;
pub mod filter;
pub mod generator;
pub mod orchestrator;
pub mod reading;
pub mod stage;
pub mod store;
pub mod transformer;

pub use cancel::CancelToken;
pub use orchestrator::{Pipeline, PipelineHandle, PipelineReport};
pub use reading::{Processed, Reading};
pub use store::Store;
