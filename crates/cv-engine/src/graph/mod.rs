pub mod resolve;
pub mod store;
pub mod writer;

pub use resolve::ResolutionIndex;
pub use store::{GraphStore, GraphValue};
pub use writer::GraphWriter;
