//! Benchmark blocks: sources, the affine transform, and sinks.

mod head;
mod saxpy;
mod sink;
mod source;

pub use head::Head;
pub use saxpy::Saxpy;
pub use sink::{
    BenchmarkSink, CountProbe, CountingSink, ThroughputReport, VectorProbe, VectorSink,
    DEFAULT_MEASURE_EVERY,
};
pub use source::{ConstantSource, DummySource, VectorSource};
