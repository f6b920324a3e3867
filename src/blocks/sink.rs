use crate::block::{Block, WorkIo, WorkStatus};
use crate::error::BlockError;
use crate::port::{Item, PortSpec};
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Items between throughput reports.
pub const DEFAULT_MEASURE_EVERY: u64 = 1 << 30;

/// One throughput measurement from a [`BenchmarkSink`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputReport {
    /// Items counted since the previous report.
    pub items: u64,
    /// Wall time since the previous report (or `start`).
    pub elapsed: Duration,
}

impl ThroughputReport {
    /// Items per second over the measured interval.
    pub fn items_per_sec(&self) -> f64 {
        self.items as f64 / self.elapsed.as_secs_f64()
    }
}

impl fmt::Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "samples/s = {:.3e}", self.items_per_sec())
    }
}

type Reporter = Box<dyn FnMut(ThroughputReport) + Send>;

fn print_report(report: ThroughputReport) {
    tracing::info!(
        items = report.items,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "throughput"
    );
    println!("{report}");
}

/// Consumes everything and reports items per second every `measure_every`
/// items. Never finishes on its own.
pub struct BenchmarkSink<T> {
    count: u64,
    time: Instant,
    measure_every: u64,
    reporter: Reporter,
    _item: PhantomData<T>,
}

impl<T: Item> BenchmarkSink<T> {
    /// Print a report line every [`DEFAULT_MEASURE_EVERY`] items.
    pub fn new() -> Self {
        Self::with_reporter(DEFAULT_MEASURE_EVERY, print_report)
    }

    /// Report every `measure_every` items through `reporter`.
    pub fn with_reporter(
        measure_every: u64,
        reporter: impl FnMut(ThroughputReport) + Send + 'static,
    ) -> Self {
        Self {
            count: 0,
            time: Instant::now(),
            measure_every: measure_every.max(1),
            reporter: Box::new(reporter),
            _item: PhantomData,
        }
    }

    /// Print a report line every `measure_every` items.
    pub fn every(measure_every: u64) -> Self {
        Self::with_reporter(measure_every, print_report)
    }
}

impl<T: Item> Default for BenchmarkSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BenchmarkSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkSink")
            .field("count", &self.count)
            .field("measure_every", &self.measure_every)
            .finish()
    }
}

impl<T: Item> Block for BenchmarkSink<T> {
    fn name(&self) -> &str {
        "BenchmarkSink"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new::<T>("in")]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn start(&mut self) -> Result<(), BlockError> {
        self.time = Instant::now();
        Ok(())
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkStatus, BlockError> {
        let input = io.input(0);
        let len = input.len();
        input.consume(len);
        self.count += len as u64;
        if self.count >= self.measure_every {
            let now = Instant::now();
            (self.reporter)(ThroughputReport {
                items: self.count,
                elapsed: now - self.time,
            });
            self.count = 0;
            self.time = now;
        }
        Ok(WorkStatus::Ok)
    }
}

/// Read side of a [`CountingSink`], usable after the run.
#[derive(Debug, Clone, Default)]
pub struct CountProbe(Arc<AtomicU64>);

impl CountProbe {
    /// Items consumed so far.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Consumes and counts everything.
#[derive(Debug)]
pub struct CountingSink<T> {
    count: Arc<AtomicU64>,
    _item: PhantomData<T>,
}

impl<T: Item> CountingSink<T> {
    /// Sink with a zero count.
    pub fn new() -> Self {
        Self {
            count: Arc::default(),
            _item: PhantomData,
        }
    }

    /// Handle for reading the count from outside the run.
    pub fn probe(&self) -> CountProbe {
        CountProbe(Arc::clone(&self.count))
    }
}

impl<T: Item> Default for CountingSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> Block for CountingSink<T> {
    fn name(&self) -> &str {
        "CountingSink"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new::<T>("in")]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkStatus, BlockError> {
        let input = io.input(0);
        let len = input.len();
        input.consume(len);
        self.count.fetch_add(len as u64, Ordering::Release);
        Ok(WorkStatus::Ok)
    }
}

/// Read side of a [`VectorSink`].
#[derive(Debug, Clone)]
pub struct VectorProbe<T>(Arc<Mutex<Vec<T>>>);

impl<T: Item> VectorProbe<T> {
    /// Items collected so far.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Nothing collected yet.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Copy of everything collected, in arrival order.
    pub fn items(&self) -> Vec<T> {
        self.0.lock().clone()
    }
}

/// Appends every consumed item to a shared vector.
#[derive(Debug)]
pub struct VectorSink<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T: Item> VectorSink<T> {
    /// Sink with nothing collected.
    pub fn new() -> Self {
        Self {
            items: Arc::default(),
        }
    }

    /// Handle for reading the collected items.
    pub fn probe(&self) -> VectorProbe<T> {
        VectorProbe(Arc::clone(&self.items))
    }
}

impl<T: Item> Default for VectorSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> Block for VectorSink<T> {
    fn name(&self) -> &str {
        "VectorSink"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new::<T>("in")]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkStatus, BlockError> {
        let input = io.input(0);
        let items = input.items::<T>()?;
        self.items.lock().extend_from_slice(items);
        input.consume(items.len());
        Ok(WorkStatus::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::InputSpan;
    use crate::buffer::{AnyBuffer, RingBuffer};

    fn run_sink<B: Block>(sink: &mut B, ring: &RingBuffer<f32>) -> WorkStatus {
        let mut io = WorkIo::new(vec![InputSpan::new(ring, ring.read_state(1))], Vec::new());
        let status = sink.work(&mut io).unwrap();
        ring.commit_read(io.inputs[0].consumed());
        status
    }

    #[test]
    fn benchmark_sink_reports_at_threshold() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&reports);
        let mut sink = BenchmarkSink::<f32>::with_reporter(10, move |r| seen.lock().push(r));
        sink.start().unwrap();

        let ring = RingBuffer::<f32>::new(16);
        ring.commit_write(6);
        assert_eq!(run_sink(&mut sink, &ring), WorkStatus::Ok);
        assert!(reports.lock().is_empty());

        ring.commit_write(6);
        assert_eq!(run_sink(&mut sink, &ring), WorkStatus::Ok);
        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].items, 12);
        assert_eq!(sink.count, 0);
    }

    #[test]
    fn benchmark_sink_is_ok_on_empty_input() {
        let mut sink = BenchmarkSink::<f32>::every(1);
        let ring = RingBuffer::<f32>::new(4);
        assert_eq!(run_sink(&mut sink, &ring), WorkStatus::Ok);
    }

    #[test]
    fn report_line_is_human_readable() {
        let report = ThroughputReport {
            items: 2_000_000,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(report.to_string(), "samples/s = 1.000e6");
    }

    #[test]
    fn counting_sink_counts() {
        let mut sink = CountingSink::<f32>::new();
        let probe = sink.probe();
        let ring = RingBuffer::<f32>::new(8);
        ring.commit_write(5);
        run_sink(&mut sink, &ring);
        assert_eq!(probe.get(), 5);
        assert!(ring.is_empty());
    }
}
