use flowbench::blocks::{ConstantSource, Saxpy, VectorProbe, VectorSink, VectorSource};
use flowbench::kernels::ScalarKernel;
use flowbench::{
    Block, BlockError, BlockId, ExecutionMode, Graph, Partition, PortSpec, RunSummary, Scheduler,
    SchedulerError, WorkIo, WorkStatus,
};

#[test]
fn saxpy_two_one_turns_ones_into_threes() {
    let mut graph = Graph::new();
    let source = graph.emplace_block(ConstantSource::new(1.0f32, 65_536));
    let saxpy = graph.emplace_block(Saxpy::new(2.0, 1.0));
    let sink = VectorSink::<f32>::new();
    let probe = sink.probe();
    let sink = graph.emplace_block(sink);
    graph.connect(source, "out", saxpy, "in").unwrap();
    graph.connect(saxpy, "out", sink, "in").unwrap();

    let summary = Scheduler::new(graph, ExecutionMode::Sequential)
        .unwrap()
        .run()
        .unwrap();

    let items = probe.items();
    assert_eq!(items.len(), 65_536);
    assert!(items.iter().all(|&x| x == 3.0));
    assert!(summary.invocations > 0);
}

#[test]
fn chained_kernels_compose() {
    let mut graph = Graph::new();
    let source = graph.emplace_block(ConstantSource::new(4.0f32, 8_192));
    let double = graph.emplace_block(Saxpy::new(2.0, 0.0));
    let halve_plus_one = graph.emplace_block(Saxpy::new(0.5, 1.0));
    let sink = VectorSink::<f32>::new();
    let probe = sink.probe();
    let sink = graph.emplace_block(sink);
    graph.connect(source, "out", double, "in").unwrap();
    graph.connect(double, "out", halve_plus_one, "in").unwrap();
    graph.connect(halve_plus_one, "out", sink, "in").unwrap();

    Scheduler::new(graph, ExecutionMode::Pool { workers: 2 })
        .unwrap()
        .run()
        .unwrap();

    let items = probe.items();
    assert_eq!(items.len(), 8_192);
    assert!(items.iter().all(|&x| x == 5.0));
}

#[test]
fn labeled_items_arrive_in_order() {
    // 64_000 is a whole number of spans for every kernel width
    let labels: Vec<f32> = (0..64_000).map(|i| i as f32).collect();
    let mut graph = Graph::new();
    let source = graph.emplace_block(VectorSource::new(labels.clone()));
    let identity = graph.emplace_block(Saxpy::new(1.0, 0.0));
    let sink = VectorSink::<f32>::new();
    let probe = sink.probe();
    let sink = graph.emplace_block(sink);
    graph.connect(source, "out", identity, "in").unwrap();
    graph.connect(identity, "out", sink, "in").unwrap();

    let scheduler = flowbench::Scheduler::with_config(
        graph,
        ExecutionMode::Pool { workers: 3 },
        flowbench::SchedulerConfig::with_buffer_capacity(512),
    )
    .unwrap();
    scheduler.run().unwrap();

    assert_eq!(probe.items(), labels);
}

/// source -> saxpy(2, 1) -> vector sink, for `count` ones.
fn ones_through_saxpy(count: u64) -> (Graph, VectorProbe<f32>) {
    let mut graph = Graph::new();
    let source = graph.emplace_block(ConstantSource::new(1.0f32, count));
    let saxpy = graph.emplace_block(Saxpy::new(2.0, 1.0));
    let sink = VectorSink::<f32>::new();
    let probe = sink.probe();
    let sink = graph.emplace_block(sink);
    graph.connect(source, "out", saxpy, "in").unwrap();
    graph.connect(saxpy, "out", sink, "in").unwrap();
    (graph, probe)
}

#[test]
fn tail_shorter_than_a_span_still_arrives() {
    let modes = [
        ExecutionMode::Sequential,
        ExecutionMode::Pool { workers: 2 },
        ExecutionMode::JobList(Partition::new(vec![
            vec![BlockId(0)],
            vec![BlockId(1), BlockId(2)],
        ])),
    ];
    for mode in modes {
        let (graph, probe) = ones_through_saxpy(100);
        let scheduler = Scheduler::new(graph, mode.clone()).unwrap();
        #[cfg(any(target_arch = "aarch64", target_arch = "x86_64"))]
        assert_eq!(scheduler.quantum(), 64);
        scheduler.run().unwrap();
        let items = probe.items();
        assert_eq!(items.len(), 100, "{mode:?}");
        assert!(items.iter().all(|&x| x == 3.0), "{mode:?}");
    }
}

#[test]
fn simd_and_scalar_chains_agree_on_odd_lengths() {
    for count in [1u64, 63, 65, 100, 4_097] {
        let (graph, simd) = ones_through_saxpy(count);
        Scheduler::new(graph, ExecutionMode::Sequential)
            .unwrap()
            .run()
            .unwrap();

        let mut graph = Graph::new();
        let source = graph.emplace_block(ConstantSource::new(1.0f32, count));
        let saxpy = graph.emplace_block(Saxpy::with_kernel(2.0, 1.0, ScalarKernel));
        let sink = VectorSink::<f32>::new();
        let scalar = sink.probe();
        let sink = graph.emplace_block(sink);
        graph.connect(source, "out", saxpy, "in").unwrap();
        graph.connect(saxpy, "out", sink, "in").unwrap();
        Scheduler::new(graph, ExecutionMode::Sequential)
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(simd.items(), scalar.items(), "count {count}");
    }
}

/// Takes whole spans, but at most `tail_bite` items of a closed tail, and
/// reports more input wanted when it takes nothing.
struct Nibbler {
    tail_bite: usize,
}

impl Block for Nibbler {
    fn name(&self) -> &str {
        "Nibbler"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new::<f32>("in").with_item_multiple(8)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkStatus, BlockError> {
        let input = io.input(0);
        let n = if input.is_tail() {
            input.len().min(self.tail_bite)
        } else {
            input.len()
        };
        if n == 0 {
            return Ok(WorkStatus::NeedsMoreInput);
        }
        input.consume(n);
        Ok(WorkStatus::Ok)
    }
}

fn into_nibbler(count: u64, tail_bite: usize) -> Result<RunSummary, SchedulerError> {
    let mut graph = Graph::new();
    let source = graph.emplace_block(ConstantSource::new(1.0f32, count));
    let nibbler = graph.emplace_block(Nibbler { tail_bite });
    graph.connect(source, "out", nibbler, "in").unwrap();
    Scheduler::new(graph, ExecutionMode::Sequential)?.run()
}

#[test]
fn partly_taken_tail_fails_the_run() {
    // quantum 8: 20 items leave a tail of 4, of which the block takes 3
    let err = into_nibbler(20, 3).unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::TailNotDrained { left: 1, .. }
    ));
}

#[test]
fn refusing_a_tail_fails_instead_of_hanging() {
    let err = into_nibbler(20, 0).unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::TailNotDrained { left: 4, .. }
    ));
}

#[test]
fn block_taking_whole_tails_succeeds() {
    into_nibbler(20, 8).unwrap();
}

#[test]
fn empty_source_finishes_cleanly() {
    let mut graph = Graph::new();
    let source = graph.emplace_block(VectorSource::<f32>::new(Vec::new()));
    let sink = VectorSink::<f32>::new();
    let probe = sink.probe();
    let sink = graph.emplace_block(sink);
    graph.connect(source, "out", sink, "in").unwrap();

    Scheduler::new(graph, ExecutionMode::Sequential)
        .unwrap()
        .run()
        .unwrap();
    assert!(probe.is_empty());
}
