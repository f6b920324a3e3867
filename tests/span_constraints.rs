use flowbench::blocks::{ConstantSource, CountingSink};
use flowbench::{
    Block, BlockError, BlockId, ExecutionMode, Graph, Partition, PortSpec, Scheduler,
    SchedulerConfig, WorkIo, WorkStatus,
};
use proptest::prelude::*;

/// Pass-through that errors if ever offered a span its ports do not accept,
/// except for the closed tail of its input.
struct Strict {
    min_items: usize,
    item_multiple: usize,
}

impl Strict {
    fn port(&self, name: &'static str) -> PortSpec {
        PortSpec::new::<f32>(name)
            .with_min_items(self.min_items)
            .with_item_multiple(self.item_multiple)
    }
}

impl Block for Strict {
    fn name(&self) -> &str {
        "Strict"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![self.port("in")]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![self.port("out")]
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkStatus, BlockError> {
        let spec = self.port("in");
        let tail = io.input(0).is_tail();
        for (len, exempt) in [(io.input(0).len(), tail), (io.output(0).len(), false)] {
            if len != 0 && !exempt && !spec.accepts(len) {
                return Err(BlockError::Contract(format!("offered {len}")));
            }
        }
        let input = io.input(0).items::<f32>()?;
        let output = io.output(0).items_mut::<f32>()?;
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        io.input(0).consume(n);
        io.output(0).produce(n);
        Ok(WorkStatus::Ok)
    }
}

fn mode(choice: usize) -> ExecutionMode {
    match choice {
        0 => ExecutionMode::Sequential,
        1 => ExecutionMode::Pool { workers: 2 },
        _ => ExecutionMode::JobList(Partition::new(vec![
            vec![BlockId(0), BlockId(1)],
            vec![BlockId(2), BlockId(3)],
        ])),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn constrained_ports_see_conforming_spans_and_every_item(
        min_items in 1usize..=96,
        item_multiple in 1usize..=40,
        capacity in 1usize..4000,
        items in 0u64..20_000,
        choice in 0usize..3,
    ) {
        let mut graph = Graph::new();
        let source = graph.emplace_block(ConstantSource::new(1.0f32, items));
        let first = graph.emplace_block(Strict { min_items, item_multiple });
        let second = graph.emplace_block(Strict { min_items, item_multiple });
        let sink = CountingSink::<f32>::new();
        let count = sink.probe();
        let sink = graph.emplace_block(sink);
        graph.connect(source, "out", first, "in").unwrap();
        graph.connect(first, "out", second, "in").unwrap();
        graph.connect(second, "out", sink, "in").unwrap();

        let scheduler = Scheduler::with_config(
            graph,
            mode(choice),
            SchedulerConfig::with_buffer_capacity(capacity),
        )
        .unwrap();
        let quantum = scheduler.quantum() as u64;
        prop_assert!(quantum >= min_items as u64);
        prop_assert_eq!(quantum % item_multiple as u64, 0);

        scheduler.run().unwrap();
        prop_assert_eq!(count.get(), items);
    }
}
