use crate::block::{Block, WorkIo, WorkStatus};
use crate::error::BlockError;
use crate::invariant_ppt::{assert_invariant, KERNEL_WIDTH_DECLARED};
use crate::kernels::{AffineKernel, DefaultKernel, ScalarKernel};
use crate::port::PortSpec;

/// `y = a * x + b` on every sample, through kernel `K`.
///
/// The ports declare `K`'s length constraints, so the scheduler only offers
/// spans the kernel can take. A closed stream's short tail goes through
/// [`ScalarKernel`] instead.
#[derive(Debug, Clone, Copy)]
pub struct Saxpy<K = DefaultKernel> {
    a: f32,
    b: f32,
    kernel: K,
}

impl Saxpy {
    /// Transform using the fastest kernel for this target.
    pub fn new(a: f32, b: f32) -> Self {
        Self::with_kernel(a, b, DefaultKernel::default())
    }
}

impl<K: AffineKernel> Saxpy<K> {
    /// Transform using an explicit kernel.
    pub fn with_kernel(a: f32, b: f32, kernel: K) -> Self {
        assert_invariant(
            KERNEL_WIDTH_DECLARED,
            K::MIN_ITEMS % K::ITEM_MULTIPLE == 0,
            "Kernel minimum is a whole number of groups",
            Some(K::NAME),
        );
        Self { a, b, kernel }
    }

    /// Slope.
    pub fn a(&self) -> f32 {
        self.a
    }

    /// Offset.
    pub fn b(&self) -> f32 {
        self.b
    }

    fn port(name: &'static str) -> PortSpec {
        PortSpec::new::<f32>(name)
            .with_min_items(K::MIN_ITEMS)
            .with_item_multiple(K::ITEM_MULTIPLE)
    }
}

impl<K: AffineKernel> Block for Saxpy<K> {
    fn name(&self) -> &str {
        "Saxpy"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![Self::port("in")]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![Self::port("out")]
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkStatus, BlockError> {
        let tail = io.input(0).is_tail();
        let input = io.input(0).items::<f32>()?;
        let output = io.output(0).items_mut::<f32>()?;
        let n = input.len().min(output.len());
        if n == 0 {
            return Ok(if input.is_empty() {
                WorkStatus::NeedsMoreInput
            } else {
                WorkStatus::NeedsMoreOutputSpace
            });
        }
        if K::accepts(n) {
            self.kernel.apply(self.a, self.b, &input[..n], &mut output[..n]);
        } else if tail {
            ScalarKernel.apply(self.a, self.b, &input[..n], &mut output[..n]);
        } else {
            return Err(BlockError::Contract(format!(
                "{} kernel offered {n} samples (min {}, multiple of {})",
                K::NAME,
                K::MIN_ITEMS,
                K::ITEM_MULTIPLE
            )));
        }
        io.input(0).consume(n);
        io.output(0).produce(n);
        Ok(WorkStatus::Ok)
    }
}
