use std::hash::{Hash, Hasher};

use super::RenderPass;
use super::fullscreen::FullscreenQuad;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{AttachmentFormats, BlendMode, ColorTargetState, FullscreenOp};
use crate::resource::{Device, Framebuffer, PassLoad, TextureFormat, TextureId};
use crate::view::{FrameContext, ViewTree};

/// A square convolution kernel with an odd side, weights in row-major order
/// from the top-left tap.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    size: u32,
    weights: Vec<f32>,
}

impl Hash for Kernel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.size.hash(state);
        for weight in &self.weights {
            weight.to_bits().hash(state);
        }
    }
}

impl Kernel {
    /// Weights are normalized to sum to one unless they sum to zero, as edge
    /// detectors do.
    pub fn new(size: u32, weights: Vec<f32>) -> RenderResult<Self> {
        if size % 2 == 0 || weights.len() != (size * size) as usize {
            return Err(RenderError::InvalidKernel {
                size,
                weights: weights.len(),
            });
        }
        if let Some(index) = weights.iter().position(|w| !w.is_finite()) {
            return Err(RenderError::NonFiniteKernelWeight { index });
        }
        // Summed wide so large finite weights cannot overflow to infinity.
        let sum: f64 = weights.iter().map(|w| *w as f64).sum();
        let weights = if sum.abs() > f32::EPSILON as f64 {
            weights.into_iter().map(|w| (w as f64 / sum) as f32).collect()
        } else {
            weights
        };
        Ok(Self { size, weights })
    }

    /// Equal weights. An even `size` is rounded up to the next odd one.
    pub fn box_blur(size: u32) -> Self {
        let size = size.max(1) | 1;
        let count = (size * size) as usize;
        Self {
            size,
            weights: vec![1.0 / count as f32; count],
        }
    }

    pub fn gaussian(size: u32, sigma: f32) -> Self {
        let size = size.max(1) | 1;
        let half = (size / 2) as i32;
        let sigma = sigma.max(f32::EPSILON);
        let mut weights = Vec::with_capacity((size * size) as usize);
        for y in -half..=half {
            for x in -half..=half {
                let r2 = (x * x + y * y) as f32;
                weights.push((-r2 / (2.0 * sigma * sigma)).exp());
            }
        }
        let sum: f32 = weights.iter().sum();
        Self {
            size,
            weights: weights.into_iter().map(|w| w / sum).collect(),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// `(dx, dy, weight)` per tap, offsets relative to the center texel.
    pub fn taps(&self) -> impl Iterator<Item = (i32, i32, f32)> + '_ {
        let size = self.size as usize;
        let half = (self.size / 2) as i32;
        self.weights.iter().enumerate().map(move |(i, w)| {
            let dx = (i % size) as i32 - half;
            let dy = (i / size) as i32 - half;
            (dx, dy, *w)
        })
    }
}

const PASS_NAME: &str = "Convolution2DPass";

/// Renders its first delegate, then filters the delegate's output with a
/// kernel into its own `Rgba8Unorm` target.
///
/// Without a delegate the pass reports the configuration once and produces
/// nothing.
pub struct Convolution2DPass {
    label: String,
    kernel: Kernel,
    delegates: Vec<Box<dyn RenderPass>>,
    target: Option<Framebuffer>,
    quad: FullscreenQuad,
    reported: bool,
}

fn convolve(kernel: &Kernel) -> FullscreenQuad {
    FullscreenQuad::new(
        FullscreenOp::Convolve(kernel.clone()),
        ColorTargetState::new(TextureFormat::Rgba8Unorm, BlendMode::Replace),
    )
}

impl Convolution2DPass {
    pub fn new(kernel: Kernel) -> Self {
        Self {
            label: PASS_NAME.to_string(),
            quad: convolve(&kernel),
            kernel,
            delegates: Vec::new(),
            target: None,
            reported: false,
        }
    }

    /// Name recorded in the frame trace, for telling stacked passes apart.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_delegate(mut self, pass: impl RenderPass + 'static) -> Self {
        self.delegates.push(Box::new(pass));
        self
    }

    pub fn add_delegate(&mut self, pass: Box<dyn RenderPass>) {
        self.delegates.push(pass);
    }

    pub fn delegate_count(&self) -> usize {
        self.delegates.len()
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn set_kernel(&mut self, kernel: Kernel) {
        self.quad = convolve(&kernel);
        self.kernel = kernel;
    }

    fn prepare(&mut self, ctx: &mut FrameContext<'_>) -> RenderResult<&mut Framebuffer> {
        let (width, height) = ctx.size;
        let fb = match self.target.take() {
            Some(mut fb) => {
                fb.resize(&mut *ctx.device, width, height)?;
                fb
            }
            None => {
                let mut fb = Framebuffer::create(&mut *ctx.device, ctx.queue, &self.label, width, height)?;
                fb.create_color(&mut *ctx.device, 0, TextureFormat::Rgba8Unorm)?;
                fb
            }
        };
        Ok(self.target.insert(fb))
    }
}

impl RenderPass for Convolution2DPass {
    fn name(&self) -> &str {
        &self.label
    }

    fn traverse(&mut self, views: &mut ViewTree, ctx: &mut FrameContext<'_>) -> RenderResult<Option<TextureId>> {
        let Some(delegate) = self.delegates.first_mut() else {
            if !self.reported {
                RenderError::EmptyPass(PASS_NAME).report();
                self.reported = true;
            }
            return Ok(None);
        };
        let Some(input) = delegate.traverse(views, ctx)? else {
            return Ok(None);
        };
        ctx.record(&self.label);

        let fb = self.prepare(ctx)?;
        fb.bind(&mut *ctx.device)?;
        let output = fb.color_texture(0);
        ctx.device.begin_pass(&PassLoad::clear(&[[0.0; 4]], 1.0))?;
        let formats = AttachmentFormats {
            color: vec![TextureFormat::Rgba8Unorm],
            depth: None,
        };
        let drawn = self.quad.draw(&mut *ctx.device, ctx.cache, &formats, &[input]);
        ctx.device.end_pass()?;
        drawn?;
        Ok(output)
    }

    fn release(&mut self, device: &mut dyn Device) {
        for delegate in &mut self.delegates {
            delegate.release(device);
        }
        if let Some(mut fb) = self.target.take() {
            fb.release(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_must_be_square_and_odd() {
        assert!(matches!(
            Kernel::new(2, vec![0.25; 4]),
            Err(RenderError::InvalidKernel { size: 2, weights: 4 })
        ));
        assert!(matches!(
            Kernel::new(3, vec![1.0; 8]),
            Err(RenderError::InvalidKernel { size: 3, weights: 8 })
        ));
        let kernel = Kernel::new(3, vec![1.0; 9]).unwrap();
        assert!((kernel.weights().iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_kernel_rejects_non_finite_weights() {
        let mut weights = vec![1.0; 9];
        weights[5] = f32::NAN;
        assert!(matches!(
            Kernel::new(3, weights),
            Err(RenderError::NonFiniteKernelWeight { index: 5 })
        ));
        let mut weights = vec![1.0; 9];
        weights[0] = f32::NEG_INFINITY;
        assert!(matches!(
            Kernel::new(3, weights),
            Err(RenderError::NonFiniteKernelWeight { index: 0 })
        ));
    }

    #[test]
    fn test_huge_weights_still_normalize() {
        let kernel = Kernel::new(3, vec![f32::MAX; 9]).unwrap();
        assert!(kernel.weights().iter().all(|w| w.is_finite()));
        assert!((kernel.weights().iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_zero_sum_kernel_is_not_normalized() {
        let laplacian = Kernel::new(3, vec![0.0, 1.0, 0.0, 1.0, -4.0, 1.0, 0.0, 1.0, 0.0]).unwrap();
        assert_eq!(laplacian.weights()[4], -4.0);
    }

    #[test]
    fn test_taps_are_centered() {
        let kernel = Kernel::box_blur(3);
        let taps: Vec<(i32, i32)> = kernel.taps().map(|(dx, dy, _)| (dx, dy)).collect();
        assert_eq!(taps.first(), Some(&(-1, -1)));
        assert_eq!(taps[4], (0, 0));
        assert_eq!(taps.last(), Some(&(1, 1)));
        assert_eq!(Kernel::box_blur(4).size(), 5);
    }

    #[test]
    fn test_gaussian_peaks_at_center() {
        let kernel = Kernel::gaussian(5, 1.0);
        let center = kernel.weights()[12];
        assert!(kernel.weights().iter().all(|w| *w <= center));
        assert!((kernel.weights().iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }
}
