//! The render window: one output view and everything needed to draw it.
//!
//! A [`RenderWindow`] owns the device, the view node factory, the view tree,
//! the pipeline cache and the pass list. Each [`render`](RenderWindow::render)
//! call drains the release queue, synchronizes the view tree with the scene,
//! runs the passes in order and composites the last pass output into the
//! window's own color target, which is what captures read back.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use fxhash::FxHashMap;

use crate::backend::create_device;
use crate::config::EngineConfig;
use crate::error::{ErrorCategory, RenderError, RenderResult};
use crate::logging::init_logging;
use crate::passes::{FullscreenQuad, ForwardPass, RenderPass};
use crate::pipeline::{AttachmentFormats, BlendMode, CacheStats, ColorTargetState, FullscreenOp, PipelineCache};
use crate::resource::{
    Device, DeviceStats, Framebuffer, PassLoad, PixelData, PixelRect, Pixels, ReleaseQueue, ResourceKind,
    TextureFormat, TextureId,
};
use crate::scene::{Entity, Scene};
use crate::shader::ReplacementContext;
use crate::view::{ClassOverrides, FrameContext, ViewId, ViewNodeFactory, ViewTree};

/// RGBA8 pixels of one rendered frame, rows from the top.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl CapturedFrame {
    pub fn to_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    /// The RGBA value at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        self.pixels.get(i..i + 4).and_then(|p| p.try_into().ok())
    }
}

#[derive(Default)]
struct CaptureSlot {
    frame: Option<RenderResult<CapturedFrame>>,
    waker: Option<Waker>,
}

/// Resolves once the next [`RenderWindow::render`] completes.
///
/// Dropping the future abandons the capture; the window skips it.
pub struct FrameCapture {
    slot: Rc<RefCell<CaptureSlot>>,
}

impl Future for FrameCapture {
    type Output = RenderResult<CapturedFrame>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        match slot.frame.take() {
            Some(frame) => Poll::Ready(frame),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

const TARGET_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

pub struct RenderWindow {
    label: String,
    device: Box<dyn Device>,
    queue: ReleaseQueue,
    factory: ViewNodeFactory,
    views: ViewTree,
    cache: PipelineCache,
    overrides: ClassOverrides,
    passes: Vec<Box<dyn RenderPass>>,
    target: Option<Framebuffer>,
    blit: FullscreenQuad,
    size: (u32, u32),
    background: [f32; 4],
    captures: Vec<Weak<RefCell<CaptureSlot>>>,
    last_trace: Vec<String>,
    released: bool,
}

impl RenderWindow {
    /// Creates the device `config` selects and a window drawing into it.
    pub fn new(config: EngineConfig) -> RenderResult<Self> {
        if let Some(logging) = config.logging.clone() {
            init_logging(logging);
        }
        let device = create_device(&config)?;
        Ok(Self::with_device(device, &config))
    }

    /// A window over an existing device. The factory matches the device's
    /// backend.
    pub fn with_device(device: Box<dyn Device>, config: &EngineConfig) -> Self {
        let queue = ReleaseQueue::new();
        let factory = ViewNodeFactory::for_backend(device.backend());
        log::debug!(
            "render window '{}' at {}x{} on the {} device",
            config.label,
            config.width,
            config.height,
            device.backend()
        );
        Self {
            label: config.label.clone(),
            cache: PipelineCache::new(&queue),
            device,
            queue,
            factory,
            views: ViewTree::new(ViewId::next()),
            overrides: ClassOverrides::new(),
            passes: vec![Box::new(ForwardPass::new())],
            target: None,
            blit: FullscreenQuad::new(
                FullscreenOp::Copy,
                ColorTargetState::new(TARGET_FORMAT, BlendMode::Replace),
            ),
            size: (config.width, config.height),
            background: config.background,
            captures: Vec::new(),
            last_trace: Vec::new(),
            released: false,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Takes effect on the next frame; every target is resized in place then.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }
        self.size = (width, height);
        Ok(())
    }

    pub fn background(&self) -> [f32; 4] {
        self.background
    }

    pub fn set_background(&mut self, background: [f32; 4]) {
        self.background = background;
    }

    /// Replaces the pass list, releasing the previous passes.
    pub fn set_passes(&mut self, passes: Vec<Box<dyn RenderPass>>) {
        for mut pass in std::mem::replace(&mut self.passes, passes) {
            pass.release(&mut *self.device);
        }
    }

    pub fn push_pass(&mut self, pass: Box<dyn RenderPass>) {
        self.passes.push(pass);
    }

    pub fn factory_mut(&mut self) -> &mut ViewNodeFactory {
        &mut self.factory
    }

    pub fn view_tree(&self) -> &ViewTree {
        &self.views
    }

    pub fn device(&self) -> &dyn Device {
        &*self.device
    }

    pub fn device_mut(&mut self) -> &mut dyn Device {
        &mut *self.device
    }

    pub fn pipeline_cache(&self) -> &PipelineCache {
        &self.cache
    }

    pub fn stats(&self) -> DeviceStats {
        self.device.stats()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Registers a shader override for every draw involving `class`. The
    /// override id becomes part of the pipeline key, so the next frame
    /// compiles a new program.
    pub fn register_shader_override<F>(&mut self, class: &str, marker: &str, id: &str, f: F) -> bool
    where
        F: Fn(&mut ReplacementContext<'_>) + 'static,
    {
        self.overrides.register(class, marker, id, f)
    }

    pub fn remove_shader_override(&mut self, class: &str, marker: &str) -> bool {
        self.overrides.remove(class, marker)
    }

    /// Names of the passes that executed during the last frame, in order.
    pub fn last_pass_order(&self) -> &[String] {
        &self.last_trace
    }

    /// The window's color target, once a frame was rendered.
    pub fn color_texture(&self) -> Option<TextureId> {
        self.target.as_ref().and_then(|fb| fb.color_texture(0))
    }

    /// Resolves with the pixels of the next rendered frame.
    pub fn capture_next_frame(&mut self) -> FrameCapture {
        let slot = Rc::new(RefCell::new(CaptureSlot::default()));
        self.captures.push(Rc::downgrade(&slot));
        FrameCapture { slot }
    }

    fn ensure_live(&self) -> RenderResult<()> {
        if self.released {
            return Err(RenderError::UseAfterRelease {
                kind: ResourceKind::Framebuffer,
                label: self.label.clone(),
            });
        }
        Ok(())
    }

    fn prepare(&mut self, scene: &Scene) {
        let drained = self.queue.drain(&mut *self.device);
        if drained > 0 {
            log::trace!("released {} dropped resources", drained);
        }
        self.views.synchronize(&self.factory, &mut *self.device, scene, &self.queue);
    }

    /// Draws one frame of `scene`.
    ///
    /// A pass failing with a configuration error is reported and skipped for
    /// the frame. Any other pass error stops the frame: whatever was drawn
    /// before it is still composited and submitted, pending captures resolve
    /// with [`RenderError::FrameAborted`] and the error is returned.
    pub fn render(&mut self, scene: &Scene) -> RenderResult<()> {
        let result = self.draw_frame(scene);
        self.resolve_captures(result.as_ref().err());
        result
    }

    fn draw_frame(&mut self, scene: &Scene) -> RenderResult<()> {
        self.ensure_live()?;
        self.prepare(scene);

        let mut ctx = FrameContext::new(
            &mut *self.device,
            scene,
            &mut self.cache,
            &self.queue,
            &self.overrides,
            self.size,
            self.background,
        );
        let mut output = None;
        let mut failure = None;
        for pass in &mut self.passes {
            match pass.traverse(&mut self.views, &mut ctx) {
                Ok(Some(texture)) => output = Some(texture),
                Ok(None) => {}
                Err(err) if err.category() == ErrorCategory::Configuration => {
                    log::warn!("skipping {} for this frame", pass.name());
                    err.report();
                }
                Err(err) => {
                    log::error!("{} failed, the rest of the frame is abandoned", pass.name());
                    failure = Some(err);
                    break;
                }
            }
        }
        self.last_trace = ctx.into_trace();

        if let Some(err) = failure {
            err.report();
            // The failed pass may not have ended its device pass.
            if self.device.end_pass().is_ok() {
                log::debug!("closed the device pass left open by the failed frame");
            }
            if let Err(partial) = self.composite(output).and_then(|()| self.device.submit()) {
                partial.report();
            }
            return Err(err);
        }

        self.composite(output)?;
        self.device.submit()
    }

    fn composite(&mut self, output: Option<TextureId>) -> RenderResult<()> {
        let (width, height) = self.size;
        let fb = match self.target.take() {
            Some(mut fb) => {
                fb.resize(&mut *self.device, width, height)?;
                fb
            }
            None => {
                let mut fb = Framebuffer::create(&mut *self.device, &self.queue, "RenderWindow", width, height)?;
                fb.create_color(&mut *self.device, 0, TARGET_FORMAT)?;
                fb
            }
        };
        let fb = self.target.insert(fb);
        fb.bind(&mut *self.device)?;
        self.device.begin_pass(&PassLoad::clear(&[self.background], 1.0))?;
        let drawn = match output {
            Some(texture) => {
                let formats = AttachmentFormats {
                    color: vec![TARGET_FORMAT],
                    depth: None,
                };
                self.blit.draw(&mut *self.device, &mut self.cache, &formats, &[texture])
            }
            None => Ok(()),
        };
        self.device.end_pass()?;
        match drawn {
            Err(err) if err.category() == ErrorCategory::Configuration => {
                err.report();
                Ok(())
            }
            other => other,
        }
    }

    /// Hands every pending capture the frame just rendered, or the error
    /// that stopped it.
    fn resolve_captures(&mut self, failure: Option<&RenderError>) {
        let pending: Vec<Rc<RefCell<CaptureSlot>>> = self.captures.drain(..).filter_map(|w| w.upgrade()).collect();
        if pending.is_empty() {
            return;
        }
        let frame = match failure {
            Some(err) => Err(RenderError::FrameAborted(err.to_string())),
            None => {
                let (width, height) = self.size;
                self.read_pixels(PixelRect::from_size(width, height)).and_then(|pixels| match pixels.data {
                    PixelData::Unorm8(data) => Ok(CapturedFrame {
                        width: pixels.width,
                        height: pixels.height,
                        pixels: data,
                    }),
                    _ => Err(RenderError::Readback("window target is not RGBA8".into())),
                })
            }
        };
        for slot in pending {
            let mut slot = slot.borrow_mut();
            slot.frame = Some(match &frame {
                Ok(frame) => Ok(frame.clone()),
                Err(RenderError::FrameAborted(msg)) => Err(RenderError::FrameAborted(msg.clone())),
                Err(err) => Err(RenderError::Readback(err.to_string())),
            });
            if let Some(waker) = slot.waker.take() {
                waker.wake();
            }
        }
    }

    /// Reads back `rect` of the last rendered frame. Blocks until the device
    /// finished the frame.
    pub fn read_pixels(&mut self, rect: PixelRect) -> RenderResult<Pixels> {
        let texture = self
            .color_texture()
            .ok_or(RenderError::MissingContext("rendered frame"))?;
        self.device.read_pixels(texture, rect)
    }

    /// Runs a single pass against `scene` outside the regular frame. The
    /// window target and the frame trace are left untouched.
    ///
    /// Returns the pass output and the prop ids it drew for selection.
    pub(crate) fn render_offscreen(
        &mut self,
        scene: &Scene,
        pass: &mut dyn RenderPass,
    ) -> RenderResult<(Option<TextureId>, FxHashMap<u32, Entity>)> {
        self.ensure_live()?;
        self.prepare(scene);
        let mut ctx = FrameContext::new(
            &mut *self.device,
            scene,
            &mut self.cache,
            &self.queue,
            &self.overrides,
            self.size,
            self.background,
        );
        let output = pass.traverse(&mut self.views, &mut ctx)?;
        let pickables = std::mem::take(&mut ctx.pickables);
        drop(ctx);
        self.device.submit()?;
        Ok((output, pickables))
    }

    /// Releases every resource the window and its passes own. Rendering
    /// afterwards fails with [`RenderError::UseAfterRelease`].
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        for pass in &mut self.passes {
            pass.release(&mut *self.device);
        }
        self.views.release(&mut *self.device);
        self.cache.release(&mut *self.device);
        if let Some(mut fb) = self.target.take() {
            fb.release(&mut *self.device);
        }
        self.queue.drain(&mut *self.device);
        self.released = true;
        log::debug!("render window '{}' released", self.label);
    }
}

impl Drop for RenderWindow {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::{Convolution2DPass, Kernel};
    use crate::shader::surface::NORMAL_STATEMENT;
    use crate::testing;
    use glam::Vec3;

    /// Draws nothing and fails the way a lost device would.
    struct FailingPass;

    impl RenderPass for FailingPass {
        fn name(&self) -> &str {
            "FailingPass"
        }

        fn traverse(&mut self, _: &mut ViewTree, ctx: &mut FrameContext<'_>) -> RenderResult<Option<TextureId>> {
            ctx.record(self.name());
            Err(RenderError::Device("device lost".into()))
        }

        fn release(&mut self, _: &mut dyn Device) {}
    }

    /// Fails with a configuration error.
    struct MisconfiguredPass;

    impl RenderPass for MisconfiguredPass {
        fn name(&self) -> &str {
            "MisconfiguredPass"
        }

        fn traverse(&mut self, _: &mut ViewTree, ctx: &mut FrameContext<'_>) -> RenderResult<Option<TextureId>> {
            ctx.record(self.name());
            Err(RenderError::MissingContext("camera"))
        }

        fn release(&mut self, _: &mut dyn Device) {}
    }

    fn frame(window: &mut RenderWindow, scene: &Scene) -> CapturedFrame {
        let capture = window.capture_next_frame();
        window.render(scene).unwrap();
        pollster::block_on(capture).unwrap()
    }

    #[test]
    fn test_background_only_frame() {
        let mut window = testing::window(8, 8);
        window.set_background([0.0, 0.0, 1.0, 1.0]);
        let scene = Scene::new();
        let frame = frame(&mut window, &scene);
        assert_eq!(frame.pixel(3, 3), Some([0, 0, 255, 255]));
        assert_eq!(window.last_pass_order(), &["ForwardPass", "OpaquePass"]);
    }

    #[test]
    fn test_opaque_actor_covers_the_view() {
        let mut window = testing::window(16, 16);
        let (scene, _, _) = testing::quad_scene(Vec3::new(1.0, 0.0, 0.0), 1.0);
        let frame = frame(&mut window, &scene);
        assert_eq!(frame.pixel(8, 8), Some([255, 0, 0, 255]));
        assert_eq!(frame.to_image().map(|img| img.dimensions()), Some((16, 16)));
    }

    #[test]
    fn test_override_replaces_only_its_marker() {
        let mut window = testing::window(8, 8);
        let (scene, _, _) = testing::quad_scene(Vec3::ONE, 1.0);
        window.render(&scene).unwrap();
        let before = window.cache_stats().entries;

        assert!(window.register_shader_override("Actor", "Normal::Impl", "halve-diffuse", |ctx| {
            ctx.fragment().substitute("Normal::Impl", &["diffuseColor *= 0.5;"], true);
        }));
        window.render(&scene).unwrap();
        assert_eq!(window.cache_stats().entries, before + 1);

        let fragments: Vec<&str> = window
            .pipeline_cache()
            .iter()
            .map(|(_, entry)| entry.program().fragment.as_str())
            .filter(|fs| fs.contains("diffuseColor *= 0.5;"))
            .collect();
        assert_eq!(fragments.len(), 1);
        assert!(!fragments[0].contains(NORMAL_STATEMENT));
        assert!(fragments[0].contains("var diffuseColor = mapperUBO.DiffuseColor;"));

        // Removing the override goes back to the original pipeline.
        assert!(window.remove_shader_override("Actor", "Normal::Impl"));
        let hits = window.cache_stats().hits;
        window.render(&scene).unwrap();
        assert_eq!(window.cache_stats().entries, before + 1);
        assert!(window.cache_stats().hits > hits);
    }

    #[test]
    fn test_convolutions_wrap_the_forward_pass() {
        let mut window = testing::window(16, 16);
        let scene = testing::half_quad_scene();
        let base = frame(&mut window, &scene);

        let stacked = Convolution2DPass::new(Kernel::box_blur(3))
            .with_label("Blur3")
            .with_delegate(
                Convolution2DPass::new(Kernel::box_blur(3))
                    .with_label("Blur2")
                    .with_delegate(
                        Convolution2DPass::new(Kernel::box_blur(3))
                            .with_label("Blur1")
                            .with_delegate(ForwardPass::new()),
                    ),
            );
        window.set_passes(vec![Box::new(stacked)]);
        let blurred = frame(&mut window, &scene);

        assert_eq!(
            window.last_pass_order(),
            &["ForwardPass", "OpaquePass", "Blur1", "Blur2", "Blur3"]
        );
        assert_eq!((blurred.width, blurred.height), (base.width, base.height));
        assert_ne!(blurred.pixels, base.pixels);
    }

    #[test]
    fn test_empty_convolution_passes_nothing_through() {
        let mut window = testing::window(8, 8);
        window.set_background([1.0, 1.0, 1.0, 1.0]);
        let (scene, _, _) = testing::quad_scene(Vec3::new(1.0, 0.0, 0.0), 1.0);
        window.set_passes(vec![Box::new(Convolution2DPass::new(Kernel::box_blur(3)))]);
        let frame = frame(&mut window, &scene);
        assert!(window.last_pass_order().is_empty());
        // Only the window clear reached the target.
        assert_eq!(frame.pixel(4, 4), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_translucent_resize_reallocates_owned_targets_only() {
        let mut window = testing::window(32, 32);
        let (scene, _, _) = testing::quad_scene(Vec3::ONE, 0.5);
        window.render(&scene).unwrap();
        assert_eq!(
            window.last_pass_order(),
            &["ForwardPass", "OpaquePass", "OrderIndependentTranslucentPass"]
        );
        let before = window.stats();

        window.render(&scene).unwrap();
        assert_eq!(window.stats().texture_allocations, before.texture_allocations);

        window.resize(48, 40).unwrap();
        window.render(&scene).unwrap();
        let after = window.stats();
        assert_eq!(after.textures, before.textures);
        // Opaque color and depth, accumulation and revealage, window target.
        assert_eq!(after.texture_allocations, before.texture_allocations + 5);
    }

    #[test]
    fn test_dropped_capture_is_skipped() {
        let mut window = testing::window(4, 4);
        let scene = Scene::new();
        drop(window.capture_next_frame());
        let kept = window.capture_next_frame();
        window.render(&scene).unwrap();
        assert!(pollster::block_on(kept).is_ok());
    }

    #[test]
    fn test_failed_pass_resolves_pending_capture() {
        let mut window = testing::window(8, 8);
        let (scene, _, _) = testing::quad_scene(Vec3::new(1.0, 0.0, 0.0), 1.0);
        window.set_passes(vec![Box::new(ForwardPass::new()), Box::new(FailingPass), Box::new(ForwardPass::new())]);
        let submits = window.stats().submits;

        let capture = window.capture_next_frame();
        let err = window.render(&scene).unwrap_err();
        assert!(matches!(err, RenderError::Device(_)));
        match pollster::block_on(capture) {
            Err(RenderError::FrameAborted(msg)) => assert!(msg.contains("device lost")),
            other => panic!("capture resolved with {:?}", other),
        }
        // The second forward pass never ran; the partial frame was submitted.
        assert_eq!(window.last_pass_order(), &["ForwardPass", "OpaquePass", "FailingPass"]);
        assert_eq!(window.stats().submits, submits + 1);
        let pixels = window.read_pixels(PixelRect::new(4, 4, 1, 1)).unwrap();
        assert_eq!(pixels.data, PixelData::Unorm8(vec![255, 0, 0, 255]));

        window.set_passes(vec![Box::new(ForwardPass::new())]);
        let frame = frame(&mut window, &scene);
        assert_eq!(frame.pixel(4, 4), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_misconfigured_pass_is_skipped_for_the_frame() {
        let mut window = testing::window(8, 8);
        let (scene, _, _) = testing::quad_scene(Vec3::new(0.0, 1.0, 0.0), 1.0);
        window.set_passes(vec![Box::new(MisconfiguredPass), Box::new(ForwardPass::new())]);
        let frame = frame(&mut window, &scene);
        assert_eq!(window.last_pass_order(), &["MisconfiguredPass", "ForwardPass", "OpaquePass"]);
        assert_eq!(frame.pixel(4, 4), Some([0, 255, 0, 255]));
    }

    #[test]
    fn test_capture_on_a_released_window_resolves_with_the_error() {
        let mut window = testing::window(4, 4);
        let scene = Scene::new();
        window.release();
        let capture = window.capture_next_frame();
        assert!(window.render(&scene).is_err());
        assert!(matches!(pollster::block_on(capture), Err(RenderError::FrameAborted(_))));
    }

    #[test]
    fn test_release_frees_everything() {
        let mut window = testing::window(8, 8);
        let (scene, _, _) = testing::quad_scene(Vec3::ONE, 0.5);
        window.render(&scene).unwrap();
        assert!(window.stats().textures > 0);
        window.release();
        let stats = window.stats();
        assert_eq!(
            (stats.buffers, stats.textures, stats.framebuffers, stats.pipelines),
            (0, 0, 0, 0)
        );
        assert!(matches!(
            window.render(&scene),
            Err(RenderError::UseAfterRelease { .. })
        ));
    }

    #[test]
    fn test_explicit_device_matches_the_immediate_frame() {
        let Some(mut explicit) = testing::explicit_window(16, 16) else {
            return;
        };
        let mut immediate = testing::window(16, 16);
        let scene = testing::half_quad_scene();
        let gpu = frame(&mut explicit, &scene);
        let cpu = frame(&mut immediate, &scene);
        for (x, y) in [(2, 8), (13, 8)] {
            assert_eq!(gpu.pixel(x, y), cpu.pixel(x, y), "pixel ({}, {})", x, y);
        }
        assert_eq!(gpu.pixel(2, 8), Some([255, 0, 0, 255]));
    }
}
