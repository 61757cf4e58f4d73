//! Render loop orchestration
//!
//! [`Renderer`] owns the Vulkan context, the scene geometry and the frame
//! slots, and drives one tick at a time: wait for the in-flight slot, acquire
//! an image, write that slot's uniforms, record, submit and present.

use std::f32::consts::TAU;

use ash::{vk, Device};

use super::frame::{FramePacer, FrameResourceManager, FrameState};
use super::scene::{MeshGeometry, RenderItem, SceneDescription, Vertex};
use super::uniform::{FrameUniform, UniformStream};
use super::vulkan::{
    AcquireOutcome, CommandRecorder, GraphicsPipeline, PipelineDesc, ShaderModule, Swapchain, UploadContext,
    VkResultExt, VulkanContext, VulkanError, VulkanResult,
};
use super::window::RenderSurface;
use crate::config::{PresentModePreference, RendererConfig};
use crate::foundation::math::{look_at, vulkan_perspective, Mat4, Vec3};
use crate::foundation::time::{FpsCounter, Timer};

const FIELD_OF_VIEW_DEGREES: f32 = 45.0;
const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 100.0;

/// Compiled SPIR-V for the scene pipeline
#[derive(Debug, Clone, Copy)]
pub struct ShaderSource<'a> {
    /// Vertex stage bytecode
    pub vertex: &'a [u8],
    /// Fragment stage bytecode
    pub fragment: &'a [u8],
}

/// What happened to one call of [`Renderer::draw`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was queued for display
    Displayed,
    /// Nothing was drawn this tick; the frame slots are rebuilt before the next one
    Skipped,
    /// The drawable has zero size
    Paused,
}

/// Advance `angle` by `delta`, keeping the result in `[0, 2π)`
pub fn wrap_angle(angle: f32, delta: f32) -> f32 {
    (angle + delta).rem_euclid(TAU)
}

/// Window title showing the frame rate
pub fn fps_title(application_name: &str, fps: u32) -> String {
    format!("{application_name} | FPS: {fps}")
}

fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    if extent.height == 0 {
        1.0
    } else {
        extent.width as f32 / extent.height as f32
    }
}

fn is_zero_sized(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// Drives the frame lifecycle for one window
pub struct Renderer {
    // Field order is drop order; the context goes last
    items: Vec<RenderItem>,
    pipeline: GraphicsPipeline,
    geometry: MeshGeometry,
    frames: FrameResourceManager,
    uniforms: UniformStream,
    device: Device,
    context: VulkanContext,

    pacer: FramePacer,
    state: FrameState,
    slots_generation: u64,

    config: RendererConfig,
    present_mode: PresentModePreference,
    view: Mat4,
    frame_uniform: FrameUniform,

    timer: Timer,
    fps: FpsCounter,
    rotation: f32,

    extent: vk::Extent2D,
    paused: bool,
    needs_recreate: bool,
}

impl Renderer {
    /// Build the device, upload the scene and create the first set of frame slots.
    ///
    /// Every failure here is fatal; nothing partially built is kept.
    pub fn new(
        window: &dyn RenderSurface,
        config: RendererConfig,
        scene: &SceneDescription,
        shaders: ShaderSource<'_>,
    ) -> VulkanResult<Self> {
        log::debug!("Creating renderer for '{}'", config.application_name);

        let context = VulkanContext::new(window, &config)?;
        let device = context.raw_device();
        let upload = UploadContext::new(&context)?;

        let geometry = MeshGeometry::upload(&upload, &scene.mesh)?;
        let items = scene
            .items
            .iter()
            .map(|desc| {
                geometry
                    .submesh(&desc.submesh)
                    .map(|range| RenderItem::new(range, desc.translation))
                    .ok_or_else(|| VulkanError::InvalidOperation {
                        reason: format!("render item refers to unknown submesh '{}'", desc.submesh),
                    })
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        // Resized to the real slot count on the first rebuild
        let uniforms = UniformStream::new(
            upload.allocator(),
            context.physical_device().min_uniform_buffer_offset_alignment(),
            1,
            items.len(),
        )?;
        let frames = FrameResourceManager::new(&context, items.len())?;

        let vertex_shader = ShaderModule::from_bytes(device.clone(), shaders.vertex)?;
        let fragment_shader = ShaderModule::from_bytes(device.clone(), shaders.fragment)?;
        let set_layouts = frames.set_layouts();
        let pipeline = GraphicsPipeline::new(
            device.clone(),
            frames.render_pass(),
            &PipelineDesc {
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                vertex_input: Vertex::input_state(),
                topology: vk::PrimitiveTopology::TRIANGLE_LIST,
                raster: Default::default(),
                depth: Default::default(),
                blend: Default::default(),
                set_layouts: &set_layouts,
            },
        )?;

        let (width, height) = window.drawable_size();
        let present_mode = config.present_mode;

        let mut renderer = Self {
            items,
            pipeline,
            geometry,
            frames,
            uniforms,
            device,
            context,
            pacer: FramePacer::new(1),
            state: FrameState::Idle,
            slots_generation: 0,
            config,
            present_mode,
            view: look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::zeros(), Vec3::y()),
            frame_uniform: FrameUniform::default(),
            timer: Timer::new(),
            fps: FpsCounter::default(),
            rotation: 0.0,
            extent: vk::Extent2D { width, height },
            paused: false,
            needs_recreate: false,
        };

        if is_zero_sized(renderer.extent) {
            log::info!("Drawable is empty at startup; rendering paused");
            renderer.paused = true;
        } else {
            renderer.recreate()?;
        }
        renderer.refresh_camera();

        log::info!(
            "Renderer ready: {} render items on {}",
            renderer.items.len(),
            renderer.context.physical_device().name()
        );
        Ok(renderer)
    }

    /// Advance animation state and rederive this tick's uniform payloads
    pub fn update(&mut self, window: &mut dyn RenderSurface) {
        if self.paused {
            return;
        }

        let dt = self.timer.update();
        if let Some(fps) = self.fps.tick(f64::from(dt)) {
            window.set_title(&fps_title(&self.config.application_name, fps));
        }

        self.rotation = wrap_angle(self.rotation, self.config.spin_rate * dt);
        for item in &mut self.items {
            item.spin(self.rotation, &self.frame_uniform);
        }
    }

    /// Run one tick of the frame state machine.
    ///
    /// Recoverable failures are logged and turn into [`FrameStatus::Skipped`]
    /// with a rebuild scheduled; only fatal errors are returned.
    pub fn draw(&mut self) -> VulkanResult<FrameStatus> {
        if self.paused {
            return Ok(FrameStatus::Paused);
        }

        if self.needs_recreate {
            if let Err(err) = self.recreate() {
                return self.recover(err).map(|()| FrameStatus::Skipped);
            }
            if self.paused {
                return Ok(FrameStatus::Paused);
            }
        }

        match self.run_frame() {
            Ok(status) => Ok(status),
            Err(err) => {
                self.state.transition(FrameState::Idle);
                self.recover(err).map(|()| FrameStatus::Skipped)
            }
        }
    }

    /// React to a new drawable size.
    ///
    /// A zero size pauses rendering. Any other size rebuilds the frame slots
    /// before returning, so no later tick sees a slot of the old generation.
    pub fn notify_resize(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        self.extent = vk::Extent2D { width, height };

        if is_zero_sized(self.extent) {
            if !self.paused {
                log::info!("Drawable minimised; rendering paused");
            }
            self.paused = true;
            return Ok(());
        }

        if self.paused {
            log::info!("Rendering resumed at {}x{}", width, height);
            self.paused = false;
            self.timer.resume();
        }

        self.recreate().or_else(|err| self.recover(err))
    }

    /// Flip between low-latency and vsync presentation; takes effect on the next tick
    pub fn toggle_vsync(&mut self) -> PresentModePreference {
        self.present_mode = self.present_mode.toggled();
        self.needs_recreate = true;
        log::info!("Present mode preference now {:?}", self.present_mode);
        self.present_mode
    }

    /// Replace the camera's view transform
    pub fn set_view(&mut self, view: Mat4) {
        self.view = view;
        self.refresh_camera();
    }

    /// Block until the GPU has finished all submitted work
    pub fn wait_for_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    /// Whether a zero-sized drawable has paused rendering
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Current present-mode preference
    pub fn present_mode(&self) -> PresentModePreference {
        self.present_mode
    }

    /// Where the state machine is
    pub fn frame_state(&self) -> FrameState {
        self.state
    }

    /// Frame slots currently in use
    pub fn slot_count(&self) -> usize {
        self.frames.slot_count()
    }

    /// Render items in draw order
    pub fn items(&self) -> &[RenderItem] {
        &self.items
    }

    fn recover(&mut self, err: VulkanError) -> VulkanResult<()> {
        if err.is_fatal() {
            log::error!("Fatal renderer error: {err}");
            return Err(err);
        }
        log::warn!("Skipping frame: {err}");
        self.needs_recreate = true;
        Ok(())
    }

    fn recreate(&mut self) -> VulkanResult<()> {
        let drawable = if is_zero_sized(self.extent) {
            None
        } else {
            Swapchain::query_drawable_extent(&self.context, self.extent)?
        };
        if drawable.is_none() {
            if !self.paused {
                log::info!("Surface has no area; rendering paused");
            }
            self.paused = true;
            return Ok(());
        }

        let slot_count = self.frames.create_or_recreate(
            &self.context,
            self.extent,
            self.present_mode,
            self.config.extra_swapchain_images,
            &mut self.uniforms,
        )?;
        self.pacer.reset(slot_count);
        self.slots_generation = self.frames.generation();
        self.needs_recreate = false;

        if let Some(extent) = self.frames.extent() {
            self.extent = extent;
        }
        self.refresh_camera();
        Ok(())
    }

    fn refresh_camera(&mut self) {
        let projection = vulkan_perspective(
            FIELD_OF_VIEW_DEGREES.to_radians(),
            aspect_ratio(self.extent),
            NEAR_PLANE,
            FAR_PLANE,
        );
        self.frame_uniform = FrameUniform::new(&self.view, &projection);
        for item in &mut self.items {
            item.refresh(&self.frame_uniform);
        }
    }

    fn run_frame(&mut self) -> VulkanResult<FrameStatus> {
        assert_eq!(
            self.slots_generation,
            self.frames.generation(),
            "frame slots rebuilt without resetting the pacer"
        );

        let ticket = self.pacer.begin_frame();
        self.state.transition(FrameState::Acquiring);

        let frames = &self.frames;
        let slot = frames.slot(ticket.slot);
        let swapchain = frames.swapchain().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "no swapchain to draw into".to_string(),
        })?;

        if ticket.wait_required {
            slot.fence().wait(u64::MAX)?;
        }

        let image_index = match swapchain.acquire_next_image(self.config.acquire_timeout_ns(), slot.image_acquired())? {
            AcquireOutcome::Image { index, suboptimal } => {
                if suboptimal {
                    self.needs_recreate = true;
                }
                index
            }
            AcquireOutcome::OutOfDate => {
                log::debug!("Swapchain out of date at acquire");
                self.needs_recreate = true;
                self.state.transition(FrameState::Idle);
                return Ok(FrameStatus::Skipped);
            }
            AcquireOutcome::NotReady => {
                log::debug!("No presentable image within the acquire timeout");
                self.state.transition(FrameState::Idle);
                return Ok(FrameStatus::Skipped);
            }
        };
        let image_slot = frames.slot(image_index as usize);

        // Reset only once an image is in hand, so a failed acquire leaves the fence signalled
        slot.fence().reset()?;
        self.pacer.mark_fence_reset(&ticket);

        self.state.transition(FrameState::Recording);
        for (object, item) in self.items.iter().enumerate() {
            self.uniforms
                .update_object_if_stale(ticket.slot, object, item.version(), item.uniform())?;
        }
        self.uniforms.update_frame_uniform(ticket.slot, &self.frame_uniform)?;

        slot.command_pool().reset()?;
        let mut recorder = CommandRecorder::new(slot.command_buffer(), self.device.clone());
        recorder.begin()?;
        {
            let extent = swapchain.extent();
            let area = vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            };
            let clear_values = [
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: self.config.clear_color,
                    },
                },
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
                },
            ];

            let mut pass = recorder.begin_render_pass(frames.render_pass(), image_slot.framebuffer(), area, &clear_values)?;
            pass.set_viewport(&vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            });
            pass.set_scissor(&area);
            pass.bind_pipeline(self.pipeline.handle());
            pass.bind_vertex_buffers(0, &[self.geometry.vertex_buffer()], &[0]);
            pass.bind_index_buffer(self.geometry.index_buffer(), 0, vk::IndexType::UINT32);

            for (object, item) in self.items.iter().enumerate() {
                pass.bind_descriptor_sets(
                    self.pipeline.layout(),
                    &[slot.frame_descriptor(), slot.object_descriptors()[object]],
                );
                let range = item.submesh();
                pass.draw_indexed(range.index_count, 1, range.first_index, range.vertex_offset, 0);
            }
        }
        let command_buffer = recorder.end()?;

        let wait_semaphores = [slot.image_acquired()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [image_slot.render_complete()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.context.graphics_queue(), &[submit_info.build()], slot.fence().handle())
                .check("vkQueueSubmit")?;
        }
        self.pacer.mark_submitted(&ticket);
        self.state.transition(FrameState::Submitted);

        self.state.transition(FrameState::Presenting);
        let outcome = swapchain.present(self.context.present_queue(), image_index, image_slot.render_complete())?;
        self.pacer.advance();
        self.state.transition(FrameState::Idle);

        if outcome.needs_recreate() {
            log::debug!("Present reported {:?}; rebuilding next tick", outcome);
            self.needs_recreate = true;
        }

        Ok(if outcome.displayed() {
            FrameStatus::Displayed
        } else {
            FrameStatus::Skipped
        })
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(err) = self.context.wait_idle() {
            log::warn!("Device did not go idle before teardown: {err}");
        }
        self.frames.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_wraps_at_full_turn() {
        assert!((wrap_angle(6.0, 0.5) - (6.5 - TAU)).abs() < 1e-6);
        assert_eq!(wrap_angle(1.0, 0.5), 1.5);
        assert!(wrap_angle(0.0, -0.25) > 0.0);
    }

    #[test]
    fn title_carries_app_name_and_rate() {
        assert_eq!(fps_title("Spin", 144), "Spin | FPS: 144");
    }

    #[test]
    fn zero_height_keeps_a_finite_aspect() {
        assert_eq!(aspect_ratio(vk::Extent2D { width: 800, height: 0 }), 1.0);
        assert_eq!(aspect_ratio(vk::Extent2D { width: 800, height: 400 }), 2.0);
        assert!(is_zero_sized(vk::Extent2D { width: 0, height: 600 }));
        assert!(!is_zero_sized(vk::Extent2D { width: 1, height: 1 }));
    }
}
