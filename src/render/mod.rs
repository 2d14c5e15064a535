// -- std includes
use std::sync::Arc;

// -- crate includes
use glm::{Mat4, Vec3, Vec4};

use crate::config::SRenderConfig;
use crate::errors::{EGPUError, SResult};
use crate::nicegpu::{SCommandListRing, SDescriptorAllocatorSet, SFence};
use crate::typeygpu::*;

mod frameresource;
mod renderitem;
pub mod shaderbindings;

pub use self::frameresource::*;
pub use self::renderitem::*;
use self::shaderbindings::*;

// -- per-frame constants that don't belong to any single item
#[derive(Clone, Debug)]
pub struct SSceneConstants {
    pub eye: Vec3,
    pub target: Vec3,
    pub fovy: f32,
    pub znear: f32,
    pub zfar: f32,

    pub view: Mat4,
    pub proj: Mat4,

    pub lights: SLightBuffer,
    pub ambient_light: [f32; 4],
    // -- plane the planar shadows are flattened onto, as (a, b, c, d)
    pub shadow_plane: Vec4,
}

impl SSceneConstants {
    pub fn new(aspect: f32) -> Self {
        let mut result = Self {
            eye: glm::vec3(0.0, 0.4, -2.0),
            target: glm::vec3(0.0, 0.0, 0.0),
            fovy: 37.5f32.to_radians(),
            znear: 1.0,
            zfar: 1000.0,
            view: Mat4::identity(),
            proj: Mat4::identity(),
            lights: SLightBuffer {
                dir_light: SLight {
                    color: [1.0, 1.0, 1.0],
                    direction: [0.0, -1.0, 1.0],
                    ..Default::default()
                },
                point_light: SLight {
                    color: [1.0, 1.0, 1.0],
                    position: [0.0, 3.0, -1.5],
                    range: 3.0,
                    ..Default::default()
                },
                spot_light: SLight::default(),
            },
            ambient_light: [0.0, 0.0, 0.0, 0.0],
            shadow_plane: glm::vec4(0.0, 1.0, 0.0, 0.0),
        };
        result.update_view();
        result.update_projection(aspect);
        result
    }

    pub fn update_view(&mut self) {
        self.view = glm::look_at_rh(&self.eye, &self.target, &glm::vec3(0.0, 1.0, 0.0));
    }

    pub fn update_projection(&mut self, aspect: f32) {
        self.proj = glm::perspective_rh_zo(aspect, self.fovy, self.znear, self.zfar);
    }

    pub fn set_camera(&mut self, eye: Vec3, target: Vec3) {
        self.eye = eye;
        self.target = target;
        self.update_view();
    }

    pub fn set_dir_light_direction(&mut self, direction: Vec3) {
        self.lights.dir_light.direction = vec3_to_array(&direction);
    }

    pub fn shadow_matrix(&self) -> Mat4 {
        let d = self.lights.dir_light.direction;
        planar_shadow_matrix(&self.shadow_plane, &glm::vec4(d[0], d[1], d[2], 0.0))
    }

    pub fn pass_constants(&self) -> SPassConstants {
        SPassConstants {
            camera_position: vec3_to_array(&self.eye),
            ambient_light: self.ambient_light,
            ..Default::default()
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EFrameOutcome {
    Submitted { frame_index: usize, fence_value: u64 },
    // -- the next frame resource is still on the GPU; nothing was written
    Busy,
    NothingToDraw,
}

// -- the frame loop: select a frame resource, fill its constants, record draws, submit
pub struct SRenderCore<D: TDevice> {
    config: SRenderConfig,
    scene: SSceneConstants,

    meshes: Vec<SMeshDesc>,
    items: Vec<SRenderItem>,

    // -- these hold descriptors from `descriptors` so must drop before it
    frames: Option<SFrameResourceRing<D>>,
    immediate: SCommandListRing<D>,
    descriptors: SDescriptorAllocatorSet<D>,

    fence: SFence<D>,
    queue: D::CommandQueue,
    device: Arc<D>,
}

impl<D: TDevice> SRenderCore<D> {
    pub fn new(device: Arc<D>, config: SRenderConfig) -> SResult<Self> {
        if config.frames_in_flight == 0 || config.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(EGPUError::InvalidArgument("frames in flight out of range"));
        }

        let queue = device.create_command_queue(ECommandListType::Direct)?;
        let fence = SFence::create(device.as_ref())?;
        let descriptors = SDescriptorAllocatorSet::create(device.as_ref(), &config.descriptor_heaps)?;
        let immediate = SCommandListRing::create(
            device.as_ref(),
            ECommandListType::Direct,
            config.command_list_ring_size,
        )?;

        log::info!(
            "render core: {} frames in flight, {}x{}",
            config.frames_in_flight,
            config.width,
            config.height
        );

        Ok(Self {
            scene: SSceneConstants::new(config.aspect()),
            config: config,
            meshes: Vec::new(),
            items: Vec::new(),
            frames: None,
            immediate: immediate,
            descriptors: descriptors,
            fence: fence,
            queue: queue,
            device: device,
        })
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn queue(&self) -> &D::CommandQueue {
        &self.queue
    }

    pub fn fence(&self) -> &SFence<D> {
        &self.fence
    }

    pub fn config(&self) -> &SRenderConfig {
        &self.config
    }

    pub fn descriptors(&self) -> &SDescriptorAllocatorSet<D> {
        &self.descriptors
    }

    pub fn frames(&self) -> Option<&SFrameResourceRing<D>> {
        self.frames.as_ref()
    }

    pub fn items(&self) -> &[SRenderItem] {
        &self.items
    }

    pub fn scene(&self) -> &SSceneConstants {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SSceneConstants {
        &mut self.scene
    }

    // -- replaces the scene's meshes. Frame resources are rebuilt to fit, so the GPU must be idle.
    pub fn load_meshes(&mut self, meshes: Vec<SMeshDesc>) -> SResult<()> {
        self.flush()?;
        self.frames = None;

        self.items = build_render_items(&meshes, self.config.planar_shadows);
        self.meshes = meshes;

        if !self.items.is_empty() {
            let descriptors = if self.config.frame_constant_descriptors {
                Some(self.descriptors.get(EDescriptorHeapType::ConstantBufferShaderResourceUnorderedAccess))
            } else {
                None
            };
            self.frames = Some(SFrameResourceRing::create(
                self.device.as_ref(),
                self.config.frames_in_flight,
                self.items.len(),
                descriptors,
            )?);
        }

        log::info!("loaded {} meshes as {} render items", self.meshes.len(), self.items.len());
        Ok(())
    }

    pub fn render_frame(&mut self) -> SResult<EFrameOutcome> {
        let frames = match self.frames.as_mut() {
            Some(frames) => frames,
            None => return Ok(EFrameOutcome::NothingToDraw),
        };

        let timeout = self.config.frame_wait_timeout();
        let mut recording = match frames.select_next(&self.fence, timeout)? {
            Some(recording) => recording,
            None => return Ok(EFrameOutcome::Busy),
        };

        let shadow = self.scene.shadow_matrix();
        let pass = self.scene.pass_constants();

        for item in self.items.iter() {
            let world = item.world(&self.meshes, &shadow);
            recording.write_transform(
                item.data_index,
                &STransform::new(&world, &self.scene.view, &self.scene.proj),
            )?;
            recording.write_light(item.data_index, &self.scene.lights)?;
            recording.write_material(item.data_index, &item.material(&self.meshes))?;
            recording.write_pass(item.data_index, &pass)?;

            recording.bind_item(item.data_index)?;
            recording
                .list()
                .draw_indexed_instanced(self.meshes[item.mesh].index_count, 1, 0, 0, 0);
        }

        let frame_index = recording.frame_index();
        let fence_value = recording.submit(&self.queue, &mut self.fence)?;
        log::trace!("submitted frame {} at fence {}", frame_index, fence_value);

        Ok(EFrameOutcome::Submitted {
            frame_index: frame_index,
            fence_value: fence_value,
        })
    }

    // -- one-off work (uploads and the like) on the immediate ring, waiting for its slot if needed
    pub fn execute_immediate<F>(&mut self, record: F) -> SResult<u64>
    where
        F: FnOnce(&mut D::CommandList) -> SResult<()>,
    {
        let list = match self.immediate.reset_blocking(&self.fence, None)? {
            Some(list) => list,
            None => return Err(EGPUError::Device("unbounded command list wait returned early")),
        };

        if let Err(e) = record(list) {
            self.immediate.abort()?;
            return Err(e);
        }

        self.immediate.execute(&self.queue, &mut self.fence)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> SResult<()> {
        if width == 0 || height == 0 {
            return Err(EGPUError::InvalidArgument("resize to zero size"));
        }

        self.flush()?;
        self.config.width = width;
        self.config.height = height;
        self.scene.update_projection(self.config.aspect());
        log::debug!("resized to {}x{}", width, height);
        Ok(())
    }

    pub fn flush(&mut self) -> SResult<()> {
        self.fence.flush_blocking(&self.queue)
    }
}

impl<D: TDevice> Drop for SRenderCore<D> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::error!("flushing GPU work on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::softgpu::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    fn cube(x: f32) -> SMeshDesc {
        SMeshDesc {
            world: glm::translation(&glm::vec3(x, 0.5, 0.0)),
            material: SMaterialBuffer {
                diffuse: [0.8, 0.2, 0.2],
                alpha: 1.0,
                specular: [0.5, 0.5, 0.5],
                shininess: 32.0,
            },
            index_count: 36,
        }
    }

    #[test]
    fn test_nothing_to_draw() {
        let device = Arc::new(SSoftDevice::default());
        let mut core = SRenderCore::new(device, SRenderConfig::default()).unwrap();
        assert_eq!(core.render_frame().unwrap(), EFrameOutcome::NothingToDraw);
    }

    #[test]
    fn test_frames_rotate_and_draw_every_item() {
        let device = Arc::new(SSoftDevice::default());
        let mut core = SRenderCore::new(device, SRenderConfig::default()).unwrap();
        core.load_meshes(vec![cube(0.0), cube(1.0)]).unwrap();
        assert_eq!(core.items().len(), 4);

        let mut indices = Vec::new();
        for _ in 0..4 {
            match core.render_frame().unwrap() {
                EFrameOutcome::Submitted { frame_index, .. } => indices.push(frame_index),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(indices, vec![0, 1, 0, 1]);

        let submission = core.queue().submissions().last().unwrap().clone();
        let draws = submission
            .commands
            .iter()
            .filter(|c| match c {
                ESoftCommand::DrawIndexedInstanced { .. } => true,
                _ => false,
            })
            .count();
        assert_eq!(draws, 4);
    }

    #[test]
    fn test_item_constants_written() {
        let device = Arc::new(SSoftDevice::default());
        let mut core = SRenderCore::new(device, SRenderConfig::default()).unwrap();
        core.load_meshes(vec![cube(2.0)]).unwrap();
        core.render_frame().unwrap();

        let frames = core.frames().unwrap();
        let transforms = frames.frame(0).transforms();
        let bytes = transforms.buffer().read(0, std::mem::size_of::<STransform>()).unwrap();
        let normal: STransform = *bytemuck::from_bytes(&bytes);
        assert_eq!(normal.world[3], [2.0, 0.5, 0.0, 1.0]);

        let bytes = transforms
            .buffer()
            .read(transforms.stride(), std::mem::size_of::<STransform>())
            .unwrap();
        let shadow: STransform = *bytemuck::from_bytes(&bytes);
        let expected = core.scene().shadow_matrix() * glm::translation(&glm::vec3(2.0, 0.5, 0.0));
        assert_eq!(shadow.world, mat4_to_array(&expected));

        let materials = frames.frame(0).materials();
        let bytes = materials
            .buffer()
            .read(materials.stride(), std::mem::size_of::<SMaterialBuffer>())
            .unwrap();
        let material: SMaterialBuffer = *bytemuck::from_bytes(&bytes);
        assert_eq!(material, SHADOW_MATERIAL);
    }

    // -- plays the GPU until stopped
    fn run_gpu(queue: SSoftCommandQueue) -> (Arc<AtomicBool>, thread::JoinHandle<()>) {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    queue.retire_all();
                    thread::sleep(Duration::from_millis(1));
                }
                queue.retire_all();
            })
        };
        (stop, handle)
    }

    #[test]
    fn test_busy_when_gpu_behind() {
        let device = Arc::new(SSoftDevice::new_manual());
        let config = SRenderConfig {
            frame_wait_timeout_ms: Some(5),
            frame_constant_descriptors: false,
            ..Default::default()
        };
        let mut core = SRenderCore::new(device, config).unwrap();

        let (stop, gpu) = run_gpu(core.queue().clone());
        core.load_meshes(vec![cube(0.0)]).unwrap();
        stop.store(true, Ordering::SeqCst);
        gpu.join().unwrap();

        let submitted_on = |outcome: EFrameOutcome| match outcome {
            EFrameOutcome::Submitted { frame_index, .. } => Some(frame_index),
            _ => None,
        };

        assert_eq!(submitted_on(core.render_frame().unwrap()), Some(0));
        assert_eq!(submitted_on(core.render_frame().unwrap()), Some(1));
        assert_eq!(core.render_frame().unwrap(), EFrameOutcome::Busy);
        assert_eq!(core.frames().unwrap().current_index(), 1);

        core.queue().retire_all();
        assert_eq!(submitted_on(core.render_frame().unwrap()), Some(0));

        // -- drop flushes, which needs the GPU running
        let (stop, gpu) = run_gpu(core.queue().clone());
        drop(core);
        stop.store(true, Ordering::SeqCst);
        gpu.join().unwrap();
    }

    #[test]
    fn test_execute_immediate() {
        let device = Arc::new(SSoftDevice::default());
        let mut core = SRenderCore::new(device, SRenderConfig::default()).unwrap();

        let value = core
            .execute_immediate(|list| {
                list.draw_indexed_instanced(3, 1, 0, 0, 0);
                Ok(())
            })
            .unwrap();
        assert!(core.fence().is_complete(value));
        assert_eq!(core.queue().submissions().len(), 1);

        let err = core
            .execute_immediate(|_| Err(EGPUError::InvalidArgument("bad upload")))
            .unwrap_err();
        assert_eq!(err, EGPUError::InvalidArgument("bad upload"));
        assert_eq!(core.queue().submissions().len(), 1);

        // -- ring still usable after an abort
        core.execute_immediate(|_| Ok(())).unwrap();
        assert_eq!(core.queue().submissions().len(), 2);
    }

    #[test]
    fn test_resize_updates_projection() {
        let device = Arc::new(SSoftDevice::default());
        let mut core = SRenderCore::new(device, SRenderConfig::default()).unwrap();
        let before = core.scene().proj;
        core.resize(400, 400).unwrap();
        assert!(core.scene().proj != before);
        assert_eq!(core.config().width, 400);
        assert!(core.resize(0, 10).is_err());
    }

    #[test]
    fn test_descriptors_return_on_reload() {
        let device = Arc::new(SSoftDevice::default());
        let mut core = SRenderCore::new(device, SRenderConfig::default()).unwrap();
        let cbv = core
            .descriptors()
            .get(EDescriptorHeapType::ConstantBufferShaderResourceUnorderedAccess)
            .clone();

        core.load_meshes(vec![cube(0.0), cube(1.0)]).unwrap();
        assert_eq!(cbv.allocated_handle_count(), 2 * 4 * 4);

        core.load_meshes(vec![cube(0.0)]).unwrap();
        assert_eq!(cbv.allocated_handle_count(), 2 * 4 * 2);

        core.load_meshes(Vec::new()).unwrap();
        assert_eq!(cbv.allocated_handle_count(), 0);
    }
}
