extern crate nalgebra_glm as glm;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rusframe::config::SRenderConfig;
use rusframe::errors::{self, SResult};
use rusframe::render::shaderbindings::SMaterialBuffer;
use rusframe::render::{EFrameOutcome, SMeshDesc, SRenderCore};
use rusframe::softgpu::{SSoftCommandQueue, SSoftDevice};

const FRAME_COUNT: usize = 120;

fn demo_meshes() -> Vec<SMeshDesc> {
    let material = |r: f32, g: f32, b: f32| SMaterialBuffer {
        diffuse: [r, g, b],
        alpha: 1.0,
        specular: [0.5, 0.5, 0.5],
        shininess: 32.0,
    };

    vec![
        SMeshDesc {
            world: glm::translation(&glm::vec3(-0.5, 0.25, 0.0)) * glm::scaling(&glm::vec3(0.25, 0.25, 0.25)),
            material: material(0.8, 0.2, 0.2),
            index_count: 36,
        },
        SMeshDesc {
            world: glm::translation(&glm::vec3(0.5, 0.25, 0.0)) * glm::scaling(&glm::vec3(0.25, 0.25, 0.25)),
            material: material(0.2, 0.2, 0.8),
            index_count: 36,
        },
    ]
}

// -- stands in for the GPU: retires queued work a little behind the CPU
fn spawn_gpu(queue: SSoftCommandQueue, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Acquire) {
            if !queue.retire_next() {
                thread::sleep(Duration::from_millis(1));
            } else {
                thread::sleep(Duration::from_micros(250));
            }
        }
        queue.retire_all();
    })
}

fn run(config: SRenderConfig) -> SResult<()> {
    let device = Arc::new(SSoftDevice::new_manual());
    let mut core = SRenderCore::new(device, config)?;

    let stop = Arc::new(AtomicBool::new(false));
    let gpu = spawn_gpu(core.queue().clone(), stop.clone());

    core.load_meshes(demo_meshes())?;

    let mut submitted = 0;
    let mut busy = 0;
    let mut angle = 0.0f32;
    while submitted < FRAME_COUNT {
        angle += 0.01;
        core.scene_mut()
            .set_dir_light_direction(glm::vec3(angle.sin(), -1.0, angle.cos()));

        match core.render_frame()? {
            EFrameOutcome::Submitted { .. } => submitted += 1,
            EFrameOutcome::Busy => busy += 1,
            EFrameOutcome::NothingToDraw => break,
        }
    }

    core.flush()?;
    log::info!(
        "rendered {} frames ({} busy waits), last fence {}",
        submitted,
        busy,
        core.fence().last_signalled_value()
    );

    drop(core);
    stop.store(true, Ordering::Release);
    if gpu.join().is_err() {
        log::error!("GPU thread panicked");
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => match SRenderConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{}", e);
                std::process::exit(1);
            }
        },
        None => SRenderConfig::default(),
    };

    if let Err(e) = run(config) {
        if e.is_fatal() {
            errors::fatal(&e);
        }
        log::error!("{}", e);
        std::process::exit(1);
    }
}
