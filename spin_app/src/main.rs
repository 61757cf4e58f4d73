//! Spin demo
//!
//! Opens a window and spins a triangle and a square. `V` toggles vsync,
//! `Escape` quits.

mod scene;
mod window;

use std::path::PathBuf;

use frame_core::config::{Config, RendererConfig};
use frame_core::foundation::logging;
use frame_core::render::{FrameStatus, Renderer, ShaderSource};
use glfw::{Action, Key, WindowEvent};

use window::GlfwWindow;

const CONFIG_PATH: &str = "config/renderer.toml";
const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 600;

fn shader_dir() -> PathBuf {
    std::env::var_os("SPIN_SHADER_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/target/shaders")))
}

fn load_shader(name: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let path = shader_dir().join(name);
    std::fs::read(&path).map_err(|e| format!("failed to read shader {}: {}", path.display(), e).into())
}

fn run(window: &mut GlfwWindow, renderer: &mut Renderer) -> Result<(), Box<dyn std::error::Error>> {
    let mut frames_displayed: u64 = 0;

    while !window.should_close() {
        window.poll_events();

        for event in window.flush_events() {
            match event {
                WindowEvent::Key(Key::Escape, _, Action::Press, _) | WindowEvent::Close => {
                    window.set_should_close(true);
                }
                WindowEvent::Key(Key::V, _, Action::Press, _) => {
                    renderer.toggle_vsync();
                }
                WindowEvent::FramebufferSize(width, height) => {
                    renderer.notify_resize(width.max(0) as u32, height.max(0) as u32)?;
                }
                _ => {}
            }
        }

        if renderer.is_paused() {
            window.wait_events();
            continue;
        }

        renderer.update(window);
        if renderer.draw()? == FrameStatus::Displayed {
            frames_displayed += 1;
        }
    }

    log::info!("Displayed {} frames", frames_displayed);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    log::info!("Starting spin demo");

    let config = RendererConfig::load_or_default(CONFIG_PATH)?;
    let mut window = GlfwWindow::new(&config.application_name, WINDOW_WIDTH, WINDOW_HEIGHT)?;

    let vertex = load_shader("scene.vert.spv")?;
    let fragment = load_shader("scene.frag.spv")?;
    let scene = scene::triangle_and_square();

    let mut renderer = Renderer::new(
        &window,
        config,
        &scene,
        ShaderSource {
            vertex: &vertex,
            fragment: &fragment,
        },
    )?;

    let result = run(&mut window, &mut renderer);
    renderer.wait_for_idle()?;
    drop(renderer);

    log::info!("Spin demo finished");
    result
}
