// =============================================================================
// VK-HELLO - Vulkan device/swapchain bootstrap
// =============================================================================
//
// Opens a window, brings up Vulkan in a fixed order and clears the screen
// every frame.
//
// BOOTSTRAP ORDER:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Window (winit)                                                 │
// │    └── Instance (+ validation layers in debug builds)           │
// │          └── Surface                                            │
// │                └── Physical device (scored by BootstrapPolicy)  │
// │                      └── Logical device + queues + allocator    │
// │                            └── Swapchain + image views          │
// │                                  └── Renderer (sync, commands)  │
// └─────────────────────────────────────────────────────────────────┘
//
// Teardown is the same list bottom-up.
//
// =============================================================================

mod app;
mod backend;
mod config;
mod platform;

use anyhow::{Context, Result};
use app::App;
use config::{Config, CONFIG_PATH};
use winit::event_loop::EventLoop;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, config_error) = match Config::load_from_path(CONFIG_PATH) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    init_logging(&config);
    if let Some(e) = config_error {
        log::warn!("{:#}. Using defaults.", e);
    }
    log::info!("Starting vk-hello");
    log::info!(
        "Window: {}x{} '{}'",
        config.window.width,
        config.window.height,
        config.window.title
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop failed")?;

    // A bootstrap or frame failure stopped the loop: exit non-zero
    match app.take_error() {
        Some(e) => Err(e),
        None => {
            log::info!("Clean shutdown");
            Ok(())
        }
    }
}

/// Level from config.toml, RUST_LOG wins when set
fn init_logging(config: &Config) {
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();
}
