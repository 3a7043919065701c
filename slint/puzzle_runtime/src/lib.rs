pub mod canvas;
pub mod config;
pub mod contract;
pub mod environment;
pub mod message;
pub mod package;
pub mod transport;

use serde::de::DeserializeOwned;
use serde_json::Value;
use slint::ComponentHandle;
use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

pub use crate::canvas::{CanvasCallbacks, CanvasPhase, PuzzleCanvas, Viewport};
pub use crate::config::{RuntimeConfig, TransportMode};
pub use crate::contract::{Puzzle, PuzzleCallbacks, PuzzleProps, merge_config, start_fresh};
pub use crate::environment::{
    EnvStateProvider, EnvironmentSource, HostEnvironment, HostStateError, HostStateProvider,
    StaticStateProvider,
};
pub use crate::message::{
    FailureOptions, MessageError, PuzzleEvent, PuzzleMessage, SuccessOptions,
};
pub use crate::package::{FsLoader, PackageError, PackageLoader, PuzzlePackage, PuzzlePackageInfo};
pub use crate::transport::{
    ChannelTransport, DevHost, HostTransport, MissingTransport, PUZZLE_TO_HOST_CAP,
    TransportError, read_message,
};
pub use serde_json;
pub use tracing;

const WRITER_FLUSH_WINDOW: Duration = Duration::from_millis(500);
const WRITER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Glue between the runtime and a generated Slint puzzle window.
pub trait PuzzleBindings: 'static {
    type Ui: ComponentHandle + 'static;

    fn new_ui() -> Result<Self::Ui, slint::PlatformError>;

    fn bind_config<F>(ui: &Self::Ui, handler: F)
    where
        F: Fn(Value) + Send + 'static;

    fn bind_progress<F>(ui: &Self::Ui, handler: F)
    where
        F: Fn(Value) + Send + 'static;

    fn bind_failure<F>(ui: &Self::Ui, handler: F)
    where
        F: Fn(FailureOptions) + Send + 'static;

    fn bind_success<F>(ui: &Self::Ui, handler: F)
    where
        F: Fn(SuccessOptions) + Send + 'static;

    fn bind_viewport_changed<F>(ui: &Self::Ui, handler: F)
    where
        F: Fn(Viewport) + Send + 'static;

    fn apply_props(ui: &Self::Ui, props: &PuzzleProps);
    fn set_viewport(ui: &Self::Ui, viewport: Viewport);
    fn set_title(ui: &Self::Ui, title: &str);

    fn initial_viewport(ui: &Self::Ui) -> Option<Viewport> {
        let window = ui.window();
        let size = window.size().to_logical(window.scale_factor());
        (size.width > 0.0 && size.height > 0.0).then(|| Viewport::new(size.width, size.height))
    }
}

struct HostSession {
    provider: Box<dyn HostStateProvider>,
    transport: Arc<dyn HostTransport>,
    writer: Option<JoinHandle<io::Result<()>>>,
}

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout is reserved for host frames.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run<B: PuzzleBindings>() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::from_env();
    let package = open_bundle(&config);
    let session = connect(&config, package.as_ref(), Box::new(EnvStateProvider::default()))?;

    let ui = B::new_ui()?;
    if let Some(package) = &package {
        B::set_title(&ui, &package.info.display_name);
    }

    let canvas = Arc::new(Mutex::new(PuzzleCanvas::new(
        session.provider,
        session.transport,
    )));

    {
        let mut mounted = canvas.lock().map_err(|_| "failed to lock puzzle canvas")?;
        mounted.mount(B::initial_viewport(&ui));
        B::set_viewport(&ui, mounted.viewport());
        B::apply_props(&ui, &mounted.props());
    }

    install_callbacks::<B>(&ui, canvas.clone());

    let canvas_for_env = canvas.clone();
    ui.as_weak().upgrade_in_event_loop(move |ui| {
        let Ok(mut canvas) = canvas_for_env.lock() else {
            tracing::warn!("failed to lock puzzle canvas for environment resolution");
            return;
        };

        if canvas.resolve_environment() {
            B::apply_props(&ui, &canvas.props());
        }
    })?;

    ui.run()?;

    // Callback closures hold canvas clones; the writer exits once the last
    // transport handle is gone.
    drop(ui);
    drop(canvas);

    if let Some(writer) = session.writer {
        join_writer(writer, WRITER_FLUSH_WINDOW);
    }

    Ok(())
}

/// Joins the writer if it finishes within `flush_window`. Returns whether it did.
fn join_writer(writer: JoinHandle<io::Result<()>>, flush_window: Duration) -> bool {
    let deadline = Instant::now() + flush_window;
    while !writer.is_finished() {
        if Instant::now() >= deadline {
            // Avoid hanging process exit on a blocked stdio write during teardown.
            tracing::warn!("writer thread still active during shutdown; skipping join");
            return false;
        }
        thread::sleep(WRITER_POLL_INTERVAL);
    }

    match writer.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!("writer thread returned error: {err}"),
        Err(err) => tracing::warn!("writer thread join failed: {err:?}"),
    }
    true
}

fn open_bundle(config: &RuntimeConfig) -> Option<PuzzlePackage> {
    let dir = config.bundle_dir.as_ref()?;
    let bundle = dir.to_string_lossy();

    match PuzzlePackage::open(&bundle, &FsLoader) {
        Ok(package) => {
            tracing::info!(
                name = %package.info.name,
                version = package.info.version.as_deref().unwrap_or("unversioned"),
                "loaded puzzle bundle"
            );
            Some(package)
        }
        Err(err) => {
            tracing::warn!("ignoring puzzle bundle {bundle}: {err}");
            None
        }
    }
}

fn connect(
    config: &RuntimeConfig,
    package: Option<&PuzzlePackage>,
    host_state: Box<dyn HostStateProvider>,
) -> Result<HostSession, Box<dyn std::error::Error>> {
    match config.transport {
        TransportMode::Stdio => {
            let (tx, rx) = mpsc::sync_channel(config.outbound_queue_cap);
            let writer = thread::Builder::new()
                .name("puzzle-host-writer".to_string())
                .spawn(move || transport::writer_loop(rx, io::stdout().lock()))?;

            Ok(HostSession {
                provider: host_state,
                transport: Arc::new(ChannelTransport::new(tx, config.outbound_queue_cap)),
                writer: Some(writer),
            })
        }
        TransportMode::Dev => {
            let seed = match package {
                Some(package) => package.default_host_state(false),
                None => host_state
                    .host_state()
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| DevHost::default().state()),
            };
            tracing::info!("running against the in-process dev host");

            let host = Arc::new(DevHost::new(seed));
            let state_host = host.clone();
            Ok(HostSession {
                provider: Box::new(move || state_host.host_state()),
                transport: host,
                writer: None,
            })
        }
        TransportMode::None => Ok(HostSession {
            provider: host_state,
            transport: Arc::new(MissingTransport),
            writer: None,
        }),
    }
}

fn install_callbacks<B: PuzzleBindings>(ui: &B::Ui, canvas: Arc<Mutex<PuzzleCanvas>>) {
    let config_canvas = canvas.clone();
    B::bind_config(ui, move |partial| {
        if let Some(callbacks) = current_callbacks(&config_canvas) {
            callbacks.on_config(partial);
        }
    });

    let progress_canvas = canvas.clone();
    B::bind_progress(ui, move |data| {
        if let Some(callbacks) = current_callbacks(&progress_canvas) {
            callbacks.on_progress(data);
        }
    });

    let failure_canvas = canvas.clone();
    B::bind_failure(ui, move |options| {
        if let Some(callbacks) = current_callbacks(&failure_canvas) {
            callbacks.on_failure(options);
        }
    });

    let success_canvas = canvas.clone();
    B::bind_success(ui, move |options| {
        if let Some(callbacks) = current_callbacks(&success_canvas) {
            callbacks.on_success(options);
        }
    });

    let ui_weak = ui.as_weak();
    B::bind_viewport_changed(ui, move |viewport| {
        let Ok(mut canvas) = canvas.lock() else {
            tracing::warn!("failed to lock puzzle canvas for resize");
            return;
        };

        if canvas.on_resize(viewport) {
            if let Some(ui) = ui_weak.upgrade() {
                B::set_viewport(&ui, viewport);
            }
        }
    });
}

fn current_callbacks(canvas: &Mutex<PuzzleCanvas>) -> Option<CanvasCallbacks> {
    match canvas.lock() {
        Ok(canvas) => Some(canvas.callbacks()),
        Err(_) => {
            tracing::warn!("failed to lock puzzle canvas; dropping puzzle callback");
            None
        }
    }
}

/// Decodes a payload string coming out of the UI. Empty or invalid input is `null`.
pub fn parse_payload_json(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Null;
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("ignoring invalid puzzle payload json: {err}");
            Value::Null
        }
    }
}

/// Decodes failure/success options coming out of the UI, defaulting on bad input.
pub fn parse_options_json<T: DeserializeOwned + Default>(raw: &str) -> T {
    match parse_payload_json(raw) {
        Value::Null => T::default(),
        value => serde_json::from_value(value).unwrap_or_else(|err| {
            tracing::warn!("ignoring invalid puzzle options: {err}");
            T::default()
        }),
    }
}

/// Renders an optional prop for the UI; pending props become an empty string.
pub fn prop_json(value: Option<&Value>) -> String {
    value.map(Value::to_string).unwrap_or_default()
}

#[macro_export]
macro_rules! puzzle_main {
    ($window:ty) => {
        struct PuzzleRuntimeBindings;

        impl $crate::PuzzleBindings for PuzzleRuntimeBindings {
            type Ui = $window;

            fn new_ui() -> Result<Self::Ui, slint::PlatformError> {
                <Self::Ui>::new()
            }

            fn bind_config<F>(ui: &Self::Ui, handler: F)
            where
                F: Fn($crate::serde_json::Value) + Send + 'static,
            {
                ui.on_emit_config(move |payload| {
                    handler($crate::parse_payload_json(&payload));
                });
            }

            fn bind_progress<F>(ui: &Self::Ui, handler: F)
            where
                F: Fn($crate::serde_json::Value) + Send + 'static,
            {
                ui.on_emit_progress(move |payload| {
                    handler($crate::parse_payload_json(&payload));
                });
            }

            fn bind_failure<F>(ui: &Self::Ui, handler: F)
            where
                F: Fn($crate::FailureOptions) + Send + 'static,
            {
                ui.on_emit_failure(move |options| {
                    handler($crate::parse_options_json(&options));
                });
            }

            fn bind_success<F>(ui: &Self::Ui, handler: F)
            where
                F: Fn($crate::SuccessOptions) + Send + 'static,
            {
                ui.on_emit_success(move |options| {
                    handler($crate::parse_options_json(&options));
                });
            }

            fn bind_viewport_changed<F>(ui: &Self::Ui, handler: F)
            where
                F: Fn($crate::Viewport) + Send + 'static,
            {
                ui.on_viewport_changed(move |width, height| {
                    handler($crate::Viewport::new(width, height));
                });
            }

            fn apply_props(ui: &Self::Ui, props: &$crate::PuzzleProps) {
                ui.set_env_ready(props.is_ready());
                ui.set_preview(props.preview.unwrap_or(false));
                ui.set_start_fresh(props.start_fresh.unwrap_or(false));
                ui.set_config_json($crate::prop_json(props.config.as_ref()).into());
                ui.set_data_json($crate::prop_json(props.data.as_ref()).into());
            }

            fn set_viewport(ui: &Self::Ui, viewport: $crate::Viewport) {
                ui.set_viewport_width(viewport.width);
                ui.set_viewport_height(viewport.height);
            }

            fn set_title(ui: &Self::Ui, title: &str) {
                ui.set_puzzle_title(title.into());
            }
        }

        fn main() {
            $crate::init_logging();

            if let Err(err) = $crate::run::<PuzzleRuntimeBindings>() {
                $crate::tracing::error!("puzzle host fatal error: {err}");
                std::process::exit(1);
            }
        }
    };
}
