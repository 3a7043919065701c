//! Bootstrap controller wiring host environment, contract and transport together.

use crate::contract::{Puzzle, PuzzleCallbacks, PuzzleProps, merge_config};
use crate::environment::{HostEnvironment, HostStateProvider};
use crate::message::{FailureOptions, PuzzleMessage, SuccessOptions};
use crate::transport::HostTransport;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasPhase {
    Uninitialized,
    EnvironmentPending,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// One mounted puzzle session.
///
/// `mount` records the initial viewport, `resolve_environment` captures the
/// host state (the runtime defers it by one event-loop turn). Props stay
/// pending in between.
pub struct PuzzleCanvas {
    provider: Box<dyn HostStateProvider>,
    transport: Arc<dyn HostTransport>,
    environment: Option<HostEnvironment>,
    phase: CanvasPhase,
    viewport: Viewport,
    layout_revision: u64,
}

impl PuzzleCanvas {
    pub fn new(provider: Box<dyn HostStateProvider>, transport: Arc<dyn HostTransport>) -> Self {
        Self {
            provider,
            transport,
            environment: None,
            phase: CanvasPhase::Uninitialized,
            viewport: Viewport::default(),
            layout_revision: 0,
        }
    }

    pub fn mount(&mut self, viewport: Option<Viewport>) {
        if self.phase != CanvasPhase::Uninitialized {
            return;
        }

        if let Some(viewport) = viewport {
            self.on_resize(viewport);
        }
        self.phase = CanvasPhase::EnvironmentPending;
    }

    /// Captures the host environment. Later calls are no-ops and return `false`.
    pub fn resolve_environment(&mut self) -> bool {
        if self.phase == CanvasPhase::Ready {
            return false;
        }

        let environment = HostEnvironment::capture(self.provider.as_ref());
        tracing::debug!(
            preview = environment.preview(),
            source = ?environment.source(),
            "host environment resolved"
        );
        self.environment = Some(environment);
        self.phase = CanvasPhase::Ready;
        true
    }

    pub fn phase(&self) -> CanvasPhase {
        self.phase
    }

    pub fn environment(&self) -> Option<&HostEnvironment> {
        self.environment.as_ref()
    }

    pub fn props(&self) -> PuzzleProps {
        self.environment
            .as_ref()
            .map(PuzzleProps::from_environment)
            .unwrap_or_else(PuzzleProps::pending)
    }

    pub fn callbacks(&self) -> CanvasCallbacks {
        let config = self
            .environment
            .as_ref()
            .map(|env| env.config().clone())
            .unwrap_or_else(|| Value::Object(Map::new()));

        CanvasCallbacks {
            config,
            transport: self.transport.clone(),
        }
    }

    pub fn render(&self, puzzle: &mut dyn Puzzle) {
        puzzle.render(&self.props(), &self.callbacks());
    }

    /// Returns `true` when the layout actually changed.
    pub fn on_resize(&mut self, viewport: Viewport) -> bool {
        if viewport == self.viewport {
            return false;
        }

        self.viewport = viewport;
        self.layout_revision += 1;
        true
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn layout_revision(&self) -> u64 {
        self.layout_revision
    }
}

/// Contract callbacks bound to one render's config snapshot.
#[derive(Clone)]
pub struct CanvasCallbacks {
    config: Value,
    transport: Arc<dyn HostTransport>,
}

impl PuzzleCallbacks for CanvasCallbacks {
    fn on_config(&self, partial: Value) {
        PuzzleMessage::config(merge_config(&self.config, &partial)).post(self.transport.as_ref());
    }

    fn on_progress(&self, data: Value) {
        PuzzleMessage::progress(data).post(self.transport.as_ref());
    }

    fn on_failure(&self, options: FailureOptions) {
        PuzzleMessage::failure(options).post(self.transport.as_ref());
    }

    fn on_success(&self, options: SuccessOptions) {
        PuzzleMessage::success(options).post(self.transport.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::StaticStateProvider;
    use crate::transport::{DevHost, MissingTransport};
    use serde_json::json;

    fn canvas_with(state: Option<Value>) -> (PuzzleCanvas, Arc<DevHost>) {
        let host = Arc::new(DevHost::default());
        let canvas = PuzzleCanvas::new(Box::new(StaticStateProvider(state)), host.clone());
        (canvas, host)
    }

    #[derive(Default)]
    struct RecordingPuzzle {
        seen: Vec<PuzzleProps>,
    }

    impl Puzzle for RecordingPuzzle {
        fn render(&mut self, props: &PuzzleProps, callbacks: &dyn PuzzleCallbacks) {
            self.seen.push(props.clone());
            if props.start_fresh == Some(true) {
                callbacks.on_progress(json!({"moves": 0}));
            }
        }
    }

    #[test]
    fn lifecycle_moves_through_pending_to_ready() {
        let (mut canvas, _host) = canvas_with(None);
        assert_eq!(canvas.phase(), CanvasPhase::Uninitialized);

        canvas.mount(Some(Viewport::new(320.0, 480.0)));
        assert_eq!(canvas.phase(), CanvasPhase::EnvironmentPending);
        assert_eq!(canvas.props(), PuzzleProps::pending());
        assert!(canvas.environment().is_none());

        assert!(canvas.resolve_environment());
        assert_eq!(canvas.phase(), CanvasPhase::Ready);
        assert!(canvas.props().is_ready());
    }

    #[test]
    fn resolve_is_idempotent() {
        let (mut canvas, _host) = canvas_with(Some(json!({"preview": true})));
        canvas.mount(None);

        assert!(canvas.resolve_environment());
        assert!(!canvas.resolve_environment());
        assert_eq!(canvas.props().preview, Some(true));
    }

    #[test]
    fn puzzle_sees_pending_then_ready_props() {
        let (mut canvas, host) = canvas_with(Some(json!({"preview": false, "data": {"moves": 3}})));
        let mut puzzle = RecordingPuzzle::default();

        canvas.mount(None);
        canvas.render(&mut puzzle);
        canvas.resolve_environment();
        canvas.render(&mut puzzle);

        assert_eq!(puzzle.seen.len(), 2);
        assert!(!puzzle.seen[0].is_ready());
        assert_eq!(puzzle.seen[1].start_fresh, Some(false));
        assert_eq!(puzzle.seen[1].data, Some(json!({"moves": 3})));
        assert!(host.posted().is_empty());
    }

    #[test]
    fn config_updates_merge_without_touching_environment() {
        let (mut canvas, host) = canvas_with(Some(json!({"config": {"a": 1, "b": 2}})));
        canvas.mount(None);
        canvas.resolve_environment();

        canvas.callbacks().on_config(json!({"b": 3}));

        assert_eq!(host.posted(), vec![PuzzleMessage::config(json!({"a": 1, "b": 3}))]);
        let env = canvas.environment().expect("resolved");
        assert_eq!(env.config(), &json!({"a": 1, "b": 2}));
    }

    #[test]
    fn config_updates_while_pending_merge_onto_empty() {
        let (mut canvas, host) = canvas_with(Some(json!({"config": {"a": 1}})));
        canvas.mount(None);

        canvas.callbacks().on_config(json!({"b": 2}));

        assert_eq!(host.posted(), vec![PuzzleMessage::config(json!({"b": 2}))]);
    }

    #[test]
    fn progress_and_outcomes_are_forwarded_verbatim() {
        let (mut canvas, host) = canvas_with(None);
        canvas.mount(None);
        canvas.resolve_environment();
        let callbacks = canvas.callbacks();

        callbacks.on_progress(json!([1, 2, 3]));
        callbacks.on_failure(FailureOptions {
            messages: Some(vec!["try the corners".to_string()]),
            ..FailureOptions::default()
        });
        callbacks.on_success(SuccessOptions::with_message("Victory!"));

        let events: Vec<_> = host.posted().iter().map(PuzzleMessage::event).collect();
        assert_eq!(
            events,
            vec![
                crate::PuzzleEvent::Progress,
                crate::PuzzleEvent::Failure,
                crate::PuzzleEvent::Success
            ]
        );
        assert_eq!(host.posted()[0], PuzzleMessage::progress(json!([1, 2, 3])));
        assert_eq!(canvas.phase(), CanvasPhase::Ready);
    }

    #[test]
    fn identical_resize_is_skipped() {
        let (mut canvas, _host) = canvas_with(None);
        canvas.mount(Some(Viewport::new(320.0, 480.0)));
        assert_eq!(canvas.layout_revision(), 1);

        assert!(canvas.on_resize(Viewport::new(640.0, 480.0)));
        assert!(!canvas.on_resize(Viewport::new(640.0, 480.0)));
        assert_eq!(canvas.layout_revision(), 2);
        assert_eq!(canvas.viewport(), Viewport::new(640.0, 480.0));
    }

    #[test]
    fn callbacks_never_fail_without_a_transport() {
        let mut canvas =
            PuzzleCanvas::new(Box::new(StaticStateProvider(None)), Arc::new(MissingTransport));
        canvas.mount(None);
        canvas.resolve_environment();
        let callbacks = canvas.callbacks();

        callbacks.on_config(json!({"difficulty": "hard"}));
        callbacks.on_progress(json!({"moves": 1}));
        callbacks.on_failure(FailureOptions::default());
        callbacks.on_success(SuccessOptions::default());
    }
}
