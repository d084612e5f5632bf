//! The map façade and frame driver.
//!
//! Owns the camera, tile store, batcher, and label engine; translates
//! host input into camera mutations; and decides when viewport changes
//! are worth re-planning tile fetches. Rendering is event-driven: hosts
//! poll [`Map::needs_redraw`] and call [`Map::render`] on demand instead
//! of spinning a fixed-rate loop.

use log::debug;

use crate::prelude::*;

use crate::core::config::{MapOptions, Rgba};
use crate::input::events::{InputEvent, MouseButton};
use crate::rendering::backend::GpuContext;
use crate::rendering::batcher::LayerBatcher;
use crate::rendering::camera::Camera;
use crate::rendering::labels::LabelEngine;
use crate::tiles::source::TemplateSource;
use crate::tiles::store::TileStore;

/// Delay before rotation/pitch changes trigger tile planning. Tile
/// coverage shifts little during a tumble, so eager planning there only
/// burns bandwidth.
const ROTATE_DEBOUNCE: Duration = Duration::from_millis(500);
/// Zoom deltas beyond this re-plan immediately instead of debouncing
const IMMEDIATE_ZOOM_DELTA: f64 = 0.5;
/// Degrees of bearing/pitch per pixel of right-drag
const ROTATE_SPEED: f64 = 0.3;

/// Decides when viewport-change planning runs.
///
/// Idle -> Interacting -> Debouncing(500 ms) -> Idle; any new deferred
/// interaction resets the timer, an immediate request short-circuits it.
#[derive(Debug)]
pub(crate) struct PlanScheduler {
    pending_immediate: bool,
    deadline: Option<Instant>,
}

impl PlanScheduler {
    fn new() -> Self {
        // The initial viewport plans on the first frame
        Self {
            pending_immediate: true,
            deadline: None,
        }
    }

    fn request_immediate(&mut self) {
        self.pending_immediate = true;
        self.deadline = None;
    }

    fn request_deferred(&mut self, now: Instant) {
        if !self.pending_immediate {
            self.deadline = Some(now + ROTATE_DEBOUNCE);
        }
    }

    /// True when planning should run now; consumes the trigger.
    fn poll(&mut self, now: Instant) -> bool {
        if self.pending_immediate {
            self.pending_immediate = false;
            self.deadline = None;
            return true;
        }
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            self.deadline = None;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragMode {
    None,
    Pan,
    Rotate,
}

/// The embeddable map
pub struct Map {
    options: MapOptions,
    camera: Camera,
    store: TileStore,
    batcher: LayerBatcher,
    labels: LabelEngine,
    scheduler: PlanScheduler,
    drag: DragMode,
    cursor: (f64, f64),
    zoom_at_last_plan: f64,
    last_prune: Instant,
    dirty: bool,
}

impl Map {
    pub fn new(options: MapOptions) -> Self {
        let camera = Camera::new(
            options.center_lng,
            options.center_lat,
            options.zoom,
            options.viewport_w,
            options.viewport_h,
            options.min_zoom,
            options.max_zoom,
        );
        let allowlist: FxHashSet<String> = options.layer_allowlist.iter().cloned().collect();
        let store = TileStore::new(
            Arc::new(TemplateSource::new(options.tile_url.clone())),
            allowlist,
            options.max_tile_zoom,
            options.tile_buffer,
            options.max_concurrent_fetches,
        );
        let mut batcher = LayerBatcher::new(options.layer_colors.iter().cloned());
        for layer in &options.disabled_layers {
            batcher.disable_layer(layer);
        }

        let zoom = camera.zoom();
        Self {
            options,
            camera,
            store,
            batcher,
            labels: LabelEngine::new(),
            scheduler: PlanScheduler::new(),
            drag: DragMode::None,
            cursor: (0.0, 0.0),
            zoom_at_last_plan: zoom,
            last_prune: Instant::now(),
            dirty: true,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn store(&self) -> &TileStore {
        &self.store
    }

    /// Feeds one host input event into the interaction state machine
    pub fn on_input(&mut self, event: InputEvent) {
        let now = Instant::now();
        match event {
            InputEvent::Press { button, x, y } => {
                self.cursor = (x, y);
                self.drag = match button {
                    MouseButton::Left => DragMode::Pan,
                    MouseButton::Right => DragMode::Rotate,
                    MouseButton::Middle => DragMode::None,
                };
            }
            InputEvent::Release { .. } => {
                self.drag = DragMode::None;
            }
            InputEvent::Move { x, y } => {
                let (dx, dy) = (x - self.cursor.0, y - self.cursor.1);
                self.cursor = (x, y);
                match self.drag {
                    DragMode::Pan => {
                        self.camera.pan(dx, dy);
                        self.scheduler.request_immediate();
                        self.dirty = true;
                    }
                    DragMode::Rotate => {
                        self.camera.set_bearing(self.camera.bearing() + dx * ROTATE_SPEED);
                        self.camera.set_pitch(self.camera.pitch() - dy * ROTATE_SPEED);
                        self.scheduler.request_deferred(now);
                        self.dirty = true;
                    }
                    DragMode::None => {}
                }
            }
            InputEvent::Wheel { delta, x, y } => {
                self.camera.zoom_at(delta, x, y);
                if (self.camera.zoom() - self.zoom_at_last_plan).abs() > IMMEDIATE_ZOOM_DELTA {
                    self.scheduler.request_immediate();
                } else {
                    self.scheduler.request_deferred(now);
                }
                self.dirty = true;
            }
        }
    }

    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.camera.set_viewport(width, height);
        self.scheduler.request_immediate();
        self.dirty = true;
    }

    pub fn set_layer_color(&mut self, layer: &str, color: Rgba) {
        self.batcher.set_layer_color(layer, color);
        self.dirty = true;
    }

    pub fn disable_layer(&mut self, layer: &str) {
        self.batcher.disable_layer(layer);
        self.dirty = true;
    }

    /// True when input, a finished tile, or a resize made the current
    /// frame stale.
    pub fn needs_redraw(&self) -> bool {
        self.dirty || self.store.has_completed()
    }

    /// Draws one frame: run due planning, snapshot renderable tiles,
    /// submit layer batches, then the label overlay.
    ///
    /// `_dt` is the host frame delta; the core has no animated state but
    /// keeps the hook so hosts drive it uniformly.
    pub fn render(&mut self, gpu: &mut dyn GpuContext, _dt: f64) {
        let now = Instant::now();
        if self.scheduler.poll(now) {
            self.plan_tiles();
        }
        self.store.drain_completed();

        let bounds = self.camera.bounds();
        let viewport_tiles = self.store.viewport_tiles(&bounds, self.camera.zoom());
        let renderable = self.store.renderable_tiles(&viewport_tiles);
        debug!(
            "frame: {} viewport tiles, {} renderable",
            viewport_tiles.len(),
            renderable.len()
        );

        self.batcher.render(gpu, &self.camera, &renderable);
        self.labels.render(gpu, &self.camera, &renderable);

        let ttl = Duration::from_secs(self.options.tile_ttl_secs);
        if now.duration_since(self.last_prune) > ttl / 2 {
            let mut keep: FxHashSet<String> = FxHashSet::default();
            for tile in &viewport_tiles {
                let mut cursor = Some(*tile);
                while let Some(coord) = cursor {
                    keep.insert(coord.key());
                    cursor = coord.parent();
                }
            }
            self.store.prune(ttl, &keep);
            self.last_prune = now;
        }

        self.dirty = false;
    }

    fn plan_tiles(&mut self) {
        let bounds = self.camera.bounds();
        self.store.plan(&bounds, self.camera.zoom());
        self.zoom_at_last_plan = self.camera.zoom();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::backend::RecordingContext;

    fn options() -> MapOptions {
        MapOptions {
            viewport_w: 1024,
            viewport_h: 768,
            zoom: 5.0,
            tile_url: "http://127.0.0.1:9/{z}/{x}/{y}.pbf".into(),
            ..MapOptions::default()
        }
    }

    #[test]
    fn test_debounce_rotation_burst() {
        // Bearing ticks at 60 Hz for 300 ms, then idle: zero plans during
        // the tumble, exactly one 500 ms after the last event.
        let mut scheduler = PlanScheduler::new();
        let start = Instant::now();
        assert!(scheduler.poll(start)); // initial plan

        let mut last_event = start;
        let mut plans_during = 0;
        for tick in 0..18 {
            let at = start + Duration::from_millis(tick * 16);
            scheduler.request_deferred(at);
            last_event = at;
            if scheduler.poll(at) {
                plans_during += 1;
            }
        }
        assert_eq!(plans_during, 0);

        // Just before the deadline: still quiet
        assert!(!scheduler.poll(last_event + Duration::from_millis(499)));
        // At the deadline: exactly one plan
        assert!(scheduler.poll(last_event + Duration::from_millis(500)));
        assert!(!scheduler.poll(last_event + Duration::from_millis(600)));
    }

    #[test]
    fn test_pan_plans_immediately() {
        let mut scheduler = PlanScheduler::new();
        let start = Instant::now();
        scheduler.poll(start);

        scheduler.request_immediate();
        assert!(scheduler.poll(start));
        assert!(!scheduler.poll(start));
    }

    #[test]
    fn test_new_interaction_resets_timer() {
        let mut scheduler = PlanScheduler::new();
        let start = Instant::now();
        scheduler.poll(start);

        scheduler.request_deferred(start);
        let later = start + Duration::from_millis(400);
        scheduler.request_deferred(later);

        // The first deadline has passed but was reset by the second event
        assert!(!scheduler.poll(start + Duration::from_millis(550)));
        assert!(scheduler.poll(later + Duration::from_millis(500)));
    }

    #[tokio::test]
    async fn test_input_drives_camera() {
        let mut map = Map::new(options());
        let (mx0, my0) = map.camera().center();

        map.on_input(InputEvent::Press {
            button: MouseButton::Left,
            x: 100.0,
            y: 100.0,
        });
        map.on_input(InputEvent::Move { x: 150.0, y: 80.0 });
        map.on_input(InputEvent::Release {
            button: MouseButton::Left,
        });

        let (mx, my) = map.camera().center();
        assert!(mx < mx0, "drag right moves camera west");
        assert!(my > my0, "drag up moves camera south");
        assert!(map.needs_redraw());
    }

    #[tokio::test]
    async fn test_right_drag_rotates() {
        let mut map = Map::new(options());
        map.on_input(InputEvent::Press {
            button: MouseButton::Right,
            x: 500.0,
            y: 400.0,
        });
        map.on_input(InputEvent::Move { x: 540.0, y: 360.0 });

        assert!(map.camera().bearing() > 0.0);
        assert!(map.camera().pitch() > 0.0);
    }

    #[tokio::test]
    async fn test_wheel_zooms_at_cursor() {
        let mut map = Map::new(options());
        let anchor = map.camera().screen_to_world(200.0, 300.0);
        map.on_input(InputEvent::Wheel {
            delta: 1.0,
            x: 200.0,
            y: 300.0,
        });

        assert_eq!(map.camera().zoom(), 6.0);
        let (sx, sy) = map.camera().world_to_screen(anchor.0, anchor.1).unwrap();
        assert!((sx - 200.0).abs() < 0.5);
        assert!((sy - 300.0).abs() < 0.5);
    }

    #[tokio::test]
    async fn test_render_plans_initial_viewport() {
        let mut map = Map::new(options());
        let mut gpu = RecordingContext::new();
        assert!(map.needs_redraw());

        map.render(&mut gpu, 0.016);
        // The initial plan inserted Loading entries for the viewport
        assert!(!map.store().is_empty());
        assert!(!map.needs_redraw() || map.store().has_completed());
    }

    #[tokio::test]
    async fn test_resize_updates_camera() {
        let mut map = Map::new(options());
        map.on_resize(640, 480);
        assert_eq!(map.camera().viewport(), (640.0, 480.0));
        assert!(map.needs_redraw());
    }
}
