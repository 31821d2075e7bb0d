//! Calibration module.
//! Three-click wizard: operator marks the gauge center, then its minimum, then its maximum.
//! Each click updates the local point store right away, redraws markers and persists the two
//! coordinates to the camera. Remote requests are fire-and-forget tasks; their outcomes come back
//! over a channel and are applied on the session loop, which is the only writer of the store.

use crate::overlay::Surface;
use crate::params::{ParamError, ParamStore};
use crate::points::{Axis, PointRole, PointScheme, PointStore};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const MIN_TEXT: &str = "Please mark gauge minimum point";
pub const MAX_TEXT: &str = "Please mark gauge maximum point";

/// Step of the calibration cycle: which point the next click is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WizardState {
    Begin,
    Center,
    Min,
    Max,
}

/// Outcome of a remote request, delivered back to the session loop.
#[derive(Debug)]
pub enum Completion {
    Read {
        param: String,
        result: Result<String, ParamError>,
    },
    Write {
        param: String,
        result: Result<(), ParamError>,
    },
}

pub struct Calibrator<P: ParamStore, S: Surface> {
    store: Arc<P>,
    surface: S,
    points: PointStore,
    state: WizardState,
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
    in_flight: usize,
}

impl<P: ParamStore, S: Surface> Calibrator<P, S> {
    pub fn new(store: Arc<P>, surface: S, scheme: PointScheme) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            store,
            surface,
            points: PointStore::new(scheme),
            state: WizardState::Begin,
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn state(&self) -> WizardState {
        self.state
    }

    pub fn points(&self) -> &PointStore {
        &self.points
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    fn center_text(&self) -> String {
        format!(
            "Please mark gauge {} point (starts new calibration)",
            self.points.scheme().center_label()
        )
    }

    /// Seeds the store from the camera and arms the wizard for the first center click.
    pub fn start(&mut self) {
        self.init_with_current_values();
        self.on_point_captured(0, 0);
    }

    /// Requests all six coordinates. Reads are not ordered; each arrival redraws everything.
    pub fn init_with_current_values(&mut self) {
        for param in self.points.scheme().params() {
            self.spawn_read(param);
        }
    }

    /// Handles one click at surface pixel (`x`, `y`).
    pub fn on_point_captured(&mut self, x: i32, y: i32) {
        log::debug!("Click ({}, {}) in state {:?}", x, y, self.state);
        match self.state {
            WizardState::Center => {
                self.set_point(PointRole::Center, x, y);
                self.surface.clear();
                self.draw_point(PointRole::Center);
                self.state = WizardState::Min;
                self.surface.set_info_text(MIN_TEXT);
            }
            WizardState::Min => {
                self.set_point(PointRole::Min, x, y);
                self.draw_point(PointRole::Min);
                self.state = WizardState::Max;
                self.surface.set_info_text(MAX_TEXT);
            }
            WizardState::Max => {
                self.set_point(PointRole::Max, x, y);
                self.draw_point(PointRole::Max);
                // Completing the max step also re-arms the cycle within the same click.
                // TODO: confirm with the camera page owners whether this should wait for a separate click.
                self.rearm();
            }
            WizardState::Begin => self.rearm(),
        }
    }

    fn rearm(&mut self) {
        self.state = WizardState::Center;
        let text = self.center_text();
        self.surface.set_info_text(&text);
    }

    fn set_point(&mut self, role: PointRole, x: i32, y: i32) {
        self.set_param(role, Axis::X, x);
        self.set_param(role, Axis::Y, y);
    }

    /// Write-through: the local value changes now and is never rolled back.
    pub fn set_param(&mut self, role: PointRole, axis: Axis, value: i32) {
        self.points.set(role, axis, value);
        let param = self.points.scheme().param_name(role, axis);
        self.spawn_write(param, value.to_string());
    }

    /// Draws one marker and refreshes the readout.
    pub fn draw_point(&mut self, role: PointRole) {
        let point = self.points.point(role);
        log::trace!("Marker {} at ({}, {})", point.name, point.x, point.y);
        self.surface.draw_marker(point.x, point.y, point.color);
        let summary = self.points.summary();
        self.surface.set_values_text(&summary);
    }

    /// Clears the surface and draws max, center, min (min ends up on top).
    pub fn draw_all(&mut self) {
        self.surface.clear();
        self.draw_point(PointRole::Max);
        self.draw_point(PointRole::Center);
        self.draw_point(PointRole::Min);
    }

    fn spawn_read(&mut self, param: String) {
        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let result = store.fetch(&param).await;
            let _ = tx.send(Completion::Read { param, result });
        });
    }

    fn spawn_write(&mut self, param: String, value: String) {
        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let result = store.update(&param, &value).await;
            let _ = tx.send(Completion::Write { param, result });
        });
    }

    /// Applies the outcome of a finished request.
    pub fn apply(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match completion {
            Completion::Read { param, result: Ok(text) } => {
                if self.points.apply_param(&param, &text).is_none() {
                    log::warn!("Ignoring non-numeric value '{}' for {}", text, param);
                    self.surface.alert(&format!("FAILED to get {}", param));
                    return;
                }
                self.draw_all();
            }
            Completion::Read { result: Err(e), .. } => {
                log::warn!("{}", e);
                self.surface.alert(&format!("FAILED to get {}", e.param()));
            }
            Completion::Write { result: Ok(()), .. } => {}
            Completion::Write { result: Err(e), .. } => {
                log::warn!("{}", e);
                self.surface.alert(&format!("FAILED to set {}", e.param()));
            }
        }
    }

    /// Applies completions until no request is outstanding.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.rx.recv().await {
                Some(completion) => self.apply(completion),
                None => break,
            }
        }
    }

    /// Session loop: lets the startup reads land, then feeds clicks and completions into the wizard
    /// until the click source closes and waits for outstanding requests. `on_change` runs after
    /// every handled event.
    pub async fn run<F>(&mut self, clicks: &mut UnboundedReceiver<(i32, i32)>, mut on_change: F)
    where
        F: FnMut(&mut Self),
    {
        // Clicks queued before the camera answered must not be overwritten by the stored values.
        if self.in_flight > 0 {
            self.settle().await;
            on_change(self);
        }
        loop {
            tokio::select! {
                Some(completion) = self.rx.recv() => {
                    self.apply(completion);
                    on_change(self);
                }
                click = clicks.recv() => match click {
                    Some((x, y)) => {
                        self.on_point_captured(x, y);
                        on_change(self);
                    }
                    None => break,
                },
            }
        }
        self.settle().await;
        on_change(self);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::points::{CENTER_COLOR, EXTREME_COLOR};
    use image::Rgba;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// In-memory parameter store with per-parameter failure injection.
    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub values: Mutex<HashMap<String, String>>,
        pub fail_reads: HashSet<String>,
        pub fail_writes: HashSet<String>,
        pub fetched: Mutex<Vec<String>>,
        pub updates: Mutex<Vec<(String, String)>>,
    }

    impl FakeStore {
        pub(crate) fn with_values(pairs: &[(&str, &str)]) -> Self {
            let store = FakeStore::default();
            {
                let mut values = store.values.lock().unwrap();
                for (k, v) in pairs {
                    values.insert(k.to_string(), v.to_string());
                }
            }
            store
        }
    }

    impl ParamStore for FakeStore {
        async fn fetch(&self, name: &str) -> Result<String, ParamError> {
            self.fetched.lock().unwrap().push(name.to_string());
            if self.fail_reads.contains(name) {
                return Err(ParamError::Read {
                    param: name.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(self
                .values
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .unwrap_or_else(|| "0".to_string()))
        }

        async fn update(&self, name: &str, value: &str) -> Result<(), ParamError> {
            self.updates.lock().unwrap().push((name.to_string(), value.to_string()));
            if self.fail_writes.contains(name) {
                return Err(ParamError::Write {
                    param: name.to_string(),
                    reason: "HTTP status 500".to_string(),
                });
            }
            self.values.lock().unwrap().insert(name.to_string(), value.to_string());
            Ok(())
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    pub(crate) enum Op {
        Clear,
        Marker(i32, i32, Rgba<u8>),
        Values(String),
        Info(String),
        Alert(String),
    }

    #[derive(Default)]
    pub(crate) struct RecordingSurface {
        pub ops: Vec<Op>,
    }

    impl RecordingSurface {
        fn alerts(&self) -> Vec<&str> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Alert(msg) => Some(msg.as_str()),
                    _ => None,
                })
                .collect()
        }

        fn last_info(&self) -> Option<&str> {
            self.ops.iter().rev().find_map(|op| match op {
                Op::Info(text) => Some(text.as_str()),
                _ => None,
            })
        }

        fn last_values(&self) -> Option<&str> {
            self.ops.iter().rev().find_map(|op| match op {
                Op::Values(text) => Some(text.as_str()),
                _ => None,
            })
        }

        fn drawing_ops(&self) -> Vec<Op> {
            self.ops
                .iter()
                .filter(|op| matches!(op, Op::Clear | Op::Marker(..)))
                .cloned()
                .collect()
        }
    }

    impl Surface for RecordingSurface {
        fn clear(&mut self) {
            self.ops.push(Op::Clear);
        }
        fn draw_marker(&mut self, x: i32, y: i32, color: Rgba<u8>) {
            self.ops.push(Op::Marker(x, y, color));
        }
        fn set_values_text(&mut self, text: &str) {
            self.ops.push(Op::Values(text.to_string()));
        }
        fn set_info_text(&mut self, text: &str) {
            self.ops.push(Op::Info(text.to_string()));
        }
        fn alert(&mut self, message: &str) {
            self.ops.push(Op::Alert(message.to_string()));
        }
    }

    const CENTER_TEXT: &str = "Please mark gauge center point (starts new calibration)";

    fn calibrator(store: FakeStore) -> (Arc<FakeStore>, Calibrator<FakeStore, RecordingSurface>) {
        let store = Arc::new(store);
        let calibrator = Calibrator::new(Arc::clone(&store), RecordingSurface::default(), PointScheme::Center);
        (store, calibrator)
    }

    /// Calibrator armed for a center click, with its surface log emptied.
    fn armed(store: FakeStore) -> (Arc<FakeStore>, Calibrator<FakeStore, RecordingSurface>) {
        let (store, mut calibrator) = calibrator(store);
        calibrator.on_point_captured(0, 0);
        calibrator.surface_mut().ops.clear();
        (store, calibrator)
    }

    #[tokio::test]
    async fn test_synthetic_capture_arms_center_without_writing() {
        let (store, mut calibrator) = calibrator(FakeStore::default());
        assert_eq!(calibrator.state(), WizardState::Begin);

        calibrator.on_point_captured(0, 0);
        calibrator.settle().await;

        assert_eq!(calibrator.state(), WizardState::Center);
        assert_eq!(calibrator.surface().ops, vec![Op::Info(CENTER_TEXT.to_string())]);
        assert!(store.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_center_step_clears_and_draws_center_only() {
        let (store, mut calibrator) = armed(FakeStore::default());

        calibrator.on_point_captured(100, 200);
        assert_eq!(calibrator.points().get(PointRole::Center), (100, 200));
        calibrator.settle().await;

        assert_eq!(calibrator.state(), WizardState::Min);
        assert_eq!(
            calibrator.surface().drawing_ops(),
            vec![Op::Clear, Op::Marker(100, 200, CENTER_COLOR)]
        );
        assert_eq!(calibrator.surface().last_info(), Some(MIN_TEXT));
        assert_eq!(
            *store.updates.lock().unwrap(),
            vec![
                ("centerX".to_string(), "100".to_string()),
                ("centerY".to_string(), "200".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_min_step_overlays_without_clearing() {
        let (_store, mut calibrator) = armed(FakeStore::default());
        calibrator.on_point_captured(100, 200);
        calibrator.surface_mut().ops.clear();

        calibrator.on_point_captured(50, 60);

        assert_eq!(calibrator.state(), WizardState::Max);
        assert_eq!(calibrator.surface().drawing_ops(), vec![Op::Marker(50, 60, EXTREME_COLOR)]);
        assert_eq!(calibrator.surface().last_info(), Some(MAX_TEXT));
        assert_eq!(calibrator.points().get(PointRole::Min), (50, 60));
    }

    #[tokio::test]
    async fn test_max_step_rearms_in_same_click() {
        let (_store, mut calibrator) = armed(FakeStore::default());
        calibrator.on_point_captured(100, 200);
        calibrator.on_point_captured(50, 50);
        calibrator.surface_mut().ops.clear();

        calibrator.on_point_captured(900, 500);

        assert_eq!(calibrator.state(), WizardState::Center);
        assert_eq!(
            calibrator.surface().ops,
            vec![
                Op::Marker(900, 500, EXTREME_COLOR),
                Op::Values("center: (100, 200) min: (50, 50) max: (900, 500)".to_string()),
                Op::Info(CENTER_TEXT.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_pass_example() {
        let (store, mut calibrator) = armed(FakeStore::default());
        for (x, y) in [(100, 200), (50, 50), (900, 500)] {
            calibrator.on_point_captured(x, y);
        }
        calibrator.settle().await;

        assert_eq!(calibrator.state(), WizardState::Center);
        assert_eq!(calibrator.points().get(PointRole::Center), (100, 200));
        assert_eq!(calibrator.points().get(PointRole::Min), (50, 50));
        assert_eq!(calibrator.points().get(PointRole::Max), (900, 500));
        assert_eq!(
            calibrator.surface().last_values(),
            Some("center: (100, 200) min: (50, 50) max: (900, 500)")
        );
        let markers = calibrator
            .surface()
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Marker(..)))
            .count();
        assert_eq!(markers, 3);
        assert_eq!(store.updates.lock().unwrap().len(), 6);
        assert_eq!(store.values.lock().unwrap().get("maxY").map(String::as_str), Some("500"));
    }

    #[tokio::test]
    async fn test_fourth_click_starts_next_cycle() {
        let (_store, mut calibrator) = armed(FakeStore::default());
        for (x, y) in [(1, 1), (2, 2), (3, 3)] {
            calibrator.on_point_captured(x, y);
        }
        calibrator.surface_mut().ops.clear();

        calibrator.on_point_captured(4, 4);

        assert_eq!(calibrator.state(), WizardState::Min);
        assert_eq!(calibrator.points().get(PointRole::Center), (4, 4));
        assert_eq!(calibrator.points().get(PointRole::Max), (3, 3));
        assert_eq!(calibrator.surface().drawing_ops()[0], Op::Clear);
    }

    #[tokio::test]
    async fn test_draw_all_order() {
        let (_store, mut calibrator) = calibrator(FakeStore::default());
        calibrator.set_param(PointRole::Max, Axis::X, 3);
        calibrator.set_param(PointRole::Center, Axis::X, 1);
        calibrator.set_param(PointRole::Min, Axis::X, 2);

        calibrator.draw_all();

        assert_eq!(
            calibrator.surface().drawing_ops(),
            vec![
                Op::Clear,
                Op::Marker(3, 0, EXTREME_COLOR),
                Op::Marker(1, 0, CENTER_COLOR),
                Op::Marker(2, 0, EXTREME_COLOR),
            ]
        );
    }

    #[tokio::test]
    async fn test_start_reads_six_values_and_redraws_each_time() {
        let store = FakeStore::with_values(&[
            ("centerX", "512"),
            ("centerY", "288"),
            ("minX", "300"),
            ("minY", "400"),
            ("maxX", "700"),
            ("maxY", "410"),
        ]);
        let (store, mut calibrator) = calibrator(store);

        calibrator.start();
        assert_eq!(calibrator.state(), WizardState::Center);
        calibrator.settle().await;

        assert_eq!(
            *store.fetched.lock().unwrap(),
            vec!["centerX", "centerY", "minX", "minY", "maxX", "maxY"]
        );
        let clears = calibrator.surface().ops.iter().filter(|op| **op == Op::Clear).count();
        assert_eq!(clears, 6);
        assert_eq!(
            calibrator.surface().last_values(),
            Some("center: (512, 288) min: (300, 400) max: (700, 410)")
        );
        assert!(store.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_read_keeps_default_and_alerts_once() {
        let mut store = FakeStore::with_values(&[("minX", "300"), ("minY", "400")]);
        store.fail_reads.insert("minX".to_string());
        let (_store, mut calibrator) = calibrator(store);

        calibrator.start();
        calibrator.settle().await;

        assert_eq!(calibrator.points().get(PointRole::Min), (0, 400));
        assert_eq!(calibrator.surface().alerts(), vec!["FAILED to get minX"]);
        let clears = calibrator.surface().ops.iter().filter(|op| **op == Op::Clear).count();
        assert_eq!(clears, 5);
    }

    #[tokio::test]
    async fn test_non_numeric_read_is_reported() {
        let store = FakeStore::with_values(&[("maxY", "")]);
        let (_store, mut calibrator) = calibrator(store);

        calibrator.start();
        calibrator.settle().await;

        assert_eq!(calibrator.points().get(PointRole::Max), (0, 0));
        assert_eq!(calibrator.surface().alerts(), vec!["FAILED to get maxY"]);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_local_value_and_advances() {
        let mut store = FakeStore::default();
        store.fail_writes.insert("centerY".to_string());
        let (store, mut calibrator) = armed(store);

        calibrator.on_point_captured(100, 200);
        calibrator.settle().await;

        assert_eq!(calibrator.state(), WizardState::Min);
        assert_eq!(calibrator.points().get(PointRole::Center), (100, 200));
        assert_eq!(calibrator.surface().alerts(), vec!["FAILED to set centerY"]);
        assert_eq!(store.values.lock().unwrap().get("centerY"), None);
        assert_eq!(calibrator.in_flight, 0);
    }

    #[tokio::test]
    async fn test_mid_scheme_texts_and_params() {
        let store = Arc::new(FakeStore::default());
        let mut calibrator = Calibrator::new(Arc::clone(&store), RecordingSurface::default(), PointScheme::Mid);
        calibrator.on_point_captured(0, 0);
        assert_eq!(
            calibrator.surface().last_info(),
            Some("Please mark gauge middle point (starts new calibration)")
        );

        calibrator.on_point_captured(7, 8);
        calibrator.settle().await;
        assert_eq!(calibrator.surface().last_values(), Some("min: (0, 0) mid: (7, 8) max: (0, 0)"));
        assert_eq!(store.updates.lock().unwrap()[0].0, "midX");
    }

    #[tokio::test]
    async fn test_run_consumes_clicks_then_settles() {
        let (store, mut calibrator) = calibrator(FakeStore::default());
        calibrator.start();
        calibrator.settle().await;

        let (tx, mut clicks) = mpsc::unbounded_channel();
        for click in [(10, 20), (30, 40), (50, 60)] {
            tx.send(click).unwrap();
        }
        drop(tx);

        let mut changes = 0;
        calibrator.run(&mut clicks, |_| changes += 1).await;

        assert!(changes >= 3);
        assert_eq!(calibrator.in_flight, 0);
        assert_eq!(calibrator.state(), WizardState::Center);
        assert_eq!(store.updates.lock().unwrap().len(), 6);
        assert_eq!(calibrator.points().get(PointRole::Max), (50, 60));
    }

    #[tokio::test]
    async fn test_run_queued_clicks_win_over_startup_values() {
        let store = FakeStore::with_values(&[
            ("centerX", "1"),
            ("centerY", "1"),
            ("minX", "2"),
            ("minY", "2"),
            ("maxX", "3"),
            ("maxY", "3"),
        ]);
        let (store, mut calibrator) = calibrator(store);
        calibrator.start();

        let (tx, mut clicks) = mpsc::unbounded_channel();
        for click in [(100, 200), (50, 50), (900, 500)] {
            tx.send(click).unwrap();
        }
        drop(tx);

        calibrator.run(&mut clicks, |_| {}).await;

        assert_eq!(calibrator.state(), WizardState::Center);
        assert_eq!(
            calibrator.points().summary(),
            "center: (100, 200) min: (50, 50) max: (900, 500)"
        );
        assert_eq!(
            calibrator.surface().last_values(),
            Some("center: (100, 200) min: (50, 50) max: (900, 500)")
        );
        assert_eq!(store.values.lock().unwrap().get("centerX").map(String::as_str), Some("100"));
        assert_eq!(calibrator.in_flight, 0);
    }
}
