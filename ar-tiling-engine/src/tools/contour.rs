use bevy::prelude::*;
use constants::drawing::{MIN_POINT_SPACING_M, MIN_RING_POINTS, SNAP_CLOSE_RADIUS_M};
use serde::{Deserialize, Serialize};

/// Interaction phase of an AR drawing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArPhase {
    Idle,
    Scanning,
    Drawing,
    MaskPreview,
    HoleDrawing,
    Final,
}

impl ArPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Drawing => "drawing",
            Self::MaskPreview => "mask_preview",
            Self::HoleDrawing => "hole_drawing",
            Self::Final => "final",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourConfig {
    pub min_spacing: f32,
    pub snap_radius: f32,
    pub min_ring_points: usize,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            min_spacing: MIN_POINT_SPACING_M,
            snap_radius: SNAP_CLOSE_RADIUS_M,
            min_ring_points: MIN_RING_POINTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    Added,
    /// The outer contour snapped shut.
    Closed,
    HoleClosed,
    /// Too close to the previous point.
    RejectedDuplicate,
    /// Not accepting points in the current phase.
    Ignored,
}

/// Local planar frame captured at session start: XZ origin and heading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnchorFrame {
    pub origin: Vec3,
    pub yaw: f32,
}

impl AnchorFrame {
    /// World position to local floor coordinates (x, z).
    pub fn to_local(&self, world: Vec3) -> Vec2 {
        let offset = Vec2::new(world.x - self.origin.x, world.z - self.origin.z);
        Vec2::from_angle(-self.yaw).rotate(offset)
    }

    pub fn to_world(&self, local: Vec2, y: f32) -> Vec3 {
        let rotated = Vec2::from_angle(self.yaw).rotate(local);
        Vec3::new(rotated.x + self.origin.x, y, rotated.y + self.origin.z)
    }
}

/// Signed shoelace area; positive for counter-clockwise rings in (x, z).
pub fn shoelace(ring: &[Vec2]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0f64;
    for (i, a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        twice += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
    }
    twice * 0.5
}

/// Outer contour, cutout holes and the drawing phase of one AR session.
#[derive(Resource, Debug, Clone)]
pub struct ContourEditor {
    config: ContourConfig,
    phase: ArPhase,
    anchor: AnchorFrame,
    floor_y: f32,
    floor_locked: bool,
    points: Vec<Vec2>,
    holes: Vec<Vec<Vec2>>,
    hole_points: Vec<Vec2>,
    closed: bool,
}

impl Default for ContourEditor {
    fn default() -> Self {
        Self::new(ContourConfig::default())
    }
}

impl ContourEditor {
    pub fn new(config: ContourConfig) -> Self {
        Self {
            config,
            phase: ArPhase::Idle,
            anchor: AnchorFrame::default(),
            floor_y: 0.0,
            floor_locked: false,
            points: Vec::new(),
            holes: Vec::new(),
            hole_points: Vec::new(),
            closed: false,
        }
    }

    pub fn phase(&self) -> ArPhase {
        self.phase
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn holes(&self) -> &[Vec<Vec2>] {
        &self.holes
    }

    pub fn hole_points(&self) -> &[Vec2] {
        &self.hole_points
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn floor_y(&self) -> f32 {
        self.floor_y
    }

    pub fn is_floor_locked(&self) -> bool {
        self.floor_locked
    }

    pub fn anchor(&self) -> AnchorFrame {
        self.anchor
    }

    pub fn is_session_active(&self) -> bool {
        self.phase != ArPhase::Idle
    }

    /// New session: fresh contour, scanning for the floor.
    pub fn start_session(&mut self, anchor: AnchorFrame) {
        *self = Self { config: self.config, ..Self::default() };
        self.anchor = anchor;
        self.phase = ArPhase::Scanning;
    }

    pub fn end_session(&mut self) {
        *self = Self { config: self.config, ..Self::default() };
    }

    /// Fix the floor height and start drawing. Only the first lock counts.
    pub fn lock_floor(&mut self, floor_y: f32) -> bool {
        if self.phase != ArPhase::Scanning || self.floor_locked {
            return false;
        }
        self.floor_y = floor_y;
        self.floor_locked = true;
        self.phase = ArPhase::Drawing;
        info!("[CONTOUR] Floor locked at {:.3} m", floor_y);
        true
    }

    /// Place a world-space point (usually the reticle).
    pub fn place_at(&mut self, world: Vec3) -> PlacementOutcome {
        if !self.floor_locked || !self.is_session_active() {
            return PlacementOutcome::Ignored;
        }
        self.place_local(self.anchor.to_local(world))
    }

    pub fn place_local(&mut self, point: Vec2) -> PlacementOutcome {
        if !self.floor_locked {
            return PlacementOutcome::Ignored;
        }
        let config = self.config;
        match self.phase {
            ArPhase::Drawing if !self.closed => match place_in_ring(&mut self.points, point, &config) {
                PlacementOutcome::Closed => {
                    self.closed = true;
                    self.phase = ArPhase::MaskPreview;
                    info!("[CONTOUR] Outer contour closed with {} points", self.points.len());
                    PlacementOutcome::Closed
                }
                outcome => outcome,
            },
            ArPhase::HoleDrawing => match place_in_ring(&mut self.hole_points, point, &config) {
                PlacementOutcome::Closed => {
                    let ring = std::mem::take(&mut self.hole_points);
                    info!("[CONTOUR] Hole {} closed with {} points", self.holes.len() + 1, ring.len());
                    self.holes.push(ring);
                    self.phase = ArPhase::MaskPreview;
                    PlacementOutcome::HoleClosed
                }
                outcome => outcome,
            },
            _ => PlacementOutcome::Ignored,
        }
    }

    /// Remove the last outer or in-progress hole point.
    pub fn undo(&mut self) -> bool {
        match self.phase {
            ArPhase::Drawing => self.points.pop().is_some(),
            ArPhase::HoleDrawing => {
                if self.hole_points.pop().is_none() {
                    self.phase = ArPhase::MaskPreview;
                }
                true
            }
            _ => false,
        }
    }

    /// Start a new cutout. The previous hole must already be closed.
    pub fn begin_hole(&mut self) -> bool {
        if self.phase != ArPhase::MaskPreview || !self.closed || !self.hole_points.is_empty() {
            return false;
        }
        self.phase = ArPhase::HoleDrawing;
        true
    }

    pub fn cancel_hole(&mut self) -> bool {
        if self.phase != ArPhase::HoleDrawing {
            return false;
        }
        self.hole_points.clear();
        self.phase = ArPhase::MaskPreview;
        true
    }

    /// Reopen the outer contour for editing. Existing holes are discarded.
    pub fn edit_shape(&mut self) -> bool {
        if !self.closed {
            return false;
        }
        if !self.holes.is_empty() {
            info!("[CONTOUR] Editing outer shape, {} holes cleared", self.holes.len());
        }
        self.closed = false;
        self.holes.clear();
        self.hole_points.clear();
        self.phase = ArPhase::Drawing;
        true
    }

    /// Mask preview to final visualization.
    pub fn finish(&mut self) -> bool {
        if self.phase != ArPhase::MaskPreview || !self.closed {
            return false;
        }
        self.phase = ArPhase::Final;
        true
    }

    /// Drop the drawing and scan for the floor again within the same session.
    pub fn rescan(&mut self) -> bool {
        if !self.is_session_active() {
            return false;
        }
        info!("[CONTOUR] Rescanning floor, {} points dropped", self.points.len());
        let anchor = self.anchor;
        self.start_session(anchor);
        true
    }

    /// Outer area minus hole areas, in square metres. Zero until closed.
    pub fn area_m2(&self) -> f64 {
        if !self.closed || self.points.len() < self.config.min_ring_points {
            return 0.0;
        }
        let holes: f64 = self.holes.iter().map(|hole| shoelace(hole).abs()).sum();
        shoelace(&self.points).abs() - holes
    }

    /// Local point to world space on the locked floor.
    pub fn to_world(&self, local: Vec2) -> Vec3 {
        self.anchor.to_world(local, self.floor_y)
    }
}

fn place_in_ring(ring: &mut Vec<Vec2>, point: Vec2, config: &ContourConfig) -> PlacementOutcome {
    if let Some(last) = ring.last() {
        if last.distance(point) < config.min_spacing {
            return PlacementOutcome::RejectedDuplicate;
        }
    }
    if ring.len() >= config.min_ring_points {
        if let Some(first) = ring.first() {
            if first.distance(point) < config.snap_radius {
                return PlacementOutcome::Closed;
            }
        }
    }
    ring.push(point);
    PlacementOutcome::Added
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drawing_editor() -> ContourEditor {
        let mut editor = ContourEditor::default();
        editor.start_session(AnchorFrame::default());
        assert!(editor.lock_floor(-1.4));
        editor
    }

    fn draw_ring(editor: &mut ContourEditor, ring: &[Vec2]) {
        for point in ring {
            assert_eq!(editor.place_local(*point), PlacementOutcome::Added);
        }
    }

    const SQUARE: [Vec2; 4] = [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ];

    #[test]
    fn square_with_triangular_hole() {
        let mut editor = drawing_editor();
        draw_ring(&mut editor, &SQUARE);
        assert_eq!(editor.place_local(Vec2::new(0.03, 0.02)), PlacementOutcome::Closed);
        assert_eq!(editor.phase(), ArPhase::MaskPreview);
        assert_eq!(editor.points().len(), 4);
        assert!((editor.area_m2() - 1.0).abs() < 1e-6);

        let triangle = [Vec2::new(0.2, 0.2), Vec2::new(0.6, 0.2), Vec2::new(0.4, 0.7)];
        assert!(editor.begin_hole());
        draw_ring(&mut editor, &triangle);
        assert_eq!(editor.place_local(Vec2::new(0.21, 0.2)), PlacementOutcome::HoleClosed);
        assert_eq!(editor.phase(), ArPhase::MaskPreview);

        let expected = 1.0 - shoelace(&triangle).abs();
        assert!((editor.area_m2() - expected).abs() < 1e-6);
        assert!((expected - 0.9).abs() < 1e-6);
    }

    #[test]
    fn duplicate_click_is_a_no_op() {
        let mut editor = drawing_editor();
        editor.place_local(Vec2::ZERO);
        assert_eq!(editor.place_local(Vec2::new(0.03, 0.0)), PlacementOutcome::RejectedDuplicate);
        assert_eq!(editor.points().len(), 1);
        assert_eq!(editor.place_local(Vec2::new(0.05, 0.0)), PlacementOutcome::Added);
    }

    #[test]
    fn snap_needs_three_points() {
        let mut editor = drawing_editor();
        editor.place_local(Vec2::ZERO);
        editor.place_local(Vec2::new(1.0, 0.0));
        // Two points only: near the first point appends instead of closing.
        assert_eq!(editor.place_local(Vec2::new(0.08, 0.0)), PlacementOutcome::Added);
        assert!(!editor.is_closed());
        assert_eq!(editor.area_m2(), 0.0);
    }

    #[test]
    fn placement_ignored_before_floor_lock_and_after_close() {
        let mut editor = ContourEditor::default();
        assert_eq!(editor.place_at(Vec3::ZERO), PlacementOutcome::Ignored);
        editor.start_session(AnchorFrame::default());
        assert_eq!(editor.place_at(Vec3::ZERO), PlacementOutcome::Ignored);

        editor.lock_floor(0.0);
        draw_ring(&mut editor, &SQUARE);
        editor.place_local(Vec2::ZERO);
        assert_eq!(editor.place_local(Vec2::new(5.0, 5.0)), PlacementOutcome::Ignored);
    }

    #[test]
    fn holes_must_close_before_another_begins() {
        let mut editor = drawing_editor();
        draw_ring(&mut editor, &SQUARE);
        editor.place_local(Vec2::ZERO);
        assert!(editor.begin_hole());
        editor.place_local(Vec2::new(0.2, 0.2));
        assert!(!editor.begin_hole());
        assert!(editor.cancel_hole());
        assert!(editor.hole_points().is_empty());
        assert!(editor.holes().is_empty());
        assert_eq!(editor.phase(), ArPhase::MaskPreview);
    }

    #[test]
    fn edit_shape_reopens_and_clears_holes() {
        let mut editor = drawing_editor();
        draw_ring(&mut editor, &SQUARE);
        editor.place_local(Vec2::ZERO);
        editor.begin_hole();
        draw_ring(&mut editor, &[Vec2::new(0.2, 0.2), Vec2::new(0.6, 0.2), Vec2::new(0.4, 0.7)]);
        editor.place_local(Vec2::new(0.2, 0.2));
        assert_eq!(editor.holes().len(), 1);

        assert!(editor.edit_shape());
        assert_eq!(editor.phase(), ArPhase::Drawing);
        assert!(editor.holes().is_empty());
        assert_eq!(editor.points().len(), 4);
        assert!(editor.undo());
        assert_eq!(editor.points().len(), 3);
    }

    #[test]
    fn finish_requires_mask_preview() {
        let mut editor = drawing_editor();
        assert!(!editor.finish());
        draw_ring(&mut editor, &SQUARE);
        editor.place_local(Vec2::ZERO);
        assert!(editor.finish());
        assert_eq!(editor.phase(), ArPhase::Final);
        assert!(!editor.begin_hole());
    }

    #[test]
    fn anchor_frame_round_trips_and_clamps_to_floor() {
        let anchor = AnchorFrame { origin: Vec3::new(2.0, 0.0, -1.0), yaw: 0.7 };
        let world = Vec3::new(2.5, 0.3, 0.25);
        let local = anchor.to_local(world);
        let back = anchor.to_world(local, -1.2);
        assert!((back - Vec3::new(2.5, -1.2, 0.25)).length() < 1e-5);

        let mut editor = ContourEditor::default();
        editor.start_session(anchor);
        editor.lock_floor(-1.2);
        assert_eq!(editor.place_at(world), PlacementOutcome::Added);
        assert!((editor.to_world(editor.points()[0]) - back).length() < 1e-5);
    }

    fn star_polygon() -> impl Strategy<Value = Vec<Vec2>> {
        (3usize..10).prop_flat_map(|n| {
            (prop::collection::vec(1.0f32..3.0, n), prop::collection::vec(-0.2f32..0.2, n)).prop_map(
                move |(radii, jitter)| {
                    (0..n)
                        .map(|i| {
                            let step = std::f32::consts::TAU / n as f32;
                            let angle = step * (i as f32 + 0.5 + jitter[i]);
                            Vec2::from_angle(angle) * radii[i]
                        })
                        .collect()
                },
            )
        })
    }

    proptest! {
        #[test]
        fn area_is_outer_minus_holes(outer in star_polygon(), hole_radius in 0.1f32..0.4) {
            let mut editor = drawing_editor();
            for point in &outer {
                prop_assert_eq!(editor.place_local(*point), PlacementOutcome::Added);
            }
            prop_assert_eq!(editor.place_local(outer[0]), PlacementOutcome::Closed);

            let hole: Vec<Vec2> = (0..3)
                .map(|i| Vec2::from_angle(i as f32 * std::f32::consts::TAU / 3.0) * hole_radius)
                .collect();
            prop_assert!(editor.begin_hole());
            for point in &hole {
                prop_assert_eq!(editor.place_local(*point), PlacementOutcome::Added);
            }
            prop_assert_eq!(editor.place_local(hole[0]), PlacementOutcome::HoleClosed);

            let area = editor.area_m2();
            let expected = shoelace(&outer).abs() - shoelace(&hole).abs();
            prop_assert!(area >= 0.0);
            prop_assert!((area - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn rescan_drops_drawing_and_unlocks_floor() {
        let mut idle = ContourEditor::default();
        assert!(!idle.rescan());
        assert_eq!(idle.phase(), ArPhase::Idle);

        let mut editor = drawing_editor();
        draw_ring(&mut editor, &SQUARE);
        assert!(editor.rescan());
        assert_eq!(editor.phase(), ArPhase::Scanning);
        assert!(!editor.is_floor_locked());
        assert!(editor.points().is_empty());
        assert!(editor.lock_floor(-1.2));
    }
}
