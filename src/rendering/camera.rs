//! Double-precision map camera.
//!
//! All camera math runs in f64 and is downcast to f32 only at the point
//! of GPU upload. Putting absolute mercator through a float matrix causes
//! visible vertex jitter at high zoom, so the downcast is the last step,
//! never an intermediate one.

use nalgebra::{Matrix4, Rotation3, Vector3, Vector4};

use crate::core::geo::{LngLatBounds, Mercator};

/// Vertical field of view; together with the altitude formula this pins
/// screen pixels 1:1 to mercator pixels at the camera's zoom.
const FOV_DEG: f64 = 60.0;
const MAX_PITCH_DEG: f64 = 60.0;
/// Pixel size of the world at zoom 0
const TILE_SIZE: f64 = 512.0;

/// Map camera: mercator center, zoom, bearing, pitch, viewport.
///
/// The frame driver is the only mutator; everything else reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    mx: f64,
    my: f64,
    zoom: f64,
    bearing: f64,
    pitch: f64,
    width: f64,
    height: f64,
    min_zoom: f64,
    max_zoom: f64,
}

impl Camera {
    pub fn new(
        center_lng: f64,
        center_lat: f64,
        zoom: f64,
        width: u32,
        height: u32,
        min_zoom: f64,
        max_zoom: f64,
    ) -> Self {
        let (mx, my) = Mercator::from_lnglat(center_lng, center_lat);
        Self {
            mx,
            my,
            zoom: zoom.clamp(min_zoom, max_zoom),
            bearing: 0.0,
            pitch: 0.0,
            width: width.max(1) as f64,
            height: height.max(1) as f64,
            min_zoom,
            max_zoom,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.mx, self.my)
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn bearing(&self) -> f64 {
        self.bearing
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn viewport(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// World size in pixels at the current zoom
    pub fn world_size(&self) -> f64 {
        TILE_SIZE * 2_f64.powf(self.zoom)
    }

    /// Camera altitude in pixels above the map plane
    fn altitude(&self) -> f64 {
        (self.height / 2.0) / (FOV_DEG / 2.0).to_radians().tan()
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.width = width.max(1) as f64;
        self.height = height.max(1) as f64;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
    }

    /// Sets bearing, normalized to [0, 360)
    pub fn set_bearing(&mut self, bearing: f64) {
        self.bearing = bearing.rem_euclid(360.0);
    }

    /// Sets pitch, clamped to [0, 60]
    pub fn set_pitch(&mut self, pitch: f64) {
        self.pitch = pitch.clamp(0.0, MAX_PITCH_DEG);
    }

    /// Pans by a screen-pixel delta. Dragging the surface down moves the
    /// camera up, so mercator y decreases with positive dy.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        let world_size = self.world_size();
        self.mx -= dx / world_size;
        self.my -= dy / world_size;
    }

    /// Zooms by `delta` levels keeping the world point under the screen
    /// position (sx, sy) fixed.
    pub fn zoom_at(&mut self, delta: f64, sx: f64, sy: f64) {
        let before = self.screen_to_world(sx, sy);
        self.set_zoom(self.zoom + delta);
        let after = self.screen_to_world(sx, sy);
        self.mx += before.0 - after.0;
        self.my += before.1 - after.1;
    }

    /// Full double-precision view-projection matrix.
    ///
    /// world: mercator -> pixel space centered on the camera, with the
    /// Y-flip reconciling mercator-y-down with GL-y-up. view: bearing roll
    /// around Z, pitch tilt around X, then back off by the altitude.
    pub fn view_projection_matrix(&self) -> Matrix4<f64> {
        let world_size = self.world_size();
        let world = Matrix4::new_nonuniform_scaling(&Vector3::new(world_size, -world_size, 1.0))
            * Matrix4::new_translation(&Vector3::new(-self.mx, -self.my, 0.0));

        let view = Matrix4::new_translation(&Vector3::new(0.0, 0.0, -self.altitude()))
            * Rotation3::from_axis_angle(&Vector3::x_axis(), (-self.pitch).to_radians())
                .to_homogeneous()
            * Rotation3::from_axis_angle(&Vector3::z_axis(), self.bearing.to_radians())
                .to_homogeneous();

        let projection = Matrix4::new_perspective(
            self.width / self.height,
            FOV_DEG.to_radians(),
            0.1,
            self.altitude() * 100.0,
        );

        projection * view * world
    }

    /// f32 downcast of the VP matrix for GPU upload, column-major
    pub fn view_projection_array(&self) -> [[f32; 4]; 4] {
        self.view_projection_matrix().map(|v| v as f32).into()
    }

    /// Unprojects a screen position to the mercator plane by casting a ray
    /// through the inverted view-projection matrix and intersecting z = 0.
    /// Degenerate rays fall back to the camera center.
    pub fn screen_to_world(&self, sx: f64, sy: f64) -> (f64, f64) {
        self.unproject(sx, sy, false)
    }

    fn unproject(&self, sx: f64, sy: f64, clamp_to_frustum: bool) -> (f64, f64) {
        let Some(inverse) = self.view_projection_matrix().try_inverse() else {
            return (self.mx, self.my);
        };

        let nx = 2.0 * sx / self.width - 1.0;
        let ny = 1.0 - 2.0 * sy / self.height;

        let near = inverse * Vector4::new(nx, ny, -1.0, 1.0);
        let far = inverse * Vector4::new(nx, ny, 1.0, 1.0);
        if near.w.abs() < 1e-15 || far.w.abs() < 1e-15 {
            return (self.mx, self.my);
        }
        let near = near / near.w;
        let far = far / far.w;

        let dz = far.z - near.z;
        if dz.abs() < 1e-15 {
            return (self.mx, self.my);
        }
        let mut t = -near.z / dz;
        if clamp_to_frustum {
            // Rays above the horizon miss the ground plane inside the
            // frustum; pinning t to the far plane over-approximates, which
            // is safe for planning.
            t = t.clamp(0.0, 1.0);
        }
        (
            near.x + t * (far.x - near.x),
            near.y + t * (far.y - near.y),
        )
    }

    /// Projects a mercator point to screen pixels; `None` when the point
    /// is behind the camera or the perspective divide degenerates.
    pub fn world_to_screen(&self, mx: f64, my: f64) -> Option<(f64, f64)> {
        let clip = self.view_projection_matrix() * Vector4::new(mx, my, 0.0, 1.0);
        if clip.w < 1e-9 {
            return None;
        }
        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        Some((
            (ndc_x + 1.0) * 0.5 * self.width,
            (1.0 - ndc_y) * 0.5 * self.height,
        ))
    }

    /// Approximate lng/lat rectangle of the on-screen footprint, used for
    /// tile planning. Samples corners and edge midpoints, clamps rays that
    /// miss the ground, and pads the union; over-approximation is fine,
    /// under-approximation would leave holes.
    pub fn bounds(&self) -> LngLatBounds {
        let (w, h) = (self.width, self.height);
        let samples = [
            (0.0, 0.0),
            (w, 0.0),
            (0.0, h),
            (w, h),
            (w / 2.0, 0.0),
            (w / 2.0, h),
            (0.0, h / 2.0),
            (w, h / 2.0),
        ];

        let mut bounds = LngLatBounds::empty();
        for (sx, sy) in samples {
            let (mx, my) = self.unproject(sx, sy, true);
            let (lng, lat) = Mercator::to_lnglat(mx.clamp(0.0, 1.0), my.clamp(0.0, 1.0));
            bounds.extend(lng, lat);
        }

        let lng_span = bounds.max_lng - bounds.min_lng;
        let lat_span = bounds.max_lat - bounds.min_lat;
        bounds.padded(lng_span * 0.05, lat_span * 0.05)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> Camera {
        Camera::new(0.0, 0.0, 5.0, 1024, 768, 0.0, 20.0)
    }

    #[test]
    fn test_screen_center_is_camera_center() {
        let camera = test_camera();
        let (mx, my) = camera.screen_to_world(512.0, 384.0);
        assert!((mx - 0.5).abs() < 1e-9);
        assert!((my - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_screen_world_roundtrip() {
        let mut camera = test_camera();
        camera.set_bearing(30.0);
        camera.set_pitch(40.0);
        for (sx, sy) in [(100.0, 200.0), (512.0, 384.0), (900.0, 700.0)] {
            let (mx, my) = camera.screen_to_world(sx, sy);
            let (bx, by) = camera.world_to_screen(mx, my).unwrap();
            assert!((bx - sx).abs() < 1e-6, "{sx} -> {bx}");
            assert!((by - sy).abs() < 1e-6, "{sy} -> {by}");
        }
    }

    #[test]
    fn test_zoom_at_anchor_invariant() {
        let mut camera = test_camera();
        let anchor = camera.screen_to_world(100.0, 200.0);
        camera.zoom_at(1.0, 100.0, 200.0);

        let (sx, sy) = camera.world_to_screen(anchor.0, anchor.1).unwrap();
        assert!((sx - 100.0).abs() < 0.5, "anchor drifted to {sx}");
        assert!((sy - 200.0).abs() < 0.5, "anchor drifted to {sy}");
    }

    #[test]
    fn test_zoom_at_anchor_with_rotation() {
        let mut camera = test_camera();
        camera.set_bearing(75.0);
        camera.set_pitch(35.0);
        let anchor = camera.screen_to_world(320.0, 600.0);
        camera.zoom_at(-1.5, 320.0, 600.0);

        let (sx, sy) = camera.world_to_screen(anchor.0, anchor.1).unwrap();
        assert!((sx - 320.0).abs() < 0.5);
        assert!((sy - 600.0).abs() < 0.5);
    }

    #[test]
    fn test_pan_shifts_center() {
        let mut camera = test_camera();
        let world_size = camera.world_size();
        camera.pan(100.0, -50.0);
        let (mx, my) = camera.center();
        assert!((mx - (0.5 - 100.0 / world_size)).abs() < 1e-12);
        assert!((my - (0.5 + 50.0 / world_size)).abs() < 1e-12);
    }

    #[test]
    fn test_pan_under_cursor_tracks_pointer() {
        // The world point under the press position should land under the
        // pointer after panning by the pointer delta (pitch 0, bearing 0).
        let mut camera = test_camera();
        let grabbed = camera.screen_to_world(400.0, 300.0);
        camera.pan(60.0, 40.0);
        let (sx, sy) = camera.world_to_screen(grabbed.0, grabbed.1).unwrap();
        assert!((sx - 460.0).abs() < 1e-6);
        assert!((sy - 340.0).abs() < 1e-6);
    }

    #[test]
    fn test_zoom_clamped() {
        let mut camera = test_camera();
        camera.set_zoom(30.0);
        assert_eq!(camera.zoom(), 20.0);
        camera.set_zoom(-3.0);
        assert_eq!(camera.zoom(), 0.0);
    }

    #[test]
    fn test_bearing_normalized() {
        let mut camera = test_camera();
        camera.set_bearing(370.0);
        assert!((camera.bearing() - 10.0).abs() < 1e-12);
        camera.set_bearing(-30.0);
        assert!((camera.bearing() - 330.0).abs() < 1e-12);
        camera.set_bearing(360.0);
        assert_eq!(camera.bearing(), 0.0);
    }

    #[test]
    fn test_pitch_clamped() {
        let mut camera = test_camera();
        camera.set_pitch(80.0);
        assert_eq!(camera.pitch(), 60.0);
        camera.set_pitch(-10.0);
        assert_eq!(camera.pitch(), 0.0);
    }

    #[test]
    fn test_world_to_screen_behind_camera() {
        let mut camera = Camera::new(0.0, 0.0, 0.0, 1024, 768, 0.0, 20.0);
        camera.set_pitch(60.0);
        // Two full worlds south of the center passes under and behind the
        // tilted camera.
        assert_eq!(camera.world_to_screen(0.5, 2.5), None);
    }

    #[test]
    fn test_bounds_covers_screen_samples() {
        let mut camera = test_camera();
        camera.set_pitch(45.0);
        camera.set_bearing(120.0);
        let bounds = camera.bounds();

        for (sx, sy) in [(0.0, 0.0), (1024.0, 0.0), (0.0, 768.0), (1024.0, 768.0), (512.0, 384.0)]
        {
            let (mx, my) = camera.screen_to_world(sx, sy);
            let (lng, lat) = Mercator::to_lnglat(mx.clamp(0.0, 1.0), my.clamp(0.0, 1.0));
            assert!(
                bounds.contains(&crate::core::geo::LngLat::new(lng, lat)),
                "({sx},{sy}) ground point escaped planning bounds"
            );
        }
    }

    #[test]
    fn test_vp_array_is_finite() {
        let mut camera = test_camera();
        camera.set_pitch(55.0);
        camera.set_bearing(200.0);
        let array = camera.view_projection_array();
        assert!(array.iter().flatten().all(|v| v.is_finite()));
    }
}
