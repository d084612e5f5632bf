//! The GPU interface consumed by the renderer.
//!
//! The host owns the device, shader programs, and swapchain; the core
//! only needs buffer upload, uniform setting, and draw submission. Depth
//! testing stays disabled for map layers (paint order is the z-order);
//! blending is src-alpha / one-minus-src-alpha with straight alpha.
//! Label rendering discards atlas texels with alpha below 0.1.

use fxhash::FxHashMap;

/// Handle to a host-side GPU buffer
pub type BufferId = u32;

/// Primitive topology for a draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Triangles,
    Lines,
    Points,
}

/// Uniform names the core sets; hosts bind them to their shader pipeline
pub mod uniforms {
    /// f32 view-projection matrix, column-major
    pub const VIEW_PROJ: &str = "uViewProj";
    /// RGBA fill color of the current layer
    pub const FILL_COLOR: &str = "uFillColor";
    /// Per-layer stacking offset; depth writes stay disabled
    pub const DEPTH: &str = "uDepth";
    /// Orthographic pixel-space matrix for the label overlay
    pub const ORTHO: &str = "uOrtho";
}

/// Draw-submission primitives the host must provide.
///
/// Buffer creation is fallible only at startup (shader compilation and
/// context loss are host concerns); everything here is expected to
/// succeed or be silently dropped by the host on a lost context.
pub trait GpuContext {
    fn create_buffer(&mut self) -> BufferId;
    fn upload_vertices(&mut self, buffer: BufferId, data: &[f32]);
    fn upload_indices(&mut self, buffer: BufferId, data: &[u32]);
    fn set_uniform_mat4(&mut self, name: &str, value: &[[f32; 4]; 4]);
    fn set_uniform_vec4(&mut self, name: &str, value: [f32; 4]);
    fn set_uniform_f32(&mut self, name: &str, value: f32);
    fn draw_indexed(
        &mut self,
        kind: PrimitiveKind,
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        index_count: usize,
    );
    fn draw_arrays(&mut self, kind: PrimitiveKind, vertex_buffer: BufferId, vertex_count: usize);
}

/// One recorded draw call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub kind: PrimitiveKind,
    pub indexed: bool,
    pub count: usize,
    pub fill_color: [f32; 4],
    pub depth: f32,
}

/// A `GpuContext` that records submissions instead of drawing.
///
/// Used by headless hosts and tests to observe draw order and uniforms.
#[derive(Debug, Default)]
pub struct RecordingContext {
    next_buffer: BufferId,
    pub vertex_uploads: FxHashMap<BufferId, Vec<f32>>,
    pub index_uploads: FxHashMap<BufferId, Vec<u32>>,
    pub mat4_uniforms: FxHashMap<String, [[f32; 4]; 4]>,
    current_fill: [f32; 4],
    current_depth: f32,
    pub draws: Vec<RecordedDraw>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GpuContext for RecordingContext {
    fn create_buffer(&mut self) -> BufferId {
        let id = self.next_buffer;
        self.next_buffer += 1;
        id
    }

    fn upload_vertices(&mut self, buffer: BufferId, data: &[f32]) {
        self.vertex_uploads.insert(buffer, data.to_vec());
    }

    fn upload_indices(&mut self, buffer: BufferId, data: &[u32]) {
        self.index_uploads.insert(buffer, data.to_vec());
    }

    fn set_uniform_mat4(&mut self, name: &str, value: &[[f32; 4]; 4]) {
        self.mat4_uniforms.insert(name.to_string(), *value);
    }

    fn set_uniform_vec4(&mut self, name: &str, value: [f32; 4]) {
        if name == uniforms::FILL_COLOR {
            self.current_fill = value;
        }
    }

    fn set_uniform_f32(&mut self, name: &str, value: f32) {
        if name == uniforms::DEPTH {
            self.current_depth = value;
        }
    }

    fn draw_indexed(
        &mut self,
        kind: PrimitiveKind,
        _vertex_buffer: BufferId,
        _index_buffer: BufferId,
        index_count: usize,
    ) {
        self.draws.push(RecordedDraw {
            kind,
            indexed: true,
            count: index_count,
            fill_color: self.current_fill,
            depth: self.current_depth,
        });
    }

    fn draw_arrays(&mut self, kind: PrimitiveKind, _vertex_buffer: BufferId, vertex_count: usize) {
        self.draws.push(RecordedDraw {
            kind,
            indexed: false,
            count: vertex_count,
            fill_color: self.current_fill,
            depth: self.current_depth,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_context_tracks_uniform_state() {
        let mut gpu = RecordingContext::new();
        let vb = gpu.create_buffer();
        let ib = gpu.create_buffer();
        assert_ne!(vb, ib);

        gpu.set_uniform_vec4(uniforms::FILL_COLOR, [1.0, 0.0, 0.0, 1.0]);
        gpu.set_uniform_f32(uniforms::DEPTH, 0.25);
        gpu.draw_indexed(PrimitiveKind::Triangles, vb, ib, 3);

        assert_eq!(gpu.draws.len(), 1);
        assert_eq!(gpu.draws[0].fill_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(gpu.draws[0].depth, 0.25);
    }
}
