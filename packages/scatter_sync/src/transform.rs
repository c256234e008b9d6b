//! Affine transforms and the flat matrix buffers sent to the render server.
//!
//! The render server expects every instance as twelve floats: the three rows
//! of a 3×4 affine matrix, each row holding the linear part followed by the
//! translation component.

use glam::{Affine3A, Mat4, Vec4};

/// Number of floats written per instance.
pub const FLOATS_PER_INSTANCE: usize = 12;

/// Row-major 3×4 affine transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub x: Vec4,
    pub y: Vec4,
    pub z: Vec4,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        x: Vec4::X,
        y: Vec4::Y,
        z: Vec4::Z,
    };

    pub fn from_rows(rows: [[f32; 4]; 3]) -> Self {
        Self {
            x: Vec4::from_array(rows[0]),
            y: Vec4::from_array(rows[1]),
            z: Vec4::from_array(rows[2]),
        }
    }

    /// Take the upper three rows of a column-major glam matrix.
    /// The bottom row is assumed to be (0, 0, 0, 1) and is dropped.
    pub fn from_mat4(m: Mat4) -> Self {
        Self {
            x: m.row(0),
            y: m.row(1),
            z: m.row(2),
        }
    }

    pub fn from_affine(affine: Affine3A) -> Self {
        Self::from_mat4(Mat4::from(affine))
    }

    pub fn from_translation(x: f32, y: f32, z: f32) -> Self {
        let mut t = Self::IDENTITY;
        t.x.w = x;
        t.y.w = y;
        t.z.w = z;
        t
    }

    pub fn to_rows(&self) -> [[f32; 4]; 3] {
        [self.x.to_array(), self.y.to_array(), self.z.to_array()]
    }

    /// Flatten into x.x, x.y, x.z, x.w, y.x, ... z.w.
    pub fn to_array(&self) -> [f32; FLOATS_PER_INSTANCE] {
        let mut out = [0.0; FLOATS_PER_INSTANCE];
        out[0..4].copy_from_slice(&self.x.to_array());
        out[4..8].copy_from_slice(&self.y.to_array());
        out[8..12].copy_from_slice(&self.z.to_array());
        out
    }

    /// Append this transform's twelve values to a matrix buffer.
    pub fn write_to(&self, buffer: &mut Vec<f32>) {
        buffer.extend_from_slice(&self.to_array());
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Mat4> for Transform {
    fn from(m: Mat4) -> Self {
        Self::from_mat4(m)
    }
}

impl From<Affine3A> for Transform {
    fn from(affine: Affine3A) -> Self {
        Self::from_affine(affine)
    }
}

/// Concatenate several transforms into one batched matrix buffer,
/// preserving iteration order.
pub fn build_matrix_buffer<'a, I>(transforms: I) -> Vec<f32>
where
    I: IntoIterator<Item = &'a Transform>,
{
    let iter = transforms.into_iter();
    let mut buffer = Vec::with_capacity(iter.size_hint().0 * FLOATS_PER_INSTANCE);
    for t in iter {
        t.write_to(&mut buffer);
    }
    buffer
}
