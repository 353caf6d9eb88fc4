//! Fixed geometry for the two overlay variants
//!
//! Vertex types are plain `#[repr(C)]` data so they can be uploaded with
//! `bytemuck::cast_slice`. Positions are in normalized device coordinates
//! (Vulkan convention: +Y points down).

use bytemuck::{Pod, Zeroable};
use nalgebra::{Vector2, Vector3};

/// Vertex with a 2D position and an RGB color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    /// Position in NDC
    pub position: [f32; 2],
    /// Linear RGB color
    pub color: [f32; 3],
}

/// Vertex with a 2D position and a texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    /// Position in NDC
    pub position: [f32; 2],
    /// Texture coordinate, (0,0) top-left
    pub tex_coord: [f32; 2],
}

/// Default colored triangle: red top, green bottom-right, blue bottom-left
pub const TRIANGLE_VERTICES: [ColorVertex; 3] = [
    ColorVertex {
        position: [0.0, -0.5],
        color: [1.0, 0.0, 0.0],
    },
    ColorVertex {
        position: [0.5, 0.5],
        color: [0.0, 1.0, 0.0],
    },
    ColorVertex {
        position: [-0.5, 0.5],
        color: [0.0, 0.0, 1.0],
    },
];

/// Two triangles over the four quad corners
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 1, 3];

/// Centered quad showing the whole glyph texture without stretching
///
/// `half_height` is in NDC units. The width follows the texture's aspect
/// ratio corrected for the window's aspect ratio, and both halves are
/// capped at 1.0 so the quad never leaves the viewport.
pub fn text_quad(texture_extent: (u32, u32), window_extent: (u32, u32), half_height: f32) -> [TexturedVertex; 4] {
    let texture_aspect = texture_extent.0.max(1) as f32 / texture_extent.1.max(1) as f32;
    let window_aspect = window_extent.0.max(1) as f32 / window_extent.1.max(1) as f32;

    let mut h = half_height.clamp(0.0, 1.0);
    let mut w = h * texture_aspect / window_aspect;
    if w > 1.0 {
        h /= w;
        w = 1.0;
    }

    [
        TexturedVertex {
            position: [-w, -h],
            tex_coord: [0.0, 0.0],
        },
        TexturedVertex {
            position: [w, -h],
            tex_coord: [1.0, 0.0],
        },
        TexturedVertex {
            position: [-w, h],
            tex_coord: [0.0, 1.0],
        },
        TexturedVertex {
            position: [w, h],
            tex_coord: [1.0, 1.0],
        },
    ]
}

/// Barycentric weights of `p` in triangle `abc`, or `None` when outside
pub fn barycentric(p: Vector2<f32>, a: Vector2<f32>, b: Vector2<f32>, c: Vector2<f32>) -> Option<Vector3<f32>> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;

    let denom = v0.x * v1.y - v1.x * v0.y;
    if denom.abs() < f32::EPSILON {
        return None;
    }

    let wb = (v2.x * v1.y - v1.x * v2.y) / denom;
    let wc = (v0.x * v2.y - v2.x * v0.y) / denom;
    let wa = 1.0 - wb - wc;

    let eps = 1e-6;
    (wa >= -eps && wb >= -eps && wc >= -eps).then(|| Vector3::new(wa, wb, wc))
}

/// Color the rasterizer interpolates at `p`, or `None` outside the triangle
pub fn interpolate_color(vertices: &[ColorVertex; 3], p: Vector2<f32>) -> Option<[f32; 3]> {
    let [a, b, c] = vertices.map(|v| Vector2::from(v.position));
    let weights = barycentric(p, a, b, c)?;

    let color = vertices
        .iter()
        .zip(weights.iter())
        .fold(Vector3::zeros(), |acc, (vertex, &w)| acc + Vector3::from(vertex.color) * w);

    Some([color.x, color.y, color.z])
}

/// Centroid of a triangle in NDC
pub fn centroid(vertices: &[ColorVertex; 3]) -> Vector2<f32> {
    vertices
        .iter()
        .fold(Vector2::zeros(), |acc, v| acc + Vector2::from(v.position))
        / 3.0
}

/// NDC coordinate of a pixel center within a framebuffer
pub fn pixel_to_ndc(x: u32, y: u32, extent: (u32, u32)) -> Vector2<f32> {
    Vector2::new(
        (x as f32 + 0.5) / extent.0 as f32 * 2.0 - 1.0,
        (y as f32 + 0.5) / extent.1 as f32 * 2.0 - 1.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vertex_sizes_match_attribute_layout() {
        assert_eq!(std::mem::size_of::<ColorVertex>(), 20);
        assert_eq!(std::mem::size_of::<TexturedVertex>(), 16);
    }

    #[test]
    fn test_centroid_is_even_blend() {
        let center = centroid(&TRIANGLE_VERTICES);
        assert_relative_eq!(center.x, 0.0);
        assert_relative_eq!(center.y, 1.0 / 6.0, epsilon = 1e-6);

        let color = interpolate_color(&TRIANGLE_VERTICES, center).unwrap();
        for channel in color {
            assert_relative_eq!(channel, 1.0 / 3.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_vertices_keep_their_color() {
        for vertex in TRIANGLE_VERTICES {
            let color = interpolate_color(&TRIANGLE_VERTICES, Vector2::from(vertex.position)).unwrap();
            for (got, want) in color.iter().zip(vertex.color.iter()) {
                assert_relative_eq!(*got, *want, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_outside_points_are_background() {
        assert!(interpolate_color(&TRIANGLE_VERTICES, Vector2::new(-0.9, -0.9)).is_none());
        assert!(interpolate_color(&TRIANGLE_VERTICES, Vector2::new(0.0, 0.9)).is_none());
    }

    #[test]
    fn test_text_quad_preserves_texture_aspect() {
        let quad = text_quad((512, 256), (800, 800), 0.25);
        let width = quad[1].position[0] - quad[0].position[0];
        let height = quad[2].position[1] - quad[0].position[1];
        assert_relative_eq!(width / height, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_text_quad_stays_in_viewport() {
        let quad = text_quad((512, 64), (200, 800), 1.0);
        for vertex in quad {
            assert!(vertex.position[0].abs() <= 1.0);
            assert!(vertex.position[1].abs() <= 1.0);
        }
    }

    #[test]
    fn test_quad_indices_cover_both_triangles() {
        let quad = text_quad((512, 256), (800, 600), 0.5);
        let area: f32 = QUAD_INDICES
            .chunks(3)
            .map(|tri| {
                let a = Vector2::from(quad[tri[0] as usize].position);
                let b = Vector2::from(quad[tri[1] as usize].position);
                let c = Vector2::from(quad[tri[2] as usize].position);
                ((b - a).perp(&(c - a)) / 2.0).abs()
            })
            .sum();
        let w = quad[1].position[0] - quad[0].position[0];
        let h = quad[2].position[1] - quad[0].position[1];
        assert_relative_eq!(area, w * h, epsilon = 1e-5);
    }

    #[test]
    fn test_pixel_centers() {
        let ndc = pixel_to_ndc(0, 0, (2, 2));
        assert_relative_eq!(ndc.x, -0.5);
        assert_relative_eq!(ndc.y, -0.5);
    }
}
