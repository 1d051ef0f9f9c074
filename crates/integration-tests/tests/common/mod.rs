//! Shared fixtures for cross-crate end-to-end scenario tests.

use nalgebra::{Rotation3, Vector3};

/// A 5x5x5 grid of points spaced 0.1m apart, offset by `offset`. Gives
/// registration enough structure to converge on a unique transform.
pub fn cube_points(offset: [f64; 3]) -> Vec<[f32; 3]> {
    let mut points = Vec::with_capacity(125);
    for x in 0..5 {
        for y in 0..5 {
            for z in 0..5 {
                points.push([
                    x as f32 * 0.1 + offset[0] as f32,
                    y as f32 * 0.1 + offset[1] as f32,
                    z as f32 * 0.1 + offset[2] as f32,
                ]);
            }
        }
    }
    points
}

/// Rotates `points` about the z axis by `degrees`, simulating how the same
/// physical scene appears in the frame of a sensor mounted at that yaw.
pub fn rotate_z_degrees(points: &[[f32; 3]], degrees: f64) -> Vec<[f32; 3]> {
    let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), degrees.to_radians());
    points
        .iter()
        .map(|&[x, y, z]| {
            let rotated = rotation * Vector3::new(x as f64, y as f64, z as f64);
            [rotated.x as f32, rotated.y as f32, rotated.z as f32]
        })
        .collect()
}
