use nalgebra::Vector3;

use crate::error::RayFieldError;

pub type Vector3f = Vector3<f32>;

/// Pinhole camera placement.
///
/// `up` must not be collinear with `center - eye`; the basis built from a
/// collinear pair is undefined and nothing here checks for it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LookAt {
    pub eye: Vector3f,
    pub center: Vector3f,
    pub up: Vector3f,
}

impl Default for LookAt {
    fn default() -> Self {
        Self {
            eye: Vector3f::zeros(),
            center: -Vector3f::z(),
            up: Vector3f::y(),
        }
    }
}

impl LookAt {
    pub fn new(eye: Vector3f, center: Vector3f, up: Vector3f) -> Self {
        Self { eye, center, up }
    }

    pub fn basis(&self) -> CameraBasis {
        let forward = (self.center - self.eye).normalize();
        let right = forward.cross(&self.up).normalize();
        let up = right.cross(&forward);
        CameraBasis { right, up, forward }
    }
}

/// Orthonormal camera frame in world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraBasis {
    pub right: Vector3f,
    pub up: Vector3f,
    pub forward: Vector3f,
}

impl CameraBasis {
    /// Camera space looks down -Z with +Y up.
    pub fn to_world(&self, v: &Vector3f) -> Vector3f {
        self.right * v.x + self.up * v.y - self.forward * v.z
    }
}

pub(crate) fn check_layout(
    len: usize,
    stride: usize,
    width: u32,
    height: u32,
) -> Result<usize, RayFieldError> {
    if width == 0 || height == 0 {
        return Err(RayFieldError::ZeroDimensions { width, height });
    }
    if !(3..=4).contains(&stride) {
        return Err(RayFieldError::BadStride(stride));
    }
    let needed = width as usize * height as usize * stride;
    if len < needed {
        return Err(RayFieldError::BufferTooSmall {
            needed,
            capacity: len,
        });
    }
    Ok(needed)
}

/// Fills `buffer` with one normalized camera-space direction per pixel.
///
/// Entries are laid out row-major, row 0 being the top row of the image, each
/// taking `stride` scalars. `fov_degrees` is the vertical field of view;
/// the horizontal extent follows from `width / height`.
pub fn generate_perspective(
    buffer: &mut [f32],
    stride: usize,
    fov_degrees: f32,
    width: u32,
    height: u32,
) -> Result<(), RayFieldError> {
    check_layout(buffer.len(), stride, width, height)?;

    let aspect = width as f32 / height as f32;
    let half_height = (fov_degrees.to_radians() * 0.5).tan();
    let half_width = half_height * aspect;

    let entries = buffer.chunks_exact_mut(stride);
    for (index, entry) in entries.take(width as usize * height as usize).enumerate() {
        let x = (index % width as usize) as f32;
        let y = (index / width as usize) as f32;

        let ndc_x = 2.0 * (x + 0.5) / width as f32 - 1.0;
        let ndc_y = 1.0 - 2.0 * (y + 0.5) / height as f32;

        let dir = Vector3f::new(ndc_x * half_width, ndc_y * half_height, -1.0).normalize();
        entry[..3].copy_from_slice(dir.as_slice());
        entry[3..].fill(0.0);
    }
    Ok(())
}

/// Moves every direction of `in_directions` into world space and writes
/// `eye` into every origin entry.
///
/// Origins take the same `stride` as directions; a fourth scalar is set to
/// `1.0`.
pub fn apply_look_at(
    origins: &mut [f32],
    out_directions: &mut [f32],
    in_directions: &[f32],
    stride: usize,
    width: u32,
    height: u32,
    look_at: &LookAt,
) -> Result<(), RayFieldError> {
    let needed = check_layout(in_directions.len(), stride, width, height)?;
    check_layout(out_directions.len(), stride, width, height)?;
    check_layout(origins.len(), stride, width, height)?;

    let basis = look_at.basis();
    let src = in_directions[..needed].chunks_exact(stride);
    let dst = out_directions[..needed].chunks_exact_mut(stride);
    for (input, output) in src.zip(dst) {
        let world = basis.to_world(&Vector3f::new(input[0], input[1], input[2]));
        output[..3].copy_from_slice(world.as_slice());
        output[3..].copy_from_slice(&input[3..]);
    }

    fill_origins(&mut origins[..needed], stride, &look_at.eye);
    Ok(())
}

/// Same as [`apply_look_at`], rewriting `directions` in place.
pub fn apply_look_at_in_place(
    origins: &mut [f32],
    directions: &mut [f32],
    stride: usize,
    width: u32,
    height: u32,
    look_at: &LookAt,
) -> Result<(), RayFieldError> {
    let needed = check_layout(directions.len(), stride, width, height)?;
    check_layout(origins.len(), stride, width, height)?;

    let basis = look_at.basis();
    for entry in directions[..needed].chunks_exact_mut(stride) {
        let world = basis.to_world(&Vector3f::new(entry[0], entry[1], entry[2]));
        entry[..3].copy_from_slice(world.as_slice());
    }

    fill_origins(&mut origins[..needed], stride, &look_at.eye);
    Ok(())
}

fn fill_origins(origins: &mut [f32], stride: usize, eye: &Vector3f) {
    for entry in origins.chunks_exact_mut(stride) {
        entry[..3].copy_from_slice(eye.as_slice());
        entry[3..].fill(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPS: f32 = 1e-5;

    fn generated(stride: usize, fov: f32, width: u32, height: u32) -> Vec<f32> {
        let mut buf = vec![f32::NAN; width as usize * height as usize * stride];
        generate_perspective(&mut buf, stride, fov, width, height).unwrap();
        buf
    }

    #[test]
    fn directions_are_unit_length() {
        for &(w, h, fov) in &[(640, 480, 30.0), (7, 3, 1.0), (1, 1, 90.0), (5, 11, 179.0)] {
            for stride in [3, 4] {
                let buf = generated(stride, fov, w, h);
                for entry in buf.chunks_exact(stride) {
                    let len = Vector3f::new(entry[0], entry[1], entry[2]).norm();
                    assert_relative_eq!(len, 1.0, epsilon = EPS);
                }
            }
        }
    }

    #[test]
    fn center_pixel_points_forward() {
        let (w, h) = (9u32, 5u32);
        let buf = generated(4, 45.0, w, h);
        let center = ((h / 2) * w + w / 2) as usize * 4;
        assert_relative_eq!(buf[center], 0.0, epsilon = EPS);
        assert_relative_eq!(buf[center + 1], 0.0, epsilon = EPS);
        assert_relative_eq!(buf[center + 2], -1.0, epsilon = EPS);
    }

    #[test]
    fn top_left_pixel_points_up_and_left() {
        let buf = generated(3, 30.0, 640, 480);
        assert!(buf[0] < 0.0);
        assert!(buf[1] > 0.0);
    }

    #[test]
    fn pixel_centres_span_the_vertical_fov() {
        let fov: f32 = 60.0;
        let (w, h) = (1u32, 2u32);
        let buf = generated(3, fov, w, h);
        let half = (fov.to_radians() * 0.5).tan();
        // Pixel centres sit at +/- half the vertical extent.
        let expected = Vector3f::new(0.0, half * 0.5, -1.0).normalize();
        assert_relative_eq!(buf[1], expected.y, epsilon = EPS);
        assert_relative_eq!(buf[4], -expected.y, epsilon = EPS);
    }

    #[test]
    fn every_entry_is_overwritten() {
        let buf = generated(4, 30.0, 16, 8);
        assert!(buf.iter().all(|v| !v.is_nan()));
        assert!(buf.chunks_exact(4).all(|e| e[3] == 0.0));
    }

    #[test]
    fn rejects_zero_dimensions() {
        let mut buf = vec![0.0; 64];
        assert_eq!(
            generate_perspective(&mut buf, 4, 30.0, 0, 4),
            Err(RayFieldError::ZeroDimensions { width: 0, height: 4 })
        );
        assert!(generate_perspective(&mut buf, 4, 30.0, 4, 0).is_err());
    }

    #[test]
    fn rejects_undersized_buffer() {
        let mut buf = vec![0.0; 4 * 4 * 4 - 1];
        assert_eq!(
            generate_perspective(&mut buf, 4, 30.0, 4, 4),
            Err(RayFieldError::BufferTooSmall {
                needed: 64,
                capacity: 63
            })
        );
        // Untouched on failure.
        assert!(buf.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn rejects_bad_stride() {
        let mut buf = vec![0.0; 128];
        assert_eq!(
            generate_perspective(&mut buf, 2, 30.0, 4, 4),
            Err(RayFieldError::BadStride(2))
        );
    }

    #[test]
    fn oversized_buffer_tail_is_left_alone() {
        let mut buf = vec![7.0; 2 * 2 * 3 + 5];
        generate_perspective(&mut buf, 3, 30.0, 2, 2).unwrap();
        assert!(buf[12..].iter().all(|&v| v == 7.0));
    }

    #[test]
    fn default_look_at_is_identity() {
        let (w, h) = (8u32, 6u32);
        let dirs = generated(4, 30.0, w, h);
        let mut out = vec![f32::NAN; dirs.len()];
        let mut origins = vec![f32::NAN; dirs.len()];
        apply_look_at(&mut origins, &mut out, &dirs, 4, w, h, &LookAt::default()).unwrap();

        for (a, b) in dirs.iter().zip(out.iter()) {
            assert_relative_eq!(*a, *b, epsilon = EPS);
        }
        for entry in origins.chunks_exact(4) {
            assert_eq!(&entry[..3], &[0.0, 0.0, 0.0]);
            assert_eq!(entry[3], 1.0);
        }
    }

    #[test]
    fn look_at_rejects_undersized_output() {
        let (w, h) = (4u32, 4u32);
        let dirs = generated(4, 30.0, w, h);
        let mut out = vec![0.0; dirs.len() - 4];
        let mut origins = vec![0.0; dirs.len()];
        assert_eq!(
            apply_look_at(&mut origins, &mut out, &dirs, 4, w, h, &LookAt::default()),
            Err(RayFieldError::BufferTooSmall {
                needed: 64,
                capacity: 60
            })
        );
        assert!(origins.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn look_at_rejects_undersized_origins() {
        let (w, h) = (4u32, 4u32);
        let dirs = generated(3, 30.0, w, h);
        let mut out = vec![0.0; dirs.len()];
        let mut origins = vec![0.0; dirs.len() - 1];
        assert_eq!(
            apply_look_at(&mut origins, &mut out, &dirs, 3, w, h, &LookAt::default()),
            Err(RayFieldError::BufferTooSmall {
                needed: 48,
                capacity: 47
            })
        );
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn in_place_matches_separate_output() {
        let (w, h) = (4u32, 4u32);
        let look_at = LookAt::new(
            Vector3f::new(1.0, 2.0, 3.0),
            Vector3f::new(-2.0, 0.5, 0.0),
            Vector3f::y(),
        );
        let dirs = generated(3, 50.0, w, h);
        let mut separate = vec![0.0; dirs.len()];
        let mut origins_a = vec![0.0; dirs.len()];
        apply_look_at(&mut origins_a, &mut separate, &dirs, 3, w, h, &look_at).unwrap();

        let mut in_place = dirs.clone();
        let mut origins_b = vec![0.0; dirs.len()];
        apply_look_at_in_place(&mut origins_b, &mut in_place, 3, w, h, &look_at).unwrap();

        assert_eq!(separate, in_place);
        assert_eq!(origins_a, origins_b);
        assert_eq!(&origins_a[..3], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn looking_down_maps_forward_to_negative_y() {
        let look_at = LookAt::new(
            Vector3f::new(0.0, 10.0, 0.0),
            Vector3f::zeros(),
            -Vector3f::z(),
        );
        let basis = look_at.basis();
        let world = basis.to_world(&-Vector3f::z());
        assert_relative_eq!(world, -Vector3f::y(), epsilon = EPS);
        assert_relative_eq!(basis.right.dot(&basis.up), 0.0, epsilon = EPS);
        assert_relative_eq!(basis.up.norm(), 1.0, epsilon = EPS);
    }

    #[test]
    fn look_at_preserves_unit_length() {
        let look_at = LookAt::new(
            Vector3f::new(3.0, -1.0, 2.0),
            Vector3f::new(0.0, 4.0, -7.0),
            Vector3f::new(0.2, 1.0, 0.1),
        );
        let mut dirs = generated(4, 75.0, 12, 9);
        let mut origins = vec![0.0; dirs.len()];
        apply_look_at_in_place(&mut origins, &mut dirs, 4, 12, 9, &look_at).unwrap();
        for entry in dirs.chunks_exact(4) {
            let len = Vector3f::new(entry[0], entry[1], entry[2]).norm();
            assert_relative_eq!(len, 1.0, epsilon = EPS);
        }
    }
}
