use crate::camera::{self, LookAt, Vector3f};
use crate::error::RayFieldError;

/// One pixel's primary ray.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayRecord {
    pub direction: Vector3f,
    pub origin: Vector3f,
}

/// Every primary ray of a `width` x `height` image, row-major with row 0 at
/// the top.
#[derive(Clone, Debug)]
pub struct RayField {
    width: u32,
    height: u32,
    records: Vec<RayRecord>,
}

impl RayField {
    /// Builds the field for a pinhole camera placed by `look_at`.
    pub fn generate(
        width: u32,
        height: u32,
        fov_degrees: f32,
        look_at: &LookAt,
    ) -> Result<Self, RayFieldError> {
        let stride = 3;
        let len = width as usize * height as usize * stride;
        let mut directions = vec![0.0; len];
        let mut origins = vec![0.0; len];

        camera::generate_perspective(&mut directions, stride, fov_degrees, width, height)?;
        camera::apply_look_at_in_place(&mut origins, &mut directions, stride, width, height, look_at)?;

        let records = directions
            .chunks_exact(stride)
            .zip(origins.chunks_exact(stride))
            .map(|(d, o)| RayRecord {
                direction: Vector3f::new(d[0], d[1], d[2]),
                origin: Vector3f::new(o[0], o[1], o[2]),
            })
            .collect();

        Ok(Self {
            width,
            height,
            records,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, x: u32, y: u32) -> Option<&RayRecord> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.records.get((y * self.width + x) as usize)
    }

    /// Splits the field into the two parallel flat buffers the device reads,
    /// `(directions, origins)`, each entry taking `stride` scalars.
    ///
    /// Direction padding is `0.0`, origin padding `1.0`.
    pub fn flatten(&self, stride: usize) -> Result<(Vec<f32>, Vec<f32>), RayFieldError> {
        let needed = camera::check_layout(usize::MAX, stride, self.width, self.height)?;
        let mut directions = Vec::with_capacity(needed);
        let mut origins = Vec::with_capacity(needed);

        for record in &self.records {
            directions.extend_from_slice(record.direction.as_slice());
            directions.extend(std::iter::repeat(0.0).take(stride - 3));
            origins.extend_from_slice(record.origin.as_slice());
            origins.extend(std::iter::repeat(1.0).take(stride - 3));
        }
        Ok((directions, origins))
    }
}
