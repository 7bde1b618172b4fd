use crate::error::{Error, Result};

/// Work-group counts covering an image exactly.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DispatchGrid {
    pub groups_x: u32,
    pub groups_y: u32,
    pub groups_z: u32,
    pub work_group_size: u32,
}

impl DispatchGrid {
    /// Partial work-groups are not supported: both dimensions must be
    /// multiples of `work_group_size`.
    pub fn new(width: u32, height: u32, work_group_size: u32) -> Result<Self> {
        if work_group_size == 0 {
            return Err(Error::Dispatch("work-group size must be non-zero".into()));
        }
        if width % work_group_size != 0 || height % work_group_size != 0 {
            return Err(Error::Dispatch(format!(
                "{width}x{height} leaves remainder pixels with {work_group_size}x{work_group_size} work-groups"
            )));
        }
        Ok(Self {
            groups_x: width / work_group_size,
            groups_y: height / work_group_size,
            groups_z: 1,
            work_group_size,
        })
    }

    pub fn covered(&self) -> (u32, u32) {
        (
            self.groups_x * self.work_group_size,
            self.groups_y * self.work_group_size,
        )
    }

    pub fn invocations(&self) -> u64 {
        let size = self.work_group_size as u64;
        self.groups_x as u64 * self.groups_y as u64 * self.groups_z as u64 * size * size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_image_grid() {
        let grid = DispatchGrid::new(640, 480, 16).unwrap();
        assert_eq!((grid.groups_x, grid.groups_y, grid.groups_z), (40, 30, 1));
        assert_eq!(grid.covered(), (640, 480));
        assert_eq!(grid.groups_x * grid.groups_y, 1200);
        assert_eq!(grid.invocations(), 640 * 480);
    }

    #[test]
    fn remainder_is_rejected() {
        assert!(matches!(
            DispatchGrid::new(641, 480, 16),
            Err(Error::Dispatch(_))
        ));
        assert!(DispatchGrid::new(640, 490, 16).is_err());
    }

    #[test]
    fn zero_group_size_is_rejected() {
        assert!(DispatchGrid::new(640, 480, 0).is_err());
    }
}
