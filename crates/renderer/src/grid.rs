/// Glyph cells are roughly twice as tall as they are wide.
pub const GLYPH_ASPECT_CORRECTION: f32 = 2.0;

/// Size of the glyph grid laid over the source media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDimensions {
    pub columns: u32,
    pub rows: u32,
}

impl GridDimensions {
    /// Length of the grid diagonal measured in cells.
    pub fn diagonal(&self) -> f32 {
        (self.columns as f32).hypot(self.rows as f32)
    }
}

/// Derives the grid for a source of `source_width`×`source_height` pixels.
///
/// Returns `None` while the source has no intrinsic size yet.
pub fn compute_grid(
    source_width: u32,
    source_height: u32,
    requested_columns: u32,
) -> Option<GridDimensions> {
    if source_width == 0 || source_height == 0 {
        return None;
    }
    let columns = requested_columns.max(1);
    let aspect = source_width as f32 / source_height as f32;
    let rows = (columns as f32 / aspect / GLYPH_ASPECT_CORRECTION).round();
    Some(GridDimensions {
        columns,
        rows: (rows as u32).max(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_four_by_three() {
        let grid = compute_grid(800, 600, 120).unwrap();
        assert_eq!(grid, GridDimensions { columns: 120, rows: 45 });
    }

    #[test]
    fn widescreen_hd() {
        let grid = compute_grid(1920, 1080, 160).unwrap();
        assert_eq!(grid.rows, 45);
    }

    #[test]
    fn portrait_has_more_rows() {
        let grid = compute_grid(1080, 1920, 90).unwrap();
        assert_eq!(grid.rows, 80);
    }

    #[test]
    fn extreme_aspect_clamps_rows() {
        let grid = compute_grid(10_000, 10, 4).unwrap();
        assert_eq!(grid.rows, 1);
    }

    #[test]
    fn zero_columns_treated_as_one() {
        let grid = compute_grid(100, 100, 0).unwrap();
        assert_eq!(grid.columns, 1);
        assert_eq!(grid.rows, 1);
    }

    #[test]
    fn unknown_size_yields_none() {
        assert!(compute_grid(0, 720, 80).is_none());
        assert!(compute_grid(1280, 0, 80).is_none());
    }

    #[test]
    fn diagonal_in_cells() {
        let grid = GridDimensions { columns: 3, rows: 4 };
        assert!((grid.diagonal() - 5.0).abs() < f32::EPSILON);
    }
}
