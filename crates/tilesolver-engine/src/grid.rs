use image::{imageops, RgbImage};
use tilesolver_contracts::errors::SolveError;

/// Grid layout of a challenge. Only 3×3 and 4×4 grids exist; any other tile
/// count is a detection error, so the dimension is unrepresentable outside
/// these two cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridDimension {
    Three,
    Four,
}

impl GridDimension {
    /// Derives the dimension from the adapter's tile count: 9 → 3×3,
    /// 16 → 4×4, anything else is terminal.
    pub fn from_tile_count(tile_count: usize) -> Result<Self, SolveError> {
        match tile_count {
            9 => Ok(GridDimension::Three),
            16 => Ok(GridDimension::Four),
            other => Err(SolveError::GridDetection { tile_count: other }),
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            GridDimension::Three => 3,
            GridDimension::Four => 4,
        }
    }

    pub fn tile_count(&self) -> usize {
        (self.size() * self.size()) as usize
    }

    /// Row-major position → (row, col).
    pub fn row_col(&self, position: usize) -> (u32, u32) {
        let size = self.size() as usize;
        ((position / size) as u32, (position % size) as u32)
    }
}

/// One grid cell, owned by its round. `matched` starts false and is set
/// exactly once by the classifier.
#[derive(Debug, Clone)]
pub struct TileResult {
    pub position: usize,
    pub image: RgbImage,
    pub matched: bool,
}

/// One detect→capture→classify→submit cycle. Disposable: nothing survives
/// a round except the loop counter.
#[derive(Debug)]
pub struct Round {
    pub index: u32,
    pub target_label: String,
    pub grid_dimension: GridDimension,
    pub tiles: Vec<TileResult>,
}

impl Round {
    pub fn matched_positions(&self) -> Vec<usize> {
        self.tiles
            .iter()
            .filter(|tile| tile.matched)
            .map(|tile| tile.position)
            .collect()
    }
}

/// Cuts the captured grid into `dimension²` equal tiles, row-major.
///
/// Tile size is `floor(W/dim) × floor(H/dim)`; any remainder strip on the
/// right/bottom edge is dropped, never padded. Deterministic for identical
/// inputs.
pub fn segment(grid_image: &RgbImage, dimension: GridDimension) -> Result<Vec<TileResult>, SolveError> {
    let size = dimension.size();
    let (width, height) = grid_image.dimensions();
    if width == 0 || height == 0 {
        return Err(SolveError::InvalidGrid {
            reason: format!("grid image has zero area ({width}x{height})"),
        });
    }
    let tile_width = width / size;
    let tile_height = height / size;
    if tile_width == 0 || tile_height == 0 {
        return Err(SolveError::InvalidGrid {
            reason: format!("grid image {width}x{height} too small for a {size}x{size} grid"),
        });
    }

    let mut tiles = Vec::with_capacity(dimension.tile_count());
    for position in 0..dimension.tile_count() {
        let (row, col) = dimension.row_col(position);
        let tile = imageops::crop_imm(
            grid_image,
            col * tile_width,
            row * tile_height,
            tile_width,
            tile_height,
        )
        .to_image();
        tiles.push(TileResult {
            position,
            image: tile,
            matched: false,
        });
    }
    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn checkered(width: u32, height: u32, dimension: GridDimension) -> RgbImage {
        let size = dimension.size();
        let tile_w = width / size;
        let tile_h = height / size;
        RgbImage::from_fn(width, height, |x, y| {
            let col = (x / tile_w).min(size - 1) as u8;
            let row = (y / tile_h).min(size - 1) as u8;
            Rgb([row * size as u8 + col, 0, 0])
        })
    }

    #[test]
    fn dimension_from_tile_count() {
        assert_eq!(GridDimension::from_tile_count(9).unwrap(), GridDimension::Three);
        assert_eq!(GridDimension::from_tile_count(16).unwrap(), GridDimension::Four);
        let err = GridDimension::from_tile_count(12).unwrap_err();
        assert!(matches!(err, SolveError::GridDetection { tile_count: 12 }));
    }

    #[test]
    fn segment_three_by_three_is_row_major() -> anyhow::Result<()> {
        let grid = checkered(300, 300, GridDimension::Three);
        let tiles = segment(&grid, GridDimension::Three)?;
        assert_eq!(tiles.len(), 9);
        for (idx, tile) in tiles.iter().enumerate() {
            assert_eq!(tile.position, idx);
            assert_eq!(tile.image.dimensions(), (100, 100));
            assert!(!tile.matched);
            // Every pixel of tile k carries the marker value k.
            assert!(tile.image.pixels().all(|px| px.0[0] == idx as u8));
        }
        Ok(())
    }

    #[test]
    fn segment_four_by_four_returns_sixteen_tiles() -> anyhow::Result<()> {
        let grid = checkered(400, 400, GridDimension::Four);
        let tiles = segment(&grid, GridDimension::Four)?;
        assert_eq!(tiles.len(), 16);
        assert_eq!(tiles[5].image.dimensions(), (100, 100));
        assert!(tiles[15].image.pixels().all(|px| px.0[0] == 15));
        Ok(())
    }

    #[test]
    fn segment_drops_the_remainder_strip() -> anyhow::Result<()> {
        // 10/3 = 3: tiles are 3x3, the last column and row of pixels unused.
        let grid = RgbImage::from_pixel(10, 10, Rgb([7, 7, 7]));
        let tiles = segment(&grid, GridDimension::Three)?;
        assert_eq!(tiles.len(), 9);
        for tile in &tiles {
            assert_eq!(tile.image.dimensions(), (3, 3));
        }
        Ok(())
    }

    #[test]
    fn tile_bounds_follow_the_row_major_formula() -> anyhow::Result<()> {
        let grid = RgbImage::from_fn(120, 90, |x, y| Rgb([x as u8, y as u8, 0]));
        let tiles = segment(&grid, GridDimension::Three)?;
        // Tile 5 is row 1, col 2: x ∈ [80, 120), y ∈ [30, 60).
        let tile = &tiles[5];
        assert_eq!(tile.image.dimensions(), (40, 30));
        assert_eq!(tile.image.get_pixel(0, 0), grid.get_pixel(80, 30));
        assert_eq!(tile.image.get_pixel(39, 29), grid.get_pixel(119, 59));
        Ok(())
    }

    #[test]
    fn zero_area_image_is_invalid() {
        let grid = RgbImage::new(0, 0);
        let err = segment(&grid, GridDimension::Three).unwrap_err();
        assert!(matches!(err, SolveError::InvalidGrid { .. }));
    }

    #[test]
    fn undersized_image_is_invalid() {
        let grid = RgbImage::from_pixel(2, 300, Rgb([0, 0, 0]));
        let err = segment(&grid, GridDimension::Four).unwrap_err();
        assert!(matches!(err, SolveError::InvalidGrid { .. }));
    }

    #[test]
    fn round_collects_matched_positions_in_order() {
        let grid = RgbImage::from_pixel(30, 30, Rgb([1, 2, 3]));
        let mut tiles = segment(&grid, GridDimension::Three).unwrap();
        tiles[2].matched = true;
        tiles[5].matched = true;
        let round = Round {
            index: 1,
            target_label: "crosswalk".to_string(),
            grid_dimension: GridDimension::Three,
            tiles,
        };
        assert_eq!(round.matched_positions(), vec![2, 5]);
    }
}
