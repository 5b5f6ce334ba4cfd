//! Tile planning for block-bounded region decode.
//!
//! The source is cut into a grid of blocks no larger than the block limit on
//! either axis. Each block maps to a destination rectangle on the output
//! canvas by scaling its edges with the global `target / source` ratio, so
//! adjacent tiles share edges exactly and the destination rects tile the
//! canvas with no gaps and no overlap.
//!
//! ```text
//!     source 10×7, block limit 4 → 3 columns of 4,4,2 × 2 rows of 4,3
//!
//!     ┌────┬────┬──┐
//!     │ 0  │ 1  │2 │
//!     ├────┼────┼──┤
//!     │ 3  │ 4  │5 │
//!     └────┴────┴──┘
//! ```

use whereat::{At, ErrorAtExt};

use crate::error::ResizeError;
use crate::scale::{Rect, Size};

/// Upper bound on grid size. Protects the plan allocation itself.
const MAX_TILES: u64 = 1 << 24;

/// One source block and where it lands on the canvas.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tile {
    /// Region of the source to decode.
    pub source: Rect,
    /// Offset and size on the output canvas.
    pub dest: Rect,
}

/// Row-major sequence of tiles covering a source and its canvas.
///
/// Fields are read-only: the tiles are only consistent with the sizes they
/// were planned for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TilePlan {
    source: Size,
    target: Size,
    block: Size,
    columns: u32,
    rows: u32,
    tiles: Vec<Tile>,
}

impl TilePlan {
    /// A single tile spanning the whole source and canvas.
    pub fn single(source: Size, target: Size) -> Self {
        Self {
            source,
            target,
            block: source,
            columns: 1,
            rows: 1,
            tiles: vec![Tile {
                source: Rect::from_size(source),
                dest: Rect::from_size(target),
            }],
        }
    }

    /// Source dimensions being tiled.
    pub fn source(&self) -> Size {
        self.source
    }

    /// Output canvas dimensions.
    pub fn target(&self) -> Size {
        self.target
    }

    /// Nominal block dimensions. Trailing tiles may be smaller.
    pub fn block(&self) -> Size {
        self.block
    }

    /// Tiles per row.
    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Tiles per column.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Tile> {
        self.tiles.iter()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Whether the plan decodes the source in one pass.
    pub fn is_single_pass(&self) -> bool {
        self.tiles.len() == 1
    }

    /// Most source pixels any single tile asks the decoder for.
    pub fn max_tile_pixels(&self) -> u64 {
        self.tiles.iter().map(|t| t.source.area()).max().unwrap_or(0)
    }
}

impl<'a> IntoIterator for &'a TilePlan {
    type Item = &'a Tile;
    type IntoIter = core::slice::Iter<'a, Tile>;

    fn into_iter(self) -> Self::IntoIter {
        self.tiles.iter()
    }
}

/// Partition `source` into blocks of at most `block_limit` pixels per axis,
/// mapping each onto a `target`-sized canvas.
pub fn plan_tiles(
    source: Size,
    target: Size,
    block_limit: u32,
) -> Result<TilePlan, At<ResizeError>> {
    if source.is_empty() {
        return Err(ResizeError::InvalidSourceDimensions {
            width: source.width,
            height: source.height,
        }
        .start_at());
    }
    if target.is_empty() {
        return Err(ResizeError::InvalidRequest("target dimensions must be non-zero").start_at());
    }
    if block_limit == 0 {
        return Err(ResizeError::InvalidRequest("block limit must be at least 1").start_at());
    }

    let block = Size::new(
        block_extent(source.width, block_limit),
        block_extent(source.height, block_limit),
    );
    let columns = source.width.div_ceil(block.width);
    let rows = source.height.div_ceil(block.height);
    let count = columns as u64 * rows as u64;
    if count > MAX_TILES {
        return Err(ResizeError::InvalidRequest("block limit yields too many tiles").start_at());
    }

    let mut tiles = Vec::with_capacity(count as usize);
    for row in 0..rows {
        let (sy, sh) = span(row, block.height, source.height);
        let dy = dest_edge(sy, source.height, target.height);
        let dh = dest_edge(sy + sh, source.height, target.height) - dy;
        for column in 0..columns {
            let (sx, sw) = span(column, block.width, source.width);
            let dx = dest_edge(sx, source.width, target.width);
            let dw = dest_edge(sx + sw, source.width, target.width) - dx;
            tiles.push(Tile {
                source: Rect::new(sx, sy, sw, sh),
                dest: Rect::new(dx, dy, dw, dh),
            });
        }
    }

    log::debug!(
        "planned {}x{} tiles of {}x{} for {}x{} -> {}x{}",
        columns,
        rows,
        block.width,
        block.height,
        source.width,
        source.height,
        target.width,
        target.height
    );

    Ok(TilePlan {
        source,
        target,
        block,
        columns,
        rows,
        tiles,
    })
}

/// Block extent along one axis.
///
/// The per-axis tile count starts at 2 and grows until `ceil(extent / count)`
/// is within the limit. The smallest such count is `ceil(extent / limit)`,
/// so it is computed directly.
///
/// The division rounds up, so `count` blocks always span the axis and no
/// sliver tile is left over: 4001 at limit 1024 is 4 blocks of 1001, not
/// 4 blocks of 1000 plus a 1-pixel fifth.
fn block_extent(extent: u32, limit: u32) -> u32 {
    let count = extent.div_ceil(limit).max(2);
    extent.div_ceil(count).max(1)
}

/// Start and length of block `index`, clipped to the source boundary.
fn span(index: u32, block: u32, extent: u32) -> (u32, u32) {
    let start = index * block;
    (start, block.min(extent - start))
}

/// Canvas coordinate of source edge `edge`, rounded to nearest.
///
/// Monotone in `edge` and exact at both ends, which is what makes
/// neighbouring destination rects abut.
fn dest_edge(edge: u32, source: u32, target: u32) -> u32 {
    if edge >= source {
        return target;
    }
    let num = edge as u64 * target as u64 * 2 + source as u64;
    (num / (source as u64 * 2)) as u32
}
