//! Tiled views over dense matrices and vectors.
//!
//! A grid slot holds a *version handle*, not a tile: algorithms read the
//! current handle with [`TiledMatrix::get`] and publish a new version
//! with [`TiledMatrix::set`]. Consumers that captured an older handle
//! keep seeing the version they depended on.

use covar_core::{CovarError, Result, Tile};
use covar_sched::Handle;

pub type TileHandle = Handle<Tile>;
pub type BlockHandle = Handle<Vec<f64>>;

/// Grid of tile version handles with a uniform tile shape.
pub struct TiledMatrix {
    tiles: Vec<TileHandle>,
    grid_rows: usize,
    grid_cols: usize,
    tile_rows: usize,
    tile_cols: usize,
}

impl TiledMatrix {
    /// Partition a dense row-major `rows x cols` buffer into a
    /// `grid_rows x grid_cols` grid of equally shaped tiles.
    pub fn from_dense(
        data: &[f64],
        rows: usize,
        cols: usize,
        grid_rows: usize,
        grid_cols: usize,
    ) -> Result<Self> {
        if grid_rows == 0 || grid_cols == 0 || rows % grid_rows != 0 || cols % grid_cols != 0 {
            return Err(CovarError::InvalidArgument(format!(
                "{rows}x{cols} matrix does not split into a {grid_rows}x{grid_cols} grid"
            )));
        }
        if data.len() != rows * cols {
            return Err(CovarError::InvalidArgument(format!(
                "dense buffer holds {} values, shape {rows}x{cols} needs {}",
                data.len(),
                rows * cols
            )));
        }
        let tile_rows = rows / grid_rows;
        let tile_cols = cols / grid_cols;
        let mut tiles = Vec::with_capacity(grid_rows * grid_cols);
        for tr in 0..grid_rows {
            for tc in 0..grid_cols {
                let mut buf = Vec::with_capacity(tile_rows * tile_cols);
                for i in 0..tile_rows {
                    let row = tr * tile_rows + i;
                    let start = row * cols + tc * tile_cols;
                    buf.extend_from_slice(&data[start..start + tile_cols]);
                }
                tiles.push(Handle::ready(Tile::from_vec(buf, tile_rows, tile_cols)?));
            }
        }
        Ok(Self {
            tiles,
            grid_rows,
            grid_cols,
            tile_rows,
            tile_cols,
        })
    }

    /// Square matrix split into `n_tiles x n_tiles` square tiles.
    pub fn from_dense_square(data: &[f64], n: usize, n_tiles: usize) -> Result<Self> {
        Self::from_dense(data, n, n, n_tiles, n_tiles)
    }

    /// Grid of zero tiles.
    pub fn zeros(grid_rows: usize, grid_cols: usize, tile_rows: usize, tile_cols: usize) -> Self {
        let tiles = (0..grid_rows * grid_cols)
            .map(|_| Handle::ready(Tile::zeros(tile_rows, tile_cols)))
            .collect();
        Self {
            tiles,
            grid_rows,
            grid_cols,
            tile_rows,
            tile_cols,
        }
    }

    pub fn grid_rows(&self) -> usize {
        self.grid_rows
    }

    pub fn grid_cols(&self) -> usize {
        self.grid_cols
    }

    pub fn tile_rows(&self) -> usize {
        self.tile_rows
    }

    pub fn tile_cols(&self) -> usize {
        self.tile_cols
    }

    pub fn rows(&self) -> usize {
        self.grid_rows * self.tile_rows
    }

    pub fn cols(&self) -> usize {
        self.grid_cols * self.tile_cols
    }

    pub fn is_square_grid(&self) -> bool {
        self.grid_rows == self.grid_cols && self.tile_rows == self.tile_cols
    }

    /// Current version handle of slot (r, c).
    pub fn get(&self, r: usize, c: usize) -> TileHandle {
        self.tiles[r * self.grid_cols + c].clone()
    }

    /// Publish a new version into slot (r, c).
    pub fn set(&mut self, r: usize, c: usize, handle: TileHandle) {
        self.tiles[r * self.grid_cols + c] = handle;
    }

    /// Gather the grid back into a dense row-major buffer, blocking on
    /// every tile. Poisoned tiles surface their original error.
    pub fn to_dense(&self) -> Result<Vec<f64>> {
        let cols = self.cols();
        let mut out = vec![0.0; self.rows() * cols];
        for tr in 0..self.grid_rows {
            for tc in 0..self.grid_cols {
                let tile = self.get(tr, tc).get()?;
                if tile.rows() != self.tile_rows || tile.cols() != self.tile_cols {
                    return Err(CovarError::GridMismatch {
                        expected: (self.tile_rows, self.tile_cols),
                        got: (tile.rows(), tile.cols()),
                    });
                }
                for i in 0..self.tile_rows {
                    let row = tr * self.tile_rows + i;
                    let start = row * cols + tc * self.tile_cols;
                    out[start..start + self.tile_cols]
                        .copy_from_slice(&tile.as_slice()[i * self.tile_cols..(i + 1) * self.tile_cols]);
                }
            }
        }
        Ok(out)
    }
}

/// Blocked vector: one `Vec<f64>` version handle per tile row.
pub struct TiledVector {
    blocks: Vec<BlockHandle>,
    n_tiles: usize,
    block_len: usize,
}

impl TiledVector {
    pub fn from_dense(data: &[f64], n_tiles: usize) -> Result<Self> {
        if n_tiles == 0 || data.len() % n_tiles != 0 {
            return Err(CovarError::InvalidArgument(format!(
                "vector of length {} does not split into {n_tiles} blocks",
                data.len()
            )));
        }
        let block_len = data.len() / n_tiles;
        let blocks = data
            .chunks(block_len)
            .map(|c| Handle::ready(c.to_vec()))
            .collect();
        Ok(Self {
            blocks,
            n_tiles,
            block_len,
        })
    }

    pub fn zeros(n_tiles: usize, block_len: usize) -> Self {
        let blocks = (0..n_tiles)
            .map(|_| Handle::ready(vec![0.0; block_len]))
            .collect();
        Self {
            blocks,
            n_tiles,
            block_len,
        }
    }

    pub fn n_tiles(&self) -> usize {
        self.n_tiles
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    pub fn get(&self, k: usize) -> BlockHandle {
        self.blocks[k].clone()
    }

    pub fn set(&mut self, k: usize, handle: BlockHandle) {
        self.blocks[k] = handle;
    }

    /// Gather into one dense vector, blocking on every block.
    pub fn to_dense(&self) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.n_tiles * self.block_len);
        for k in 0..self.n_tiles {
            let block = self.get(k).get()?;
            if block.len() != self.block_len {
                return Err(CovarError::GridMismatch {
                    expected: (self.block_len, 1),
                    got: (block.len(), 1),
                });
            }
            out.extend_from_slice(&block);
        }
        Ok(out)
    }
}
