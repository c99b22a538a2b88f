//! Binary PGM (`P5`) image I/O for grids.
//!
//! Images are 8-bit greyscale with a maxval of 255: a byte of 255 is a live
//! cell, 0 a dead one, and any other value is rejected. Input images live
//! at `{images_dir}/{H}x{W}.pgm`, output images are written to
//! `{out_dir}/{H}x{W}x{turn}.pgm`.
//!
//! Reads and writes are synchronous, so once [`GridSink::write_grid`]
//! returns the image is on disk.

use std::path::{Path, PathBuf};

use gol_core::config::IoConfig;
use gol_core::grid::{Grid, GridError};
use gol_types::Params;
use tracing::debug;

/// Errors raised while reading or writing images.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The file could not be read or written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not a binary PGM image this engine understands.
    #[error("malformed image {}: {reason}", path.display())]
    Format {
        /// The file involved.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// The image does not have the requested dimensions.
    #[error("image {} is {found:?}, expected {expected:?}", path.display())]
    Dimensions {
        /// The file involved.
        path: PathBuf,
        /// `(width, height)` that was requested.
        expected: (usize, usize),
        /// `(width, height)` found in the header.
        found: (usize, usize),
    },

    /// The pixel data is not a valid grid.
    #[error("invalid grid in {}: {source}", path.display())]
    Grid {
        /// The file involved.
        path: PathBuf,
        /// The underlying grid error.
        source: GridError,
    },
}

/// Supplies the initial grid of a run.
pub trait GridSource {
    /// Read the input grid for `params`.
    fn read_grid(&self, params: &Params) -> Result<Grid, IoError>;
}

/// Receives grids to persist.
pub trait GridSink {
    /// Write `grid` under `name` (a file stem such as `512x512x100`).
    /// Returns the path written.
    fn write_grid(&self, name: &str, grid: &Grid) -> Result<PathBuf, IoError>;
}

/// Reads and writes PGM files in the configured directories.
#[derive(Debug, Clone)]
pub struct PgmStore {
    images_dir: PathBuf,
    out_dir: PathBuf,
}

impl PgmStore {
    /// Create a store over the directories in `config`.
    pub fn new(config: &IoConfig) -> Self {
        Self {
            images_dir: PathBuf::from(&config.images_dir),
            out_dir: PathBuf::from(&config.out_dir),
        }
    }

    /// Path of the input image for `params`.
    pub fn input_path(&self, params: &Params) -> PathBuf {
        self.images_dir.join(format!("{}.pgm", params.input_name()))
    }

    /// Path of the output image named `name`.
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.out_dir.join(format!("{name}.pgm"))
    }
}

impl GridSource for PgmStore {
    fn read_grid(&self, params: &Params) -> Result<Grid, IoError> {
        let path = self.input_path(params);
        let bytes = std::fs::read(&path).map_err(|source| IoError::Io {
            path: path.clone(),
            source,
        })?;
        let grid = decode(&path, &bytes)?;
        let found = (grid.width(), grid.height());
        if found != (params.width, params.height) {
            return Err(IoError::Dimensions {
                path,
                expected: (params.width, params.height),
                found,
            });
        }
        debug!(path = %path.display(), alive = grid.alive_count(), "Image read");
        Ok(grid)
    }
}

impl GridSink for PgmStore {
    fn write_grid(&self, name: &str, grid: &Grid) -> Result<PathBuf, IoError> {
        let path = self.output_path(name);
        std::fs::create_dir_all(&self.out_dir).map_err(|source| IoError::Io {
            path: self.out_dir.clone(),
            source,
        })?;
        std::fs::write(&path, encode(grid)).map_err(|source| IoError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Image written");
        Ok(path)
    }
}

/// Encode a grid as a binary PGM image.
pub fn encode(grid: &Grid) -> Vec<u8> {
    let mut out = format!("P5\n{} {}\n255\n", grid.width(), grid.height()).into_bytes();
    out.extend(grid.to_bytes());
    out
}

/// Decode a binary PGM image into a grid. `path` is only used in errors.
pub fn decode(path: &Path, bytes: &[u8]) -> Result<Grid, IoError> {
    let malformed = |reason: &str| IoError::Format {
        path: path.to_path_buf(),
        reason: reason.to_owned(),
    };

    let mut header = Header { bytes, pos: 0 };
    if header.token() != Some(b"P5".as_slice()) {
        return Err(malformed("missing P5 magic number"));
    }
    let width = header.number().ok_or_else(|| malformed("bad width"))?;
    let height = header.number().ok_or_else(|| malformed("bad height"))?;
    let maxval = header.number().ok_or_else(|| malformed("bad maxval"))?;
    if maxval != 255 {
        return Err(malformed("maxval must be 255"));
    }

    // Exactly one whitespace byte separates the header from the pixels.
    let pixels = bytes
        .get(header.pos.saturating_add(1)..)
        .ok_or_else(|| malformed("missing pixel data"))?;
    Grid::from_bytes(width, height, pixels).map_err(|source| IoError::Grid {
        path: path.to_path_buf(),
        source,
    })
}

/// Cursor over the whitespace-separated header tokens of a PGM file.
struct Header<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Header<'a> {
    /// The next token, skipping whitespace and `#` comments.
    fn token(&mut self) -> Option<&'a [u8]> {
        loop {
            match self.bytes.get(self.pos)? {
                b'#' => {
                    while self.bytes.get(self.pos).is_some_and(|&b| b != b'\n') {
                        self.pos = self.pos.saturating_add(1);
                    }
                }
                b if b.is_ascii_whitespace() => self.pos = self.pos.saturating_add(1),
                _ => break,
            }
        }
        let start = self.pos;
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| !b.is_ascii_whitespace())
        {
            self.pos = self.pos.saturating_add(1);
        }
        self.bytes.get(start..self.pos)
    }

    fn number(&mut self) -> Option<usize> {
        std::str::from_utf8(self.token()?).ok()?.parse().ok()
    }
}
