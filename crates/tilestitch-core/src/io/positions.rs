//! Text formats for tile positions and pairwise displacements.
//!
//! Global positions, one line per tile:
//!
//! ```text
//! file: img_r001_c002.tif; corr: 0.93; position: (1200, 14); grid: (2, 1);
//! ```
//!
//! Relative displacements, one CSV line per edge:
//!
//! ```text
//! west, img_r001_c002.tif, img_r001_c001.tif, 0.93,1187,-3
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::OnceLock;

use ndarray::Array2;
use regex::Regex;

use crate::error::{Result, StitchError};
use crate::grid::TileGrid;
use crate::tile::{CorrelationEstimate, Direction, GridPos, Tile};

fn record_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\S+): (\S+|\(\S+, \S+\));").expect("valid position record regex")
    })
}

/// One parsed line of a global positions file.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionRecord {
    pub file: String,
    pub corr: f64,
    pub x: i64,
    pub y: i64,
    pub grid: GridPos,
}

impl PositionRecord {
    pub fn from_tile(tile: &Tile) -> Self {
        Self {
            file: tile.file_name.clone(),
            corr: tile.correlation,
            x: tile.abs_x,
            y: tile.abs_y,
            grid: tile.pos,
        }
    }

    /// Parse one line. Keys may come in any order; `grid` is required,
    /// the others default to empty/zero.
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let mut file = String::new();
        let mut corr = 0.0;
        let mut position = (0i64, 0i64);
        let mut grid: Option<(usize, usize)> = None;
        let mut matched = false;

        for cap in record_regex().captures_iter(line) {
            matched = true;
            let key = &cap[1];
            let value = &cap[2];
            match key {
                "file" => file = value.to_string(),
                "corr" => {
                    corr = value
                        .parse()
                        .map_err(|_| format!("unable to parse correlation {value:?}"))?
                }
                "position" => {
                    position = parse_pair(value)
                        .ok_or_else(|| format!("unable to parse position {value:?}"))?
                }
                "grid" => {
                    grid = Some(
                        parse_pair(value)
                            .ok_or_else(|| format!("unable to parse grid position {value:?}"))?,
                    )
                }
                other => return Err(format!("unknown key {other:?}")),
            }
        }

        if !matched {
            return Err("no key/value pairs found".to_string());
        }
        // Grid is written as (col, row).
        let (col, row) = grid.ok_or_else(|| "missing grid key".to_string())?;
        Ok(Self {
            file,
            corr,
            x: position.0,
            y: position.1,
            grid: GridPos::new(row, col),
        })
    }
}

impl fmt::Display for PositionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file: {}; corr: {}; position: ({}, {}); grid: ({}, {});",
            self.file, self.corr, self.x, self.y, self.grid.col, self.grid.row
        )
    }
}

fn parse_pair<T: std::str::FromStr>(value: &str) -> Option<(T, T)> {
    let inner = value.strip_prefix('(')?.strip_suffix(')')?;
    let (a, b) = inner.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// Write the absolute position of every sub-region tile, row-major.
pub fn write_positions(grid: &TileGrid, path: &Path) -> Result<()> {
    tracing::info!(path = %path.display(), "Writing global positions");
    let mut out = BufWriter::new(File::create(path)?);
    for tile in grid.region_tiles() {
        writeln!(out, "{}", PositionRecord::from_tile(tile))?;
    }
    out.flush()?;
    Ok(())
}

/// Every record of a positions file, without applying them to a grid.
pub fn read_records(path: &Path) -> Result<Vec<PositionRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = PositionRecord::parse(&line).map_err(|reason| StitchError::MalformedRecord {
            line: idx + 1,
            reason,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Apply a positions file to `grid`. Returns the number of tiles updated.
///
/// The first bad line aborts the read; tiles updated by earlier lines keep
/// their new values.
pub fn read_positions(grid: &mut TileGrid, path: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    let mut updated = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let record = PositionRecord::parse(&line).map_err(|reason| {
            tracing::error!(line = line_no, %reason, path = %path.display(), "Malformed position record");
            StitchError::MalformedRecord {
                line: line_no,
                reason,
            }
        })?;

        let tile = grid
            .tile_mut(record.grid)
            .ok_or_else(|| StitchError::MalformedRecord {
                line: line_no,
                reason: format!("grid position {} outside the grid", record.grid),
            })?;
        tile.abs_x = record.x;
        tile.abs_y = record.y;
        tile.correlation = record.corr;
        updated += 1;
    }
    tracing::debug!(updated, path = %path.display(), "Read global positions");
    Ok(updated)
}

/// Write every west/north estimate inside the sub-region as CSV.
pub fn write_relative_displacements(grid: &TileGrid, path: &Path) -> Result<()> {
    tracing::info!(path = %path.display(), "Writing relative positions");
    write_edges(grid, path, Tile::estimate)
}

/// Same as [`write_relative_displacements`] using the pre-refinement backups.
pub fn write_relative_displacements_pre_refinement(grid: &TileGrid, path: &Path) -> Result<()> {
    tracing::info!(path = %path.display(), "Writing relative positions (no optimization)");
    write_edges(grid, path, Tile::pre_refinement)
}

fn write_edges<F>(grid: &TileGrid, path: &Path, estimate_of: F) -> Result<()>
where
    F: Fn(&Tile, Direction) -> Option<CorrelationEstimate>,
{
    let mut out = BufWriter::new(File::create(path)?);
    for tile in grid.region_tiles() {
        for dir in Direction::BOTH {
            let Some(neighbor) = grid.neighbor(tile.pos, dir) else {
                continue;
            };
            let (Some(other), Some(est)) = (grid.tile(neighbor), estimate_of(tile, dir)) else {
                continue;
            };
            writeln!(
                out,
                "{}, {}, {}, {}",
                dir.label(),
                tile.file_name,
                other.file_name,
                est.to_csv()
            )?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Dump a correlation surface, one CSV row per `y`.
pub fn write_surface_csv(surface: &Array2<f64>, path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for row in surface.rows() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    out.flush()?;
    Ok(())
}
