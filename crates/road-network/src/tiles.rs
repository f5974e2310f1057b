//! Tile view: uniform lat/lon grid over the segment view

use crate::segment::{SegmentEdgeKey, SegmentGraph};
use crate::{NetworkError, Result, SegmentNodeId};
use geo_location::{GeoBox, GeoLocation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Default tile edge length in degrees
pub const DEFAULT_TILE_SIZE_DEG: f64 = 0.01;

/// Grid coordinate, row from latitude and column from longitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    pub row: i64,
    pub col: i64,
}

impl TileId {
    pub fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: TileId,
    pub south_west: GeoLocation,
    pub north_east: GeoLocation,
    pub center: GeoLocation,
    pub segment_nodes: BTreeSet<SegmentNodeId>,
    pub segment_edges: BTreeSet<SegmentEdgeKey>,
}

impl Tile {
    pub fn bounds(&self) -> GeoBox {
        GeoBox::new(self.south_west, self.north_east)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TileIndexRecord {
    origin_lat: f64,
    origin_lon: f64,
    tile_size: f64,
    tiles: Vec<Tile>,
}

/// Populated tiles keyed by grid coordinate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TileIndexRecord", into = "TileIndexRecord")]
pub struct TileIndex {
    origin_lat: f64,
    origin_lon: f64,
    tile_size: f64,
    tiles: BTreeMap<TileId, Tile>,
}

impl TryFrom<TileIndexRecord> for TileIndex {
    type Error = NetworkError;

    fn try_from(record: TileIndexRecord) -> Result<Self> {
        validate_tile_size(record.tile_size)?;
        let tiles = record.tiles.into_iter().map(|t| (t.id, t)).collect();
        Ok(Self {
            origin_lat: record.origin_lat,
            origin_lon: record.origin_lon,
            tile_size: record.tile_size,
            tiles,
        })
    }
}

impl From<TileIndex> for TileIndexRecord {
    fn from(index: TileIndex) -> Self {
        TileIndexRecord {
            origin_lat: index.origin_lat,
            origin_lon: index.origin_lon,
            tile_size: index.tile_size,
            tiles: index.tiles.into_values().collect(),
        }
    }
}

fn validate_tile_size(tile_size: f64) -> Result<()> {
    if tile_size.is_finite() && tile_size > 0.0 {
        Ok(())
    } else {
        Err(NetworkError::MalformedInput(format!(
            "tile size must be positive, got {}",
            tile_size
        )))
    }
}

impl TileIndex {
    /// Bucket every node and edge of `segments` in one pass.
    ///
    /// An edge is listed in both endpoint tiles and in every other populated
    /// tile its straight segment crosses. Tiles without nodes are not kept.
    pub fn build(segments: &SegmentGraph, tile_size: f64) -> Result<Self> {
        validate_tile_size(tile_size)?;

        let (origin_lat, origin_lon) = match segments.bounds() {
            Some(bounds) => (bounds.south_west.latitude(), bounds.south_west.longitude()),
            None => (0.0, 0.0),
        };
        let mut index = Self {
            origin_lat,
            origin_lon,
            tile_size,
            tiles: BTreeMap::new(),
        };

        for node in segments.nodes() {
            let id = index.tile_of(&node.position);
            let tile = index
                .tiles
                .entry(id)
                .or_insert_with(|| empty_tile(id, origin_lat, origin_lon, tile_size));
            tile.segment_nodes.insert(node.id.clone());
        }

        let mut crossings = 0usize;
        for (a, b, _) in segments.edges() {
            let key = SegmentEdgeKey::new(a.id.clone(), b.id.clone());
            let ta = index.tile_of(&a.position);
            let tb = index.tile_of(&b.position);

            let mut touched = vec![ta, tb];
            if ta != tb {
                let cols = ta.col.min(tb.col)..=ta.col.max(tb.col);
                for row in ta.row.min(tb.row)..=ta.row.max(tb.row) {
                    let lo = TileId::new(row, *cols.start());
                    let hi = TileId::new(row, *cols.end());
                    for (id, tile) in index.tiles.range(lo..=hi) {
                        if *id != ta
                            && *id != tb
                            && tile.bounds().intersects_segment(&a.position, &b.position)
                        {
                            touched.push(*id);
                            crossings += 1;
                        }
                    }
                }
            }

            for id in touched {
                if let Some(tile) = index.tiles.get_mut(&id) {
                    tile.segment_edges.insert(key.clone());
                }
            }
        }

        debug!(
            "Tiled {} nodes into {} tiles ({} edge crossings)",
            segments.node_count(),
            index.tiles.len(),
            crossings
        );

        Ok(index)
    }

    /// Grid coordinate of a location, the same rule build uses
    pub fn tile_of(&self, location: &GeoLocation) -> TileId {
        let row = ((location.latitude() - self.origin_lat) / self.tile_size).floor() as i64;
        let col = ((location.longitude() - self.origin_lon) / self.tile_size).floor() as i64;
        TileId::new(row, col)
    }

    pub fn tile(&self, id: &TileId) -> Option<&Tile> {
        self.tiles.get(id)
    }

    pub fn contains(&self, id: &TileId) -> bool {
        self.tiles.contains_key(id)
    }

    /// Segment nodes bucketed in a tile; empty for unknown tiles
    pub fn segment_nodes_in(&self, id: &TileId) -> impl Iterator<Item = &SegmentNodeId> {
        self.tiles.get(id).into_iter().flat_map(|t| t.segment_nodes.iter())
    }

    /// Populated tiles whose grid cell overlaps `bounds`.
    ///
    /// Returns `None` when the box wraps the antimeridian; callers fall back
    /// to a full scan.
    pub fn tiles_overlapping(&self, bounds: &GeoBox) -> Option<Vec<&Tile>> {
        if bounds.south_west.longitude() > bounds.north_east.longitude() {
            return None;
        }
        let sw = self.tile_of(&bounds.south_west);
        let ne = self.tile_of(&bounds.north_east);
        let mut found = Vec::new();
        for row in sw.row..=ne.row {
            let lo = TileId::new(row, sw.col);
            let hi = TileId::new(row, ne.col);
            found.extend(self.tiles.range(lo..=hi).map(|(_, t)| t));
        }
        Some(found)
    }

    /// Tiles in row-major order
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = TileId> + '_ {
        self.tiles.keys().copied()
    }

    /// Tile centres in the same order as [`Self::tiles`]
    pub fn centers(&self) -> Vec<GeoLocation> {
        self.tiles.values().map(|t| t.center).collect()
    }

    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

fn empty_tile(id: TileId, origin_lat: f64, origin_lon: f64, size: f64) -> Tile {
    let south = origin_lat + id.row as f64 * size;
    let west = origin_lon + id.col as f64 * size;
    Tile {
        id,
        south_west: GeoLocation::saturating(south, west),
        north_east: GeoLocation::saturating(south + size, west + size),
        center: GeoLocation::saturating(south + size / 2.0, west + size / 2.0),
        segment_nodes: BTreeSet::new(),
        segment_edges: BTreeSet::new(),
    }
}
