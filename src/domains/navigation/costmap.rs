use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::Point2D;

pub const RAW_FREE_SPACE: u8 = 0;
pub const RAW_INSCRIBED: u8 = 253;
pub const RAW_OBSTACLE: u8 = 254;
pub const RAW_UNKNOWN: u8 = 255;

pub const OCCUPANCY_FREE: i8 = 0;
pub const OCCUPANCY_INSCRIBED: i8 = 99;
pub const OCCUPANCY_OBSTACLE: i8 = 100;
pub const OCCUPANCY_UNKNOWN: i8 = -1;

/// Dimensions and placement of the map the robot localizes against.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapMetadata {
    pub width: u32,
    pub height: u32,
    pub resolution: f64,
    pub origin: Point2D,
}

impl MapMetadata {
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Shared cost-map on the raw 0..255 scale.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CostMap {
    pub width: u32,
    pub height: u32,
    pub resolution: f64,
    pub origin: Point2D,
    pub cells: Vec<u8>,
}

impl CostMap {
    pub fn new(metadata: &MapMetadata, cells: Vec<u8>) -> Self {
        Self {
            width: metadata.width,
            height: metadata.height,
            resolution: metadata.resolution,
            origin: metadata.origin,
            cells,
        }
    }

    pub fn filled(metadata: &MapMetadata, value: u8) -> Self {
        Self::new(metadata, vec![value; metadata.cell_count()])
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_well_formed(&self) -> bool {
        self.cells.len() == self.width as usize * self.height as usize
    }

    pub fn metadata(&self) -> MapMetadata {
        MapMetadata {
            width: self.width,
            height: self.height,
            resolution: self.resolution,
            origin: self.origin,
        }
    }
}

/// Emitted grid on the occupancy scale (-1..100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyGrid {
    pub frame_id: String,
    pub width: u32,
    pub height: u32,
    pub resolution: f64,
    pub origin: Point2D,
    pub cells: Vec<i8>,
}

impl OccupancyGrid {
    /// All free space over the given metadata.
    pub fn free(frame_id: &str, metadata: &MapMetadata) -> Self {
        Self {
            frame_id: frame_id.to_string(),
            width: metadata.width,
            height: metadata.height,
            resolution: metadata.resolution,
            origin: metadata.origin,
            cells: vec![OCCUPANCY_FREE; metadata.cell_count()],
        }
    }
}

/// Lookup table from raw cost to occupancy value.
#[derive(Debug, Clone)]
pub struct CostTranslator {
    table: [i8; 256],
}

impl CostTranslator {
    pub fn new() -> Self {
        let mut table = [OCCUPANCY_FREE; 256];
        for (raw, slot) in table.iter_mut().enumerate().take(253).skip(1) {
            *slot = (1.0 + 97.0 * (raw as f64 - 1.0) / 251.0).round() as i8;
        }
        table[RAW_FREE_SPACE as usize] = OCCUPANCY_FREE;
        table[RAW_INSCRIBED as usize] = OCCUPANCY_INSCRIBED;
        table[RAW_OBSTACLE as usize] = OCCUPANCY_OBSTACLE;
        table[RAW_UNKNOWN as usize] = OCCUPANCY_UNKNOWN;
        Self { table }
    }

    pub fn translate(&self, raw: u8) -> i8 {
        self.table[raw as usize]
    }

    /// Smallest raw value that translates to `occupancy`, if any.
    pub fn raw_for(&self, occupancy: i8) -> Option<u8> {
        self.table
            .iter()
            .position(|v| *v == occupancy)
            .map(|raw| raw as u8)
    }
}

impl Default for CostTranslator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapField {
    Width,
    Height,
    Resolution,
    OriginX,
    OriginY,
    CellCount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapMismatch {
    pub field: MapField,
    pub expected: String,
    pub received: String,
}

impl fmt::Display for MapMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} expected {} received {}", self.field, self.expected, self.received)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CostmapRejection {
    Empty,
    MetadataUnknown,
    Mismatch(Vec<MapMismatch>),
}

impl fmt::Display for CostmapRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostmapRejection::Empty => f.write_str("The cost map data is empty"),
            CostmapRejection::MetadataUnknown => f.write_str("No map information has been received yet"),
            CostmapRejection::Mismatch(fields) => {
                f.write_str("Map information doesn't match:")?;
                for m in fields {
                    write!(f, " [{}]", m)?;
                }
                Ok(())
            }
        }
    }
}

/// Reconciles incoming cost-maps with the locally known map.
#[derive(Debug, Clone)]
pub struct CostmapSynchronizer {
    translator: CostTranslator,
    resolution_tolerance: f64,
    origin_tolerance: f64,
    last_mismatches: Vec<MapMismatch>,
}

impl CostmapSynchronizer {
    pub fn new() -> Self {
        Self {
            translator: CostTranslator::new(),
            resolution_tolerance: f32::EPSILON as f64,
            origin_tolerance: f64::EPSILON,
            last_mismatches: Vec::new(),
        }
    }

    pub fn translator(&self) -> &CostTranslator {
        &self.translator
    }

    pub fn last_mismatches(&self) -> &[MapMismatch] {
        &self.last_mismatches
    }

    /// Compares the cost-map header against `known`, recording every field that disagrees.
    pub fn validate(&mut self, costmap: &CostMap, known: &MapMetadata) -> bool {
        let mut mismatches = Vec::new();
        let mut push = |field, expected: String, received: String| {
            mismatches.push(MapMismatch { field, expected, received })
        };

        if costmap.width != known.width {
            push(MapField::Width, known.width.to_string(), costmap.width.to_string());
        }
        if costmap.height != known.height {
            push(MapField::Height, known.height.to_string(), costmap.height.to_string());
        }
        if (costmap.resolution - known.resolution).abs() > self.resolution_tolerance {
            push(MapField::Resolution, known.resolution.to_string(), costmap.resolution.to_string());
        }
        if (costmap.origin.x - known.origin.x).abs() > self.origin_tolerance {
            push(MapField::OriginX, known.origin.x.to_string(), costmap.origin.x.to_string());
        }
        if (costmap.origin.y - known.origin.y).abs() > self.origin_tolerance {
            push(MapField::OriginY, known.origin.y.to_string(), costmap.origin.y.to_string());
        }
        if !costmap.is_well_formed() {
            push(
                MapField::CellCount,
                (costmap.width as usize * costmap.height as usize).to_string(),
                costmap.cells.len().to_string(),
            );
        }

        self.last_mismatches = mismatches;
        self.last_mismatches.is_empty()
    }

    /// Full acceptance check: non-empty, known map present, header matches.
    pub fn check(&mut self, costmap: &CostMap, known: Option<&MapMetadata>) -> Result<(), CostmapRejection> {
        if costmap.is_empty() {
            self.last_mismatches.clear();
            return Err(CostmapRejection::Empty);
        }
        let Some(known) = known else {
            self.last_mismatches.clear();
            return Err(CostmapRejection::MetadataUnknown);
        };
        if self.validate(costmap, known) {
            Ok(())
        } else {
            Err(CostmapRejection::Mismatch(self.last_mismatches.clone()))
        }
    }

    /// Number of cell indices whose raw values differ. Cells present in only
    /// one of the maps count as differing.
    pub fn diff_count(new_map: &CostMap, active_map: &CostMap) -> usize {
        let shared = new_map
            .cells
            .iter()
            .zip(active_map.cells.iter())
            .filter(|(a, b)| a != b)
            .count();
        shared + new_map.cells.len().abs_diff(active_map.cells.len())
    }

    pub fn translate(&self, raw: u8) -> i8 {
        self.translator.translate(raw)
    }

    pub fn to_occupancy(&self, costmap: &CostMap, frame_id: &str) -> OccupancyGrid {
        OccupancyGrid {
            frame_id: frame_id.to_string(),
            width: costmap.width,
            height: costmap.height,
            resolution: costmap.resolution,
            origin: costmap.origin,
            cells: costmap.cells.iter().map(|c| self.translator.translate(*c)).collect(),
        }
    }

    pub fn substitute(costmap: &CostMap, target_raw: u8, replacement: u8) -> CostMap {
        let mut out = costmap.clone();
        for cell in out.cells.iter_mut().filter(|c| **c == target_raw) {
            *cell = replacement;
        }
        out
    }

    /// De-prioritized copy of `costmap`: obstacle cells carry `avoidance_cost`
    /// on the occupancy scale, every other cell translates as usual.
    pub fn deprioritize(
        &self,
        costmap: &CostMap,
        obstacle_raw: u8,
        avoidance_cost: i8,
    ) -> Option<CostMap> {
        let replacement = self.translator.raw_for(avoidance_cost)?;
        Some(Self::substitute(costmap, obstacle_raw, replacement))
    }
}

impl Default for CostmapSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}
