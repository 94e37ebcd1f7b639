use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarkerKind {
    Trace,
    Cube,
    Material,
}

impl MarkerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Cube => "CUBE",
            Self::Material => "MATERIAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TRACE" => Some(Self::Trace),
            "CUBE" => Some(Self::Cube),
            "MATERIAL" => Some(Self::Material),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Faction {
    Elyos,
    Asmo,
    Both,
}

impl Faction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Elyos => "ELYOS",
            Self::Asmo => "ASMO",
            Self::Both => "BOTH",
        }
    }

    /// Accepts the canonical names plus the aliases found in community datasets.
    pub fn normalize(raw: &str) -> Option<Self> {
        let v = raw.trim().to_uppercase();
        match v.as_str() {
            "ELYOS" | "E" | "LIGHT" | "L" | "천족" => Some(Self::Elyos),
            "ASMO" | "ASMODIANS" | "A" | "DARK" | "D" | "마족" => Some(Self::Asmo),
            "BOTH" | "ALL" | "ANY" | "공통" | "전체" => Some(Self::Both),
            _ => None,
        }
    }
}

/// Whose progress a done flag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    Account,
    Character,
}

impl Default for Scope {
    fn default() -> Self {
        Self::Account
    }
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "ACCOUNT",
            Self::Character => "CHARACTER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "ACCOUNT" => Some(Self::Account),
            "CHARACTER" => Some(Self::Character),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: String,
    pub kind: MarkerKind,
    #[serde(default)]
    pub faction: Option<Faction>,
    pub map: String,
    #[serde(default)]
    pub region: Option<String>,
    pub name: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub done: bool,
}

impl Marker {
    /// World position, if the marker has both coordinates.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((x, y)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapMeta {
    pub name: String,
    pub order: i64,
    #[serde(default, rename = "type")]
    pub map_type: Option<String>,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_count_x: u32,
    pub tiles_count_y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub source: Option<String>,
}

impl MapMeta {
    pub fn from_tiles(
        name: impl Into<String>,
        order: i64,
        tile_width: u32,
        tile_height: u32,
        tiles_count_x: u32,
        tiles_count_y: u32,
    ) -> Self {
        Self {
            name: name.into(),
            order,
            map_type: None,
            tile_width,
            tile_height,
            tiles_count_x,
            tiles_count_y,
            width: tile_width.saturating_mul(tiles_count_x),
            height: tile_height.saturating_mul(tiles_count_y),
            source: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerFilter {
    #[serde(default)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MarkerKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faction: Option<Faction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default)]
    pub only_remaining: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDone {
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub character_id: Option<String>,
    pub marker_id: String,
    pub done: bool,
}

/// Loosely typed marker rows; invalid entries are skipped by the importer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportInput {
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub default_source: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub total: usize,
}

/// One done flag as written to a progress backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    pub marker_id: String,
    pub done_at_ms: i64,
}

/// Loosely typed progress rows from a backup; unusable rows are skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressImportInput {
    pub progress: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportView {
    pub scale: f64,
    pub pan_x: f64,
    pub pan_y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterTone {
    Done,
    Pending,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterView {
    pub key: String,
    pub x: f64,
    pub y: f64,
    pub count: usize,
    pub done_count: usize,
    pub tone: ClusterTone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerDot {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub done: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    pub clustered: bool,
    pub singles: Vec<MarkerDot>,
    pub clusters: Vec<ClusterView>,
    pub visible_count: usize,
    pub visible_done: usize,
    pub total_count: usize,
    pub total_done: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStepView {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub map: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub x: f64,
    pub y: f64,
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_id: Option<String>,
    pub fixed_start: bool,
    pub steps: Vec<RouteStepView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// Pointer and wheel events forwarded from the canvas surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputEvent {
    #[serde(rename_all = "camelCase")]
    PointerDown {
        pointer_id: u32,
        #[serde(default)]
        button: u8,
        x: f64,
        y: f64,
    },
    #[serde(rename_all = "camelCase")]
    PointerMove { pointer_id: u32, x: f64, y: f64 },
    #[serde(rename_all = "camelCase")]
    PointerUp { pointer_id: u32 },
    #[serde(rename_all = "camelCase")]
    PointerCancel { pointer_id: u32 },
    #[serde(rename_all = "camelCase")]
    Wheel { x: f64, y: f64, delta_y: f64 },
}
