use waymark_protocol::MapMeta;

pub const TILE_PX: u32 = 1024;
pub const FALLBACK_ORDER: i64 = 999;

const SOURCE: &str = "aion2-interactive-map";

// (name, order, tiles x, tiles y, type)
const BUILTIN: &[(&str, i64, u32, u32, &str)] = &[
    ("World_L_A", 0, 8, 8, "light"),
    ("World_D_A", 1, 8, 8, "dark"),
    ("World_L_B", 2, 6, 6, "light"),
    ("World_D_B", 3, 8, 8, "dark"),
    ("World_L_Starter", 4, 4, 4, "light"),
    ("World_D_Starter", 5, 5, 5, "dark"),
    ("Abyss_Reshanta_A", 6, 4, 4, "abyss"),
    ("Abyss_Reshanta_B", 7, 2, 2, "abyss"),
];

pub fn builtin_maps() -> Vec<MapMeta> {
    BUILTIN
        .iter()
        .map(|&(name, order, tx, ty, kind)| MapMeta {
            map_type: Some(kind.to_string()),
            source: Some(SOURCE.to_string()),
            ..MapMeta::from_tiles(name, order, TILE_PX, TILE_PX, tx, ty)
        })
        .collect()
}

pub fn find_builtin_map(name: &str) -> Option<MapMeta> {
    builtin_maps().into_iter().find(|m| m.name == name)
}

/// Metadata for a map outside the catalog, sized to cover its markers.
pub fn fallback_map(name: &str, max_x: f64, max_y: f64) -> MapMeta {
    let tiles = |max: f64| -> u32 {
        let n = (max.max(0.0) / f64::from(TILE_PX)).ceil();
        if n.is_finite() && n >= 1.0 {
            n.min(f64::from(u16::MAX)) as u32
        } else {
            1
        }
    };
    MapMeta::from_tiles(name, FALLBACK_ORDER, TILE_PX, TILE_PX, tiles(max_x), tiles(max_y))
}
