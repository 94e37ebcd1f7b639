//! Map view model for Waymark: viewport transform, culling, clustering,
//! drag coalescing and open-path route planning over collectible markers.
//!
//! Everything here is synchronous and storage-agnostic. Persistence is reached
//! through the [`MarkerStore`] trait.

pub mod cluster;
pub mod config;
pub mod cull;
pub mod display;
pub mod error;
pub mod geom;
pub mod input;
pub mod navigator;
pub mod route;
pub mod session;
pub mod store;
pub mod viewport;

pub use config::MapConfig;
pub use error::{MapError, Result};
pub use geom::{Point2, Size, WorldBounds};
pub use navigator::RouteNavigator;
pub use route::{Route, RoutePlanner, RoutePoint};
pub use session::MapSession;
pub use store::{MarkerStore, MemoryStore};
pub use viewport::Viewport;

#[cfg(test)]
pub(crate) mod testutil {
    use waymark_protocol::{Marker, MarkerKind};

    pub fn marker(id: &str, x: f64, y: f64) -> Marker {
        Marker {
            id: id.to_string(),
            kind: MarkerKind::Trace,
            faction: None,
            map: "World_L_A".to_string(),
            region: None,
            name: id.to_string(),
            note: None,
            x: Some(x),
            y: Some(y),
            source: None,
            done: false,
        }
    }

    pub fn done_marker(id: &str, x: f64, y: f64) -> Marker {
        Marker {
            done: true,
            ..marker(id, x, y)
        }
    }
}
