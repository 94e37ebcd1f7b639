//! Umbrella crate for Waymark.
//!
//! Re-exports the map, engine and protocol crates so downstream code can
//! depend on a single crate name (`waymark`).

pub use waymark_engine as engine;
pub use waymark_map as map;
pub use waymark_protocol as protocol;
