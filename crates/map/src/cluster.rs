//! Screen-space grid clustering.
//!
//! A spatial hash rebuilt from scratch on every call. Cells are keyed by the
//! floor of the marker's screen position divided by the cell size, so the
//! grouping follows pan and zoom.

use std::collections::HashMap;
use std::fmt;

use waymark_protocol::{ClusterTone, ClusterView, Marker};

use crate::config::ClusterSettings;
use crate::geom::Point2;
use crate::viewport::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub cx: i64,
    pub cy: i64,
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cx, self.cy)
    }
}

impl CellKey {
    pub fn parse(s: &str) -> Option<Self> {
        let (a, b) = s.split_once(':')?;
        Some(Self {
            cx: a.trim().parse().ok()?,
            cy: b.trim().parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub key: CellKey,
    pub centroid: Point2,
    pub count: usize,
    pub done_count: usize,
}

impl Cluster {
    pub fn tone(&self) -> ClusterTone {
        if self.done_count == self.count {
            ClusterTone::Done
        } else if self.done_count == 0 {
            ClusterTone::Pending
        } else {
            ClusterTone::Mixed
        }
    }

    pub fn view(&self) -> ClusterView {
        ClusterView {
            key: self.key.to_string(),
            x: self.centroid.x,
            y: self.centroid.y,
            count: self.count,
            done_count: self.done_count,
            tone: self.tone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Clustered<'a> {
    pub singles: Vec<&'a Marker>,
    pub clusters: Vec<Cluster>,
}

impl Clustered<'_> {
    /// Number of markers represented, singles plus cluster members.
    pub fn represented(&self) -> usize {
        self.singles.len() + self.clusters.iter().map(|c| c.count).sum::<usize>()
    }
}

pub fn should_cluster(settings: &ClusterSettings, scale: f64, visible_count: usize) -> bool {
    settings.enabled && (scale < settings.below_scale || visible_count > settings.above_count)
}

struct Group<'a> {
    key: CellKey,
    first: &'a Marker,
    count: usize,
    done: usize,
    sum: Point2,
}

/// Buckets `visible` markers into `cell_px` screen cells. Cells holding a
/// single marker are returned as singles. Output keeps first-seen cell order.
pub fn cluster_markers<'a>(
    visible: &[&'a Marker],
    viewport: &Viewport,
    cell_px: f64,
) -> Clustered<'a> {
    let mut slots: HashMap<CellKey, usize> = HashMap::new();
    let mut groups: Vec<Group<'a>> = Vec::new();

    for &m in visible {
        let Some((x, y)) = m.position() else {
            continue;
        };
        let world = Point2::new(x, y);
        let screen = viewport.world_to_screen(world);
        let key = CellKey {
            cx: (screen.x / cell_px).floor() as i64,
            cy: (screen.y / cell_px).floor() as i64,
        };
        let done = usize::from(m.done);
        match slots.get(&key) {
            Some(&i) => {
                let g = &mut groups[i];
                g.count += 1;
                g.done += done;
                g.sum = g.sum + world;
            }
            None => {
                slots.insert(key, groups.len());
                groups.push(Group {
                    key,
                    first: m,
                    count: 1,
                    done,
                    sum: world,
                });
            }
        }
    }

    let mut out = Clustered::default();
    for g in groups {
        if g.count == 1 {
            out.singles.push(g.first);
            continue;
        }
        out.clusters.push(Cluster {
            key: g.key,
            centroid: g.sum * (1.0 / g.count as f64),
            count: g.count,
            done_count: g.done,
        });
    }
    out
}

/// Clusters only when the settings say the view is too dense; otherwise every
/// visible marker is a single.
pub fn derive<'a>(
    visible: &[&'a Marker],
    viewport: &Viewport,
    settings: &ClusterSettings,
) -> (bool, Clustered<'a>) {
    if !should_cluster(settings, viewport.scale(), visible.len()) {
        return (
            false,
            Clustered {
                singles: visible.to_vec(),
                clusters: Vec::new(),
            },
        );
    }
    (true, cluster_markers(visible, viewport, settings.cell_px))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewportSettings;
    use crate::geom::Size;
    use crate::testutil::{done_marker, marker};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn identity() -> Viewport {
        let mut vp = Viewport::new(ViewportSettings::default());
        vp.set_size(Size::new(1000.0, 1000.0));
        vp
    }

    #[test]
    fn same_cell_markers_merge() {
        let markers = vec![
            marker("a", 1.0, 1.0),
            done_marker("b", 10.0, 20.0),
            marker("c", 100.0, 100.0),
        ];
        let visible: Vec<_> = markers.iter().collect();
        let out = cluster_markers(&visible, &identity(), 34.0);

        assert_eq!(out.singles.len(), 1);
        assert_eq!(out.singles[0].id, "c");
        assert_eq!(out.clusters.len(), 1);
        let c = &out.clusters[0];
        assert_eq!(c.key, CellKey { cx: 0, cy: 0 });
        assert_eq!((c.count, c.done_count), (2, 1));
        assert_eq!(c.centroid, Point2::new(5.5, 10.5));
        assert_eq!(c.tone(), ClusterTone::Mixed);
    }

    #[test]
    fn negative_screen_positions_floor() {
        let markers = vec![marker("a", -1.0, -1.0), marker("b", 1.0, 1.0)];
        let visible: Vec<_> = markers.iter().collect();
        let out = cluster_markers(&visible, &identity(), 34.0);
        assert_eq!(out.singles.len(), 2);
        assert!(out.clusters.is_empty());
    }

    #[test]
    fn tones() {
        let mk = |count, done_count| Cluster {
            key: CellKey { cx: 0, cy: 0 },
            centroid: Point2::ZERO,
            count,
            done_count,
        };
        assert_eq!(mk(3, 3).tone(), ClusterTone::Done);
        assert_eq!(mk(3, 0).tone(), ClusterTone::Pending);
        assert_eq!(mk(3, 2).tone(), ClusterTone::Mixed);
    }

    #[test]
    fn trigger_thresholds() {
        let s = ClusterSettings::default();
        assert!(should_cluster(&s, 0.3, 1));
        assert!(should_cluster(&s, 1.0, 601));
        assert!(!should_cluster(&s, 0.35, 600));
        let off = ClusterSettings {
            enabled: false,
            ..ClusterSettings::default()
        };
        assert!(!should_cluster(&off, 0.01, 10_000));
    }

    #[test]
    fn derive_without_trigger_passes_through() {
        let markers = vec![marker("a", 1.0, 1.0), marker("b", 2.0, 2.0)];
        let visible: Vec<_> = markers.iter().collect();
        let (clustered, out) = derive(&visible, &identity(), &ClusterSettings::default());
        assert!(!clustered);
        assert_eq!(out.singles.len(), 2);
    }

    #[test]
    fn conservation_over_random_sets() {
        let mut rng = StdRng::seed_from_u64(7);
        for round in 0..40 {
            let n = rng.gen_range(0..400);
            let markers: Vec<Marker> = (0..n)
                .map(|i| {
                    let mut m = marker(
                        &format!("m{i}"),
                        rng.gen_range(-500.0..3000.0),
                        rng.gen_range(-500.0..3000.0),
                    );
                    m.done = rng.gen_bool(0.3);
                    m
                })
                .collect();
            let visible: Vec<_> = markers.iter().collect();
            let mut vp = identity();
            vp.zoom_at(Point2::ZERO, rng.gen_range(0.05..2.0));
            let cell = [8.0, 34.0, 120.0][round % 3];
            let out = cluster_markers(&visible, &vp, cell);

            assert_eq!(out.represented(), visible.len());
            for c in &out.clusters {
                assert!(c.count >= 2);
                assert!(c.done_count <= c.count);
            }
        }
    }

    #[test]
    fn cell_key_text_round_trip() {
        let k = CellKey { cx: -3, cy: 12 };
        assert_eq!(k.to_string(), "-3:12");
        assert_eq!(CellKey::parse("-3:12"), Some(k));
        assert_eq!(CellKey::parse("x"), None);
    }
}
