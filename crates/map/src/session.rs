//! One interactive map view: the selected map, its marker snapshot, the
//! viewport, drag state, selection and the route.

use tracing::{debug, info, warn};
use waymark_protocol::{
    FrameView, InputEvent, MapMeta, Marker, MarkerDot, MarkerFilter, RouteView, SetDone,
    ViewportView,
};

use crate::cluster::{self, CellKey};
use crate::config::MapConfig;
use crate::cull::visible_markers;
use crate::error::{MapError, Result};
use crate::geom::{Point2, Size};
use crate::input::DragCoalescer;
use crate::navigator::RouteNavigator;
use crate::route::RoutePlanner;
use crate::store::MarkerStore;
use crate::viewport::Viewport;

#[derive(Debug, Clone)]
pub struct MapSession {
    config: MapConfig,
    map: Option<String>,
    meta: Option<MapMeta>,
    filter: MarkerFilter,
    markers: Vec<Marker>,
    viewport: Viewport,
    input: DragCoalescer,
    navigator: RouteNavigator,
    selected: Option<String>,
    error: Option<String>,
    needs_fit: bool,
}

impl MapSession {
    pub fn new(config: MapConfig) -> Self {
        Self {
            viewport: Viewport::new(config.viewport.clone()),
            navigator: RouteNavigator::new(RoutePlanner::new(config.route.clone())),
            config,
            map: None,
            meta: None,
            filter: MarkerFilter::default(),
            markers: Vec::new(),
            input: DragCoalescer::default(),
            selected: None,
            error: None,
            needs_fit: false,
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn map(&self) -> Option<&str> {
        self.map.as_deref()
    }

    pub fn meta(&self) -> Option<&MapMeta> {
        self.meta.as_ref()
    }

    pub fn filter(&self) -> &MarkerFilter {
        &self.filter
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn navigator(&self) -> &RouteNavigator {
        &self.navigator
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Page-level error from the last failed collaborator call.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Switches to `name`. Without metadata the session shows the
    /// placeholder and reports `NoMapMeta`.
    pub fn select_map<S: MarkerStore + ?Sized>(&mut self, store: &S, name: &str) -> Result<()> {
        self.map = Some(name.to_string());
        self.filter.map = Some(name.to_string());
        self.meta = None;
        self.markers.clear();
        self.selected = None;
        self.error = None;
        self.navigator.clear();
        self.input.reset();
        self.viewport.reset();
        self.needs_fit = false;

        let maps = match store.list_map_meta() {
            Ok(maps) => maps,
            Err(e) => {
                warn!(map = name, error = %format!("{e:#}"), "map listing failed");
                self.error = Some(format!("{e:#}"));
                return Err(MapError::Store(e));
            }
        };
        let meta = maps.into_iter().find(|m| m.name == name);
        let Some(meta) = meta else {
            warn!(map = name, "no metadata for map");
            let err = MapError::NoMapMeta(name.to_string());
            self.error = Some(err.to_string());
            return Err(err);
        };
        info!(map = name, width = meta.width, height = meta.height, "map selected");
        self.meta = Some(meta);
        self.refresh(store)?;

        if self.viewport.size().is_empty() {
            self.needs_fit = true;
        } else {
            self.fit()?;
        }
        Ok(())
    }

    /// Replaces the filter (the selected map always wins) and reloads.
    pub fn set_filter<S: MarkerStore + ?Sized>(
        &mut self,
        store: &S,
        filter: MarkerFilter,
    ) -> Result<()> {
        self.filter = MarkerFilter {
            map: self.map.clone(),
            ..filter
        };
        if self.map.is_none() {
            return Ok(());
        }
        self.refresh(store)
    }

    /// Reloads the marker snapshot from the store.
    pub fn refresh<S: MarkerStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        let map = self.map.clone().ok_or(MapError::NoMapSelected)?;
        if self.meta.is_none() {
            return Err(MapError::NoMapMeta(map));
        }
        let markers = match store.list_markers(&self.filter) {
            Ok(markers) => markers,
            Err(e) => {
                warn!(map = %map, error = %format!("{e:#}"), "marker listing failed");
                self.error = Some(format!("{e:#}"));
                return Err(MapError::Store(e));
            }
        };
        debug!(map = %map, count = markers.len(), "markers refreshed");
        self.markers = markers;
        self.error = None;
        self.navigator.retain_known(&self.markers);
        if let Some(id) = self.selected.as_deref() {
            if !self
                .markers
                .iter()
                .any(|m| m.id == id && m.position().is_some())
            {
                self.selected = None;
            }
        }
        Ok(())
    }

    /// Updates the viewport size. The first usable size after a map change
    /// fits the map.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport.set_size(Size::new(width, height));
        let size = self.viewport.size();
        if !self.needs_fit || size.is_empty() {
            return;
        }
        if let Some(meta) = self.meta.as_ref() {
            self.needs_fit = false;
            self.viewport
                .fit(size, f64::from(meta.width), f64::from(meta.height));
        }
    }

    pub fn fit(&mut self) -> Result<()> {
        let (w, h) = self.map_size()?;
        let size = self.viewport.size();
        self.viewport.fit(size, w, h);
        Ok(())
    }

    pub fn zoom_in(&mut self) -> Result<()> {
        self.map_size()?;
        self.viewport.zoom_in();
        Ok(())
    }

    pub fn zoom_out(&mut self) -> Result<()> {
        self.map_size()?;
        self.viewport.zoom_out();
        Ok(())
    }

    /// Feeds one pointer or wheel event. Returns true when the view changed
    /// or a tick is pending.
    pub fn input(&mut self, event: InputEvent) -> bool {
        if self.meta.is_none() {
            return false;
        }
        match event {
            InputEvent::PointerDown {
                pointer_id,
                button,
                x,
                y,
            } => self
                .input
                .pointer_down(pointer_id, button, Point2::new(x, y), self.viewport.pan()),
            InputEvent::PointerMove { pointer_id, x, y } => {
                self.input.pointer_move(pointer_id, Point2::new(x, y))
            }
            InputEvent::PointerUp { pointer_id } => {
                self.input.pointer_up(pointer_id, &mut self.viewport)
            }
            InputEvent::PointerCancel { pointer_id } => {
                self.input.pointer_cancel(pointer_id, &mut self.viewport)
            }
            InputEvent::Wheel { x, y, delta_y } => {
                if !delta_y.is_finite() || delta_y == 0.0 {
                    return false;
                }
                self.viewport.wheel(Point2::new(x, y), delta_y);
                true
            }
        }
    }

    pub fn clustering_enabled(&self) -> bool {
        self.config.cluster.enabled
    }

    /// Turns cluster rendering on or off for the following frames.
    pub fn set_clustering(&mut self, enabled: bool) {
        if self.config.cluster.enabled != enabled {
            debug!(enabled, "clustering toggled");
        }
        self.config.cluster.enabled = enabled;
    }

    /// Applies the coalesced drag target, once per frame.
    pub fn tick(&mut self) -> bool {
        self.input.tick(&mut self.viewport)
    }

    pub fn frame(&self) -> FrameView {
        let Some(meta) = self.meta.as_ref() else {
            return FrameView {
                map: self.map.clone(),
                error: self.error.clone(),
                ..FrameView::default()
            };
        };

        let visible = visible_markers(&self.markers, &self.viewport, self.config.cull.padding_px);
        let (clustered, out) = cluster::derive(&visible, &self.viewport, &self.config.cluster);
        let selected = self.selected.as_deref();
        let placed = self.markers.iter().filter(|m| m.position().is_some());

        let singles = out
            .singles
            .iter()
            .filter_map(|m| {
                let (x, y) = m.position()?;
                Some(MarkerDot {
                    id: m.id.clone(),
                    x,
                    y,
                    done: m.done,
                    selected: selected == Some(m.id.as_str()),
                })
            })
            .collect();

        FrameView {
            map: Some(meta.name.clone()),
            clustered,
            singles,
            clusters: out.clusters.iter().map(cluster::Cluster::view).collect(),
            visible_count: visible.len(),
            visible_done: visible.iter().filter(|m| m.done).count(),
            total_count: placed.clone().count(),
            total_done: placed.filter(|m| m.done).count(),
            error: self.error.clone(),
        }
    }

    /// Selects the route start, or clears the selection with `None`.
    /// Markers without coordinates cannot be selected.
    pub fn select_marker(&mut self, id: Option<&str>) -> Result<()> {
        match id {
            None => self.selected = None,
            Some(id) => {
                if self.marker(id)?.position().is_none() {
                    return Err(MapError::MissingCoordinates(id.to_string()));
                }
                self.selected = Some(id.to_string());
            }
        }
        Ok(())
    }

    pub fn toggle_done<S: MarkerStore + ?Sized>(&mut self, store: &S, id: &str) -> Result<bool> {
        let done = !self.marker(id)?.done;
        self.set_done(store, id, done)?;
        Ok(done)
    }

    /// Writes the done flag, then reloads the authoritative listing. On
    /// failure the snapshot is left as it was.
    pub fn set_done<S: MarkerStore + ?Sized>(
        &mut self,
        store: &S,
        id: &str,
        done: bool,
    ) -> Result<()> {
        self.marker(id)?;
        let cmd = SetDone {
            scope: self.filter.scope,
            character_id: self.filter.character_id.clone(),
            marker_id: id.to_string(),
            done,
        };
        if let Err(e) = store.set_done(&cmd) {
            warn!(marker = id, error = %format!("{e:#}"), "set done failed");
            self.error = Some(format!("{e:#}"));
            return Err(MapError::Store(e));
        }
        info!(marker = id, done, "done flag written");
        self.refresh(store)
    }

    /// Zooms into a cluster, centering on its centroid.
    pub fn click_cluster(&mut self, key: &str) -> Result<()> {
        let cell = CellKey::parse(key).ok_or_else(|| MapError::UnknownCluster(key.to_string()))?;
        let visible = visible_markers(&self.markers, &self.viewport, self.config.cull.padding_px);
        let (_, out) = cluster::derive(&visible, &self.viewport, &self.config.cluster);
        let centroid = out
            .clusters
            .iter()
            .find(|c| c.key == cell)
            .map(|c| c.centroid)
            .ok_or_else(|| MapError::UnknownCluster(key.to_string()))?;
        self.viewport
            .center_on_at_scale(centroid, self.config.viewport.cluster_zoom);
        Ok(())
    }

    pub fn generate_route(&mut self) -> Result<()> {
        self.map_size()?;
        let start = match self.selected.as_deref() {
            Some(id) => Some(
                self.markers
                    .iter()
                    .find(|m| m.id == id)
                    .ok_or(MapError::NoStartSelected)?,
            ),
            None => None,
        };
        self.navigator
            .generate(start, &self.markers, &mut self.viewport)
    }

    pub fn next(&mut self) -> bool {
        self.navigator.next(&self.markers, &mut self.viewport)
    }

    pub fn prev(&mut self) -> bool {
        self.navigator.prev(&self.markers, &mut self.viewport)
    }

    pub fn goto_index(&mut self, index: usize) -> bool {
        self.navigator
            .goto_index(index, &self.markers, &mut self.viewport)
    }

    pub fn recenter(&mut self) -> bool {
        self.navigator.recenter(&self.markers, &mut self.viewport)
    }

    pub fn clear_route(&mut self) {
        self.navigator.clear();
    }

    pub fn route_view(&self) -> RouteView {
        self.navigator.view(&self.markers)
    }

    pub fn viewport_view(&self) -> ViewportView {
        self.viewport.view()
    }

    fn marker(&self, id: &str) -> Result<&Marker> {
        self.markers
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| MapError::UnknownMarker(id.to_string()))
    }

    fn map_size(&self) -> Result<(f64, f64)> {
        match self.meta.as_ref() {
            Some(meta) => Ok((f64::from(meta.width), f64::from(meta.height))),
            None => Err(match self.map.as_ref() {
                Some(map) => MapError::NoMapMeta(map.clone()),
                None => MapError::NoMapSelected,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testutil::{done_marker, marker};

    fn store() -> MemoryStore {
        let meta = MapMeta::from_tiles("World_L_A", 0, 1024, 1024, 2, 2);
        MemoryStore::new(
            vec![meta],
            vec![
                marker("S", 100.0, 100.0),
                marker("A", 300.0, 100.0),
                marker("B", 100.0, 300.0),
                done_marker("D", 300.0, 300.0),
            ],
        )
    }

    fn session(store: &MemoryStore) -> MapSession {
        let mut s = MapSession::new(MapConfig::default());
        s.select_map(store, "World_L_A").unwrap();
        s
    }

    #[test]
    fn first_real_size_fits_once() {
        let store = store();
        let mut s = session(&store);
        s.resize(0.0, 0.0);
        assert_eq!(s.viewport().scale(), 1.0);

        s.resize(800.0, 600.0);
        let fitted = s.viewport().scale();
        assert!((fitted - 576.0 / 2048.0).abs() < 1e-12);

        s.zoom_in().unwrap();
        s.resize(900.0, 700.0);
        assert!((s.viewport().scale() - fitted * 1.15).abs() < 1e-12);
    }

    #[test]
    fn unknown_map_shows_placeholder() {
        let store = store();
        let mut s = MapSession::new(MapConfig::default());
        let err = s.select_map(&store, "Nowhere").unwrap_err();
        assert!(matches!(err, MapError::NoMapMeta(_)));

        let frame = s.frame();
        assert_eq!(frame.map.as_deref(), Some("Nowhere"));
        assert!(frame.singles.is_empty() && frame.clusters.is_empty());
        assert!(frame.error.is_some());
        assert!(matches!(s.fit(), Err(MapError::NoMapMeta(_))));
        assert!(!s.input(InputEvent::Wheel {
            x: 0.0,
            y: 0.0,
            delta_y: 1.0
        }));
    }

    #[test]
    fn frame_counts_visible_and_total() {
        let store = store();
        let mut s = session(&store);
        s.resize(1000.0, 1000.0);
        s.select_marker(Some("A")).unwrap();
        let frame = s.frame();
        assert_eq!(frame.total_count, 4);
        assert_eq!(frame.total_done, 1);
        assert_eq!(frame.visible_count, 4);
        assert_eq!(frame.visible_done, 1);
        assert!(!frame.clustered);
        assert_eq!(frame.singles.len(), 4);
        let selected: Vec<_> = frame.singles.iter().filter(|d| d.selected).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "A");
    }

    #[test]
    fn done_markers_leave_the_route() {
        let store = store();
        let mut s = session(&store);
        s.resize(800.0, 600.0);
        s.select_marker(Some("S")).unwrap();

        assert!(s.toggle_done(&store, "A").unwrap());
        s.generate_route().unwrap();
        let order = &s.navigator().route().unwrap().order;
        assert_eq!(order, &vec!["S".to_string(), "B".to_string()]);
    }

    #[test]
    fn failed_write_keeps_state() {
        let store = store().failing_writes();
        let mut s = session(&store);
        let before = s.markers().to_vec();
        let err = s.set_done(&store, "A", true).unwrap_err();
        assert!(matches!(err, MapError::Store(_)));
        assert_eq!(s.markers(), before.as_slice());
        assert!(s.error().is_some());
        assert!(s.frame().error.is_some());
    }

    #[test]
    fn route_needs_a_start() {
        let store = store();
        let mut s = session(&store);
        assert!(matches!(s.generate_route(), Err(MapError::NoStartSelected)));
        assert!(matches!(
            s.select_marker(Some("ghost")),
            Err(MapError::UnknownMarker(_))
        ));
    }

    #[test]
    fn route_steps_recenter_viewport() {
        let store = store();
        let mut s = session(&store);
        s.resize(800.0, 600.0);
        s.select_marker(Some("S")).unwrap();
        s.generate_route().unwrap();

        let view = s.route_view();
        assert_eq!(view.current_index, Some(0));
        assert!(view.fixed_start);
        assert!(s.next());
        let id = s.navigator().current_id().unwrap().to_string();
        let m = s.markers().iter().find(|m| m.id == id).unwrap();
        let (x, y) = m.position().unwrap();
        let at = s.viewport().world_to_screen(Point2::new(x, y));
        assert!((at.x - 400.0).abs() < 1e-9 && (at.y - 300.0).abs() < 1e-9);

        s.clear_route();
        assert_eq!(s.route_view(), RouteView::default());
    }

    #[test]
    fn drag_is_coalesced_until_tick() {
        let store = store();
        let mut s = session(&store);
        s.resize(800.0, 600.0);
        let pan = s.viewport().pan();

        assert!(s.input(InputEvent::PointerDown {
            pointer_id: 1,
            button: 0,
            x: 10.0,
            y: 10.0
        }));
        for step in 1..=5 {
            s.input(InputEvent::PointerMove {
                pointer_id: 1,
                x: 10.0 + step as f64,
                y: 10.0,
            });
        }
        assert_eq!(s.viewport().pan(), pan);
        assert!(s.tick());
        assert_eq!(s.viewport().pan(), pan + Point2::new(5.0, 0.0));
        assert!(!s.tick());

        s.input(InputEvent::PointerMove {
            pointer_id: 1,
            x: 20.0,
            y: 30.0,
        });
        s.input(InputEvent::PointerUp { pointer_id: 1 });
        assert_eq!(s.viewport().pan(), pan + Point2::new(10.0, 20.0));
    }

    #[test]
    fn cluster_click_zooms_on_centroid() {
        let store = MemoryStore::new(
            vec![MapMeta::from_tiles("World_L_A", 0, 1024, 1024, 8, 8)],
            vec![marker("a", 1000.0, 1000.0), marker("b", 1010.0, 1000.0)],
        );
        let mut s = session(&store);
        s.resize(800.0, 600.0);
        let frame = s.frame();
        assert!(frame.clustered);
        let key = frame.clusters[0].key.clone();
        let before = s.viewport().scale();

        s.click_cluster(&key).unwrap();
        assert!((s.viewport().scale() - before * 1.6).abs() < 1e-12);
        let c = s.viewport().world_to_screen(Point2::new(1005.0, 1000.0));
        assert!((c.x - 400.0).abs() < 1e-9 && (c.y - 300.0).abs() < 1e-9);
        assert!(matches!(
            s.click_cluster("nope"),
            Err(MapError::UnknownCluster(_))
        ));
    }

    #[test]
    fn unplaced_markers_stay_off_the_map() {
        let mut unplaced = done_marker("U", 0.0, 0.0);
        unplaced.x = None;
        unplaced.y = None;
        let store = MemoryStore::new(
            vec![MapMeta::from_tiles("World_L_A", 0, 1024, 1024, 2, 2)],
            vec![marker("S", 100.0, 100.0), unplaced],
        );
        let mut s = session(&store);
        s.resize(800.0, 600.0);

        let frame = s.frame();
        assert_eq!(frame.visible_count, 1);
        assert_eq!(frame.total_count, 1);
        assert_eq!(frame.total_done, 0);

        assert!(matches!(
            s.select_marker(Some("U")),
            Err(MapError::MissingCoordinates(_))
        ));
        assert_eq!(s.selected(), None);
    }

    #[test]
    fn clustering_can_be_switched_off() {
        let store = MemoryStore::new(
            vec![MapMeta::from_tiles("World_L_A", 0, 1024, 1024, 8, 8)],
            vec![marker("a", 1000.0, 1000.0), marker("b", 1010.0, 1000.0)],
        );
        let mut s = session(&store);
        s.resize(800.0, 600.0);
        assert!(s.viewport().scale() < 0.35);
        assert!(s.frame().clustered);

        s.set_clustering(false);
        assert!(!s.clustering_enabled());
        let frame = s.frame();
        assert!(!frame.clustered);
        assert!(frame.clusters.is_empty());
        assert_eq!(frame.singles.len(), 2);

        s.set_clustering(true);
        assert!(s.frame().clustered);
    }

    #[test]
    fn failed_map_listing_sets_page_error() {
        let store = store().failing_reads();
        let mut s = MapSession::new(MapConfig::default());
        let err = s.select_map(&store, "World_L_A").unwrap_err();
        assert!(matches!(err, MapError::Store(_)));
        assert!(s.error().is_some());
        assert_eq!(s.frame().error.as_deref(), s.error());
        assert_eq!(s.frame().map.as_deref(), Some("World_L_A"));
    }
}
