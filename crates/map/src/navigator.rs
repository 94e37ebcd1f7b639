//! Route state and step-through.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};
use waymark_protocol::{Marker, RouteStepView, RouteView};

use crate::display::display_name;
use crate::error::{MapError, Result};
use crate::geom::Point2;
use crate::route::{route_candidates, route_distance, Route, RoutePlanner, RoutePoint};
use crate::viewport::Viewport;

pub const NOTHING_TO_DO: &str = "no undone markers on this map";

#[derive(Debug, Clone)]
pub struct RouteNavigator {
    planner: RoutePlanner,
    route: Option<Route>,
    current: usize,
    notice: Option<String>,
}

impl RouteNavigator {
    pub fn new(planner: RoutePlanner) -> Self {
        Self {
            planner,
            route: None,
            current: 0,
            notice: None,
        }
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.route
            .as_ref()
            .filter(|r| !r.is_empty())
            .map(|_| self.current)
    }

    pub fn current_id(&self) -> Option<&str> {
        let route = self.route.as_ref()?;
        route.order.get(self.current).map(String::as_str)
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Builds a route from `start` over the undone, positioned `markers`.
    ///
    /// On error nothing changes: a previous route stays in place.
    pub fn generate(
        &mut self,
        start: Option<&Marker>,
        markers: &[Marker],
        viewport: &mut Viewport,
    ) -> Result<()> {
        let start = start.ok_or(MapError::NoStartSelected)?;
        let (sx, sy) = start
            .position()
            .ok_or_else(|| MapError::MissingCoordinates(start.id.clone()))?;
        let origin = Point2::new(sx, sy);
        let candidates = route_candidates(markers);

        if candidates.is_empty() {
            info!(start = %start.id, "route requested with nothing left to collect");
            self.route = Some(Route {
                start: origin,
                start_id: Some(start.id.clone()),
                order: Vec::new(),
                fixed_start: false,
                distance: 0.0,
            });
            self.current = 0;
            self.notice = Some(NOTHING_TO_DO.to_string());
            return Ok(());
        }

        let route = self.planner.plan(Some(&start.id), origin, &candidates)?;
        info!(
            start = %start.id,
            steps = route.len(),
            distance = route.distance,
            "route generated"
        );
        self.route = Some(route);
        self.current = 0;
        self.notice = None;
        self.recenter(markers, viewport);
        Ok(())
    }

    pub fn next(&mut self, markers: &[Marker], viewport: &mut Viewport) -> bool {
        let len = self.len();
        if len == 0 || self.current + 1 >= len {
            return false;
        }
        self.goto_index(self.current + 1, markers, viewport)
    }

    pub fn prev(&mut self, markers: &[Marker], viewport: &mut Viewport) -> bool {
        if self.len() == 0 || self.current == 0 {
            return false;
        }
        self.goto_index(self.current - 1, markers, viewport)
    }

    /// Jumps to step `index`; out-of-range indices are ignored.
    pub fn goto_index(&mut self, index: usize, markers: &[Marker], viewport: &mut Viewport) -> bool {
        if index >= self.len() {
            return false;
        }
        self.current = index;
        debug!(index, "route step");
        self.recenter(markers, viewport);
        true
    }

    /// Centers the viewport on the current step.
    pub fn recenter(&self, markers: &[Marker], viewport: &mut Viewport) -> bool {
        let Some(id) = self.current_id() else {
            return false;
        };
        match markers.iter().find(|m| m.id == id).and_then(Marker::position) {
            Some((x, y)) => {
                viewport.center_on(Point2::new(x, y));
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.route = None;
        self.current = 0;
        self.notice = None;
    }

    /// Drops route steps whose markers left the snapshot or lost their
    /// coordinates, and keeps the index in range.
    pub fn retain_known(&mut self, markers: &[Marker]) {
        let Some(route) = self.route.as_mut() else {
            return;
        };
        let known: HashSet<&str> = markers
            .iter()
            .filter(|m| m.position().is_some())
            .map(|m| m.id.as_str())
            .collect();
        let before = route.order.len();
        route.order.retain(|id| known.contains(id.as_str()));
        if route.order.len() != before {
            debug!(dropped = before - route.order.len(), "route pruned after refresh");
            if route.fixed_start && route.order.first() != route.start_id.as_ref() {
                route.fixed_start = false;
            }
        }
        if route.order.is_empty() {
            self.current = 0;
        } else {
            self.current = self.current.min(route.order.len() - 1);
        }
    }

    pub fn view(&self, markers: &[Marker]) -> RouteView {
        let Some(route) = self.route.as_ref() else {
            return RouteView {
                notice: self.notice.clone(),
                ..RouteView::default()
            };
        };

        let by_id: HashMap<&str, &Marker> = markers.iter().map(|m| (m.id.as_str(), m)).collect();
        let steps: Vec<RouteStepView> = route
            .order
            .iter()
            .enumerate()
            .filter_map(|(index, id)| {
                let m = by_id.get(id.as_str())?;
                let (x, y) = m.position()?;
                Some(RouteStepView {
                    index,
                    id: m.id.clone(),
                    name: display_name(m),
                    map: m.map.clone(),
                    region: m.region.clone(),
                    x,
                    y,
                    done: m.done,
                })
            })
            .collect();

        let points: Vec<_> = steps
            .iter()
            .map(|s| RoutePoint::new(s.id.clone(), s.x, s.y))
            .collect();
        let total = route_distance(route.start, &route.order, &points, route.fixed_start);

        RouteView {
            start_id: route.start_id.clone(),
            fixed_start: route.fixed_start,
            steps,
            current_index: self.current_index(),
            total_distance: if route.is_empty() { None } else { Some(total) },
            notice: self.notice.clone(),
        }
    }

    fn len(&self) -> usize {
        self.route.as_ref().map_or(0, Route::len)
    }
}
