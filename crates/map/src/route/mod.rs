//! Open-path route planning over marker positions.
//!
//! Nearest-neighbor construction followed by bounded 2-opt refinement. All
//! functions here are pure: same inputs, same route.

mod construct;
mod distance;
mod improve;

pub use construct::{nearest_neighbor, Construction};
pub use distance::route_distance;
pub use improve::two_opt;

use waymark_protocol::Marker;

use crate::config::RouteSettings;
use crate::error::{MapError, Result};
use crate::geom::Point2;

#[derive(Debug, Clone, PartialEq)]
pub struct RoutePoint {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

impl RoutePoint {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
        }
    }

    pub fn pos(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }

    pub fn from_marker(m: &Marker) -> Option<Self> {
        let (x, y) = m.position()?;
        Some(Self::new(m.id.clone(), x, y))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub start: Point2,
    pub start_id: Option<String>,
    pub order: Vec<String>,
    /// `order[0]` is the start marker itself and is never reordered.
    pub fixed_start: bool,
    pub distance: f64,
}

impl Route {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Undone markers with coordinates, in input order.
pub fn route_candidates(markers: &[Marker]) -> Vec<RoutePoint> {
    markers
        .iter()
        .filter(|m| !m.done)
        .filter_map(RoutePoint::from_marker)
        .collect()
}

#[derive(Debug, Clone)]
pub struct RoutePlanner {
    settings: RouteSettings,
}

impl RoutePlanner {
    pub fn new(settings: RouteSettings) -> Self {
        Self { settings }
    }

    pub fn max_candidates(&self) -> usize {
        self.settings.max_candidates
    }

    /// Plans a route from `start` through every point.
    ///
    /// Rejects oversized candidate sets instead of truncating them.
    pub fn plan(&self, start_id: Option<&str>, start: Point2, points: &[RoutePoint]) -> Result<Route> {
        if points.len() > self.settings.max_candidates {
            return Err(MapError::TooManyCandidates {
                count: points.len(),
                max: self.settings.max_candidates,
            });
        }

        let built = nearest_neighbor(start_id, start, points);
        let order = two_opt(
            start,
            &built.order,
            points,
            built.fixed_start,
            self.settings.two_opt_passes,
        );
        let distance = route_distance(start, &order, points, built.fixed_start);

        Ok(Route {
            start,
            start_id: start_id.map(str::to_string),
            order,
            fixed_start: built.fixed_start,
            distance,
        })
    }
}
