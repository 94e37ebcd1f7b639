use std::collections::HashMap;

use crate::geom::Point2;

use super::RoutePoint;

pub(super) fn index(points: &[RoutePoint]) -> HashMap<&str, Point2> {
    points.iter().map(|p| (p.id.as_str(), p.pos())).collect()
}

/// Straight-line length of `start -> order[0] -> ... -> order[last]`.
///
/// With `fixed_start`, `order[0]` is the start marker, so the leading edge is
/// not counted. Ids missing from `points` are skipped.
pub fn route_distance(start: Point2, order: &[String], points: &[RoutePoint], fixed_start: bool) -> f64 {
    let by_id = index(points);
    let mut walk = order.iter().filter_map(|id| by_id.get(id.as_str()).copied());

    let Some(first) = walk.next() else {
        return 0.0;
    };
    let mut total = if fixed_start { 0.0 } else { start.distance(first) };
    let mut prev = first;
    for p in walk {
        total += prev.distance(p);
        prev = p;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn open_path_from_external_start() {
        let points = [RoutePoint::new("a", 3.0, 4.0), RoutePoint::new("b", 3.0, 10.0)];
        let d = route_distance(Point2::ZERO, &ids(&["a", "b"]), &points, false);
        assert!((d - 11.0).abs() < 1e-12);
    }

    #[test]
    fn fixed_start_coinciding_with_first_step() {
        let points = [RoutePoint::new("s", 5.0, 5.0), RoutePoint::new("b", 5.0, 9.0)];
        let order = ids(&["s", "b"]);
        let fixed = route_distance(Point2::new(5.0, 5.0), &order, &points, true);
        let open = route_distance(Point2::new(5.0, 5.0), &order, &points, false);
        assert!((fixed - 4.0).abs() < 1e-12);
        assert!((open - fixed).abs() < 1e-12);
    }

    #[test]
    fn fixed_start_ignores_stale_start_coordinates() {
        let points = [RoutePoint::new("s", 0.0, 0.0), RoutePoint::new("b", 0.0, 2.0)];
        let d = route_distance(Point2::new(100.0, 100.0), &ids(&["s", "b"]), &points, true);
        assert!((d - 2.0).abs() < 1e-12);
    }

    #[test]
    fn empty_and_unknown_ids() {
        let points = [RoutePoint::new("a", 1.0, 0.0)];
        assert_eq!(route_distance(Point2::ZERO, &[], &points, false), 0.0);
        let d = route_distance(Point2::ZERO, &ids(&["ghost", "a"]), &points, false);
        assert!((d - 1.0).abs() < 1e-12);
    }
}
