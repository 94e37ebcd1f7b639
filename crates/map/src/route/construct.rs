use crate::geom::Point2;

use super::RoutePoint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Construction {
    pub order: Vec<String>,
    pub fixed_start: bool,
}

/// Greedy nearest-neighbor order starting at `start`.
///
/// When `start_id` names one of the points, that point is pinned first and the
/// walk continues from its coordinates. Ties go to the earlier input point.
pub fn nearest_neighbor(start_id: Option<&str>, start: Point2, points: &[RoutePoint]) -> Construction {
    let mut visited = vec![false; points.len()];
    let mut order = Vec::with_capacity(points.len());
    let mut current = start;

    let pinned = start_id.and_then(|id| points.iter().position(|p| p.id == id));
    if let Some(i) = pinned {
        visited[i] = true;
        order.push(points[i].id.clone());
        current = points[i].pos();
    }

    for _ in order.len()..points.len() {
        let mut best: Option<usize> = None;
        let mut best_d = f64::INFINITY;
        for (i, p) in points.iter().enumerate() {
            if visited[i] {
                continue;
            }
            let d = current.distance(p.pos());
            // strict `<` keeps the first point seen at the minimum
            if best.is_none() || d < best_d {
                best = Some(i);
                best_d = d;
            }
        }
        let Some(i) = best else {
            break;
        };
        visited[i] = true;
        order.push(points[i].id.clone());
        current = points[i].pos();
    }

    Construction {
        order,
        fixed_start: pinned.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str, x: f64, y: f64) -> RoutePoint {
        RoutePoint::new(id, x, y)
    }

    #[test]
    fn empty_and_single() {
        let none = nearest_neighbor(None, Point2::ZERO, &[]);
        assert!(none.order.is_empty());
        assert!(!none.fixed_start);

        let one = nearest_neighbor(None, Point2::ZERO, &[p("only", 5.0, 5.0)]);
        assert_eq!(one.order, vec!["only"]);
    }

    #[test]
    fn greedy_example_with_tie() {
        // A and B are both 10 away from the start; A comes first in the input.
        let points = [p("A", 10.0, 0.0), p("B", 0.0, 10.0), p("C", 10.0, 10.0)];
        let built = nearest_neighbor(None, Point2::ZERO, &points);
        assert_eq!(built.order, vec!["A", "C", "B"]);
    }

    #[test]
    fn tie_follows_input_order() {
        let points = [p("z", 0.0, 5.0), p("a", 5.0, 0.0)];
        let built = nearest_neighbor(None, Point2::ZERO, &points);
        assert_eq!(built.order, vec!["z", "a"]);
    }

    #[test]
    fn start_marker_is_pinned() {
        let points = [p("A", 0.0, 0.0), p("B", 10.0, 0.0), p("C", 0.0, 10.0)];
        let built = nearest_neighbor(Some("A"), Point2::new(123.0, 456.0), &points);
        assert!(built.fixed_start);
        assert_eq!(built.order[0], "A");
        assert_eq!(built.order.len(), 3);
    }

    #[test]
    fn start_outside_candidates() {
        let points = [p("B", 10.0, 0.0), p("C", 30.0, 0.0)];
        let built = nearest_neighbor(Some("done-marker"), Point2::new(35.0, 0.0), &points);
        assert!(!built.fixed_start);
        assert_eq!(built.order, vec!["C", "B"]);
    }

    #[test]
    fn every_id_once() {
        let points: Vec<_> = (0..50)
            .map(|i| p(&format!("p{i}"), ((i * 37) % 11) as f64, ((i * 13) % 7) as f64))
            .collect();
        let built = nearest_neighbor(None, Point2::ZERO, &points);
        let mut sorted = built.order.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 50);
    }
}
