use crate::geom::Point2;

use super::distance::index;
use super::RoutePoint;

const MIN_GAIN: f64 = 1e-9;

/// 2-opt refinement of an open path.
///
/// Position 0 (the external start, or `order[0]` when `fixed_start`) never
/// moves. Each applied reversal strictly shortens the path, so the result is
/// never longer than the input. Runs at most `passes` passes and stops after
/// the first pass without an improving move.
pub fn two_opt(
    start: Point2,
    order: &[String],
    points: &[RoutePoint],
    fixed_start: bool,
    passes: usize,
) -> Vec<String> {
    let mut order = order.to_vec();
    let n = order.len();
    let first = usize::from(fixed_start);
    if n < first + 3 {
        return order;
    }

    let by_id = index(points);
    let mut pos: Vec<Option<Point2>> = order
        .iter()
        .map(|id| by_id.get(id.as_str()).copied())
        .collect();

    for _ in 0..passes {
        let mut improved = false;

        for i in first..n - 1 {
            let prev = if i == 0 { Some(start) } else { pos[i - 1] };
            let Some(prev) = prev else {
                continue;
            };

            for k in i + 1..n {
                // re-read: an applied reversal changes what sits at `i`
                let (Some(a), Some(b)) = (pos[i], pos[k]) else {
                    continue;
                };
                let next = if k + 1 < n {
                    match pos[k + 1] {
                        Some(p) => Some(p),
                        None => continue,
                    }
                } else {
                    None
                };

                let old_cost = prev.distance(a) + next.map_or(0.0, |nx| b.distance(nx));
                let new_cost = prev.distance(b) + next.map_or(0.0, |nx| a.distance(nx));
                if new_cost + MIN_GAIN < old_cost {
                    order[i..=k].reverse();
                    pos[i..=k].reverse();
                    improved = true;
                }
            }
        }

        if !improved {
            break;
        }
    }

    order
}
