use waymark_protocol::Marker;

use crate::geom::Point2;
use crate::viewport::Viewport;

/// Markers whose coordinates fall inside the padded viewport.
///
/// Before the viewport has a size every positioned marker counts as visible.
/// Markers without coordinates are never returned.
pub fn visible_markers<'a>(
    markers: &'a [Marker],
    viewport: &Viewport,
    padding_px: f64,
) -> Vec<&'a Marker> {
    let positioned = markers.iter().filter(|m| m.position().is_some());
    if viewport.size().is_empty() {
        return positioned.collect();
    }

    let bounds = viewport.world_bounds(padding_px);
    positioned
        .filter(|m| {
            m.position()
                .is_some_and(|(x, y)| bounds.contains(Point2::new(x, y)))
        })
        .collect()
}
