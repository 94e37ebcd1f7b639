//! World <-> screen transform for one map view.
//!
//! `screen = pan + world * scale`. The scale is always kept inside the
//! configured bounds; pan is unconstrained.

use waymark_protocol::ViewportView;

use crate::config::ViewportSettings;
use crate::geom::{Point2, Size, WorldBounds};

#[derive(Debug, Clone)]
pub struct Viewport {
    scale: f64,
    pan: Point2,
    size: Size,
    settings: ViewportSettings,
}

impl Viewport {
    pub fn new(settings: ViewportSettings) -> Self {
        Self {
            scale: 1.0,
            pan: Point2::ZERO,
            size: Size::default(),
            settings,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn pan(&self) -> Point2 {
        self.pan
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn settings(&self) -> &ViewportSettings {
        &self.settings
    }

    pub fn set_size(&mut self, size: Size) {
        let sane = |v: f64| if v.is_finite() { v.max(0.0) } else { 0.0 };
        self.size = Size::new(sane(size.width), sane(size.height));
    }

    pub fn set_pan(&mut self, pan: Point2) {
        if pan.is_finite() {
            self.pan = pan;
        }
    }

    pub fn pan_by(&mut self, delta: Point2) {
        self.set_pan(self.pan + delta);
    }

    /// Back to the identity transform; the size is kept.
    pub fn reset(&mut self) {
        self.scale = 1.0;
        self.pan = Point2::ZERO;
    }

    pub fn clamp_scale(&self, scale: f64) -> f64 {
        let s = if scale.is_finite() { scale } else { 1.0 };
        s.clamp(self.settings.min_scale, self.settings.max_scale)
    }

    pub fn world_to_screen(&self, world: Point2) -> Point2 {
        self.pan + world * self.scale
    }

    pub fn screen_to_world(&self, screen: Point2) -> Point2 {
        (screen - self.pan) * (1.0 / self.scale)
    }

    /// Scales the map to fill the viewport (minus padding) and centers it.
    pub fn fit(&mut self, size: Size, map_width: f64, map_height: f64) {
        self.set_size(size);
        let vw = self.size.width.max(1.0);
        let vh = self.size.height.max(1.0);
        let pad = self.settings.fit_padding_px;
        let s = ((vw - pad) / map_width).min((vh - pad) / map_height);
        self.scale = self.clamp_scale(s);
        self.pan = Point2::new(
            (vw - map_width * self.scale) / 2.0,
            (vh - map_height * self.scale) / 2.0,
        );
    }

    /// Zooms by `factor` while keeping the world point under `anchor` fixed.
    pub fn zoom_at(&mut self, anchor: Point2, factor: f64) {
        if !anchor.is_finite() || !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let world = self.screen_to_world(anchor);
        self.scale = self.clamp_scale(self.scale * factor);
        self.pan = anchor - world * self.scale;
    }

    pub fn zoom_in(&mut self) {
        let step = self.settings.zoom_step;
        self.zoom_at(self.size.center(), step);
    }

    pub fn zoom_out(&mut self) {
        let step = self.settings.zoom_step;
        self.zoom_at(self.size.center(), 1.0 / step);
    }

    pub fn wheel(&mut self, anchor: Point2, delta_y: f64) {
        let factor = if delta_y > 0.0 {
            self.settings.wheel_zoom_out
        } else {
            self.settings.wheel_zoom_in
        };
        self.zoom_at(anchor, factor);
    }

    /// Puts `world` at the viewport center without changing the scale.
    pub fn center_on(&mut self, world: Point2) {
        if !world.is_finite() {
            return;
        }
        self.pan = self.size.center() - world * self.scale;
    }

    pub fn center_on_at_scale(&mut self, world: Point2, factor: f64) {
        if factor.is_finite() && factor > 0.0 {
            self.scale = self.clamp_scale(self.scale * factor);
        }
        self.center_on(world);
    }

    /// World rectangle covered by the viewport grown by `padding_px` screen
    /// pixels on every side.
    pub fn world_bounds(&self, padding_px: f64) -> WorldBounds {
        world_bounds_for(self.size, self.pan, self.scale, padding_px)
    }

    pub fn view(&self) -> ViewportView {
        ViewportView {
            scale: self.scale,
            pan_x: self.pan.x,
            pan_y: self.pan.y,
            width: self.size.width,
            height: self.size.height,
        }
    }
}

pub fn world_bounds_for(size: Size, pan: Point2, scale: f64, padding_px: f64) -> WorldBounds {
    let finite_or = |v: f64, d: f64| if v.is_finite() { v } else { d };
    let scale = finite_or(scale, 1.0).abs().max(1e-6);
    let inv = 1.0 / scale;
    let pad = finite_or(padding_px, 0.0).max(0.0) * inv;
    let w = finite_or(size.width, 0.0);
    let h = finite_or(size.height, 0.0);
    let px = finite_or(pan.x, 0.0);
    let py = finite_or(pan.y, 0.0);

    WorldBounds {
        left: normalize_zero(-px * inv - pad),
        top: normalize_zero(-py * inv - pad),
        right: normalize_zero((w - px) * inv + pad),
        bottom: normalize_zero((h - py) * inv + pad),
    }
}

fn normalize_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}
