//! Auto edge-scroll while a gesture holds the pointer near the viewport edge.
//!
//! The host owns the repeating timer. `update` reports when proximity is
//! entered or left so the host can start or stop it; each timer tick calls
//! the engine, which shifts the viewport by `delta` and reapplies the
//! active gesture.

use dc_core::geometry::{Point, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollChange {
    Started,
    Stopped,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeScroll {
    threshold: f64,
    step: f64,
    /// Per-axis direction (-1, 0, 1) while active.
    direction: Option<(f64, f64)>,
}

fn axis_direction(pos: f64, extent: f64, threshold: f64) -> f64 {
    if pos < threshold {
        -1.0
    } else if pos > extent - threshold {
        1.0
    } else {
        0.0
    }
}

impl EdgeScroll {
    pub fn new(threshold: f64, step: f64) -> Self {
        Self {
            threshold,
            step,
            direction: None,
        }
    }

    /// Track the pointer (client coordinates) during a gesture.
    pub fn update(&mut self, client: Point, viewport: &Viewport) -> ScrollChange {
        let dir = (
            axis_direction(client.x, viewport.width, self.threshold),
            axis_direction(client.y, viewport.height, self.threshold),
        );
        let near = dir != (0.0, 0.0);
        match (self.direction.is_some(), near) {
            (false, true) => {
                self.direction = Some(dir);
                log::debug!("edge scroll started {dir:?}");
                ScrollChange::Started
            }
            (true, false) => {
                self.stop();
                ScrollChange::Stopped
            }
            (true, true) => {
                self.direction = Some(dir);
                ScrollChange::Unchanged
            }
            (false, false) => ScrollChange::Unchanged,
        }
    }

    pub fn stop(&mut self) {
        if self.direction.take().is_some() {
            log::debug!("edge scroll stopped");
        }
    }

    /// Canvas-space viewport offset for one tick.
    pub fn delta(&self, zoom: f64) -> Option<(f64, f64)> {
        let (dx, dy) = self.direction?;
        let zoom = if zoom > 0.0 { zoom } else { 1.0 };
        Some((dx * self.step / zoom, dy * self.step / zoom))
    }
}
