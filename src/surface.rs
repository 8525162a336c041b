//! Map surface - the rendering-side services the controllers drive
//!
//! The egui viewer implements this for real; tests use `RecordingSurface`.

use geo::Rect;
use std::time::Duration;

use crate::features::FeatureId;
use crate::selection::InfoCard;

/// Screen-space margins kept free around a framed feature
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Padding {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub padding: Padding,
    pub max_zoom: f64,
    pub duration: Duration,
}

pub trait MapSurface {
    /// Animate the camera so `bounds` (lon/lat) fits inside the padded view
    fn fly_to_bounds(&mut self, bounds: Rect<f64>, options: &FitOptions);

    /// Open the info popup anchored to a parcel, replacing any open popup
    fn open_popup(&mut self, anchor: FeatureId, card: InfoCard);

    fn close_popup(&mut self);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Surface that records what the controllers asked for
    #[derive(Default)]
    pub(crate) struct RecordingSurface {
        pub flights: Vec<Rect<f64>>,
        pub popup: Option<(FeatureId, InfoCard)>,
        pub closed: usize,
    }

    impl MapSurface for RecordingSurface {
        fn fly_to_bounds(&mut self, bounds: Rect<f64>, _options: &FitOptions) {
            self.flights.push(bounds);
        }

        fn open_popup(&mut self, anchor: FeatureId, card: InfoCard) {
            self.popup = Some((anchor, card));
        }

        fn close_popup(&mut self) {
            self.popup = None;
            self.closed += 1;
        }
    }
}
