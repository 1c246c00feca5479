//! Fake position value type and coordinate validation.

use std::time::Instant;

use crate::error::ValidationError;

/// A fabricated geographic fix substituted for real sensor output.
///
/// Coordinates are validated at construction, so a `FakePosition` that
/// exists is always in range: latitude in [-90, 90], longitude in
/// [-180, 180], accuracy non-negative, all fields finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FakePosition {
    latitude: f64,
    longitude: f64,
    horizontal_accuracy: f64,
    timestamp: Instant,
}

impl FakePosition {
    /// Build a position from raw coordinates, stamped with the current time.
    pub fn new(
        latitude: f64,
        longitude: f64,
        horizontal_accuracy: f64,
    ) -> Result<Self, ValidationError> {
        validate(latitude, longitude, horizontal_accuracy)?;
        Ok(Self {
            latitude,
            longitude,
            horizontal_accuracy,
            timestamp: Instant::now(),
        })
    }

    /// The fix in force before any command has arrived: 0/0 with zero
    /// accuracy. Listeners attached early see this as their first
    /// "previous" value.
    #[must_use]
    pub fn origin() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            horizontal_accuracy: 0.0,
            timestamp: Instant::now(),
        }
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    #[must_use]
    pub fn horizontal_accuracy(&self) -> f64 {
        self.horizontal_accuracy
    }

    /// When this fix was fabricated.
    #[must_use]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// The coordinate triple, for comparisons that ignore the timestamp.
    #[must_use]
    pub fn triple(&self) -> (f64, f64, f64) {
        (self.latitude, self.longitude, self.horizontal_accuracy)
    }
}

fn validate(latitude: f64, longitude: f64, accuracy: f64) -> Result<(), ValidationError> {
    for (field, value) in [
        ("latitude", latitude),
        ("longitude", longitude),
        ("horizontal accuracy", accuracy),
    ] {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite { field });
        }
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ValidationError::LatitudeOutOfRange(latitude));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ValidationError::LongitudeOutOfRange(longitude));
    }
    if accuracy < 0.0 {
        return Err(ValidationError::NegativeAccuracy(accuracy));
    }
    Ok(())
}
