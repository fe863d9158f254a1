//! Geolocation attached to a submission, and the geofence the attendance
//! backend enforces against it.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A position fix, passed through to the submission sink untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported accuracy radius in metres, when the provider knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
        }
    }

    /// Great-circle distance to `other` in metres.
    pub fn distance_m(&self, other: &GeoLocation) -> f64 {
        haversine_m(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Haversine distance in metres between two latitude/longitude pairs (degrees).
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// One named area in which attendance may be recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceArea {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Admission radius in metres (inclusive).
    pub radius_m: f64,
}

impl GeofenceArea {
    fn centre(&self) -> GeoLocation {
        GeoLocation::new(self.latitude, self.longitude)
    }
}

/// Set of allowed areas. An empty fence admits every submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    #[serde(default, rename = "area")]
    pub areas: Vec<GeofenceArea>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeofenceDecision {
    /// No areas configured.
    Unrestricted,
    /// Inside the named area.
    Inside { area: String },
    /// Outside every area; carries the closest one and its distance.
    Outside { closest: Option<(String, f64)> },
    /// Areas are configured but the submission has no location.
    LocationRequired,
}

impl GeofenceDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Unrestricted | Self::Inside { .. })
    }

    /// User-facing explanation for a refusal; `None` when allowed.
    pub fn refusal_message(&self) -> Option<String> {
        match self {
            Self::Unrestricted | Self::Inside { .. } => None,
            Self::LocationRequired => Some(
                "Location (latitude & longitude) is required when geofencing is enabled"
                    .to_string(),
            ),
            Self::Outside { closest } => {
                let mut msg = "You are not within any allowed attendance area.".to_string();
                if let Some((name, dist)) = closest {
                    msg.push_str(&format!("\nClosest location: {name} ({dist:.0}m away)"));
                }
                Some(msg)
            }
        }
    }
}

impl Geofence {
    pub fn new(areas: Vec<GeofenceArea>) -> Self {
        Self { areas }
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Decide whether a submission from `location` is admitted.
    ///
    /// The first area containing the location wins.
    pub fn check(&self, location: Option<&GeoLocation>) -> GeofenceDecision {
        if self.areas.is_empty() {
            return GeofenceDecision::Unrestricted;
        }
        let Some(location) = location else {
            return GeofenceDecision::LocationRequired;
        };

        let mut closest: Option<(String, f64)> = None;
        for area in &self.areas {
            let dist = area.centre().distance_m(location);
            if dist <= area.radius_m {
                return GeofenceDecision::Inside {
                    area: area.name.clone(),
                };
            }
            if closest.as_ref().map_or(true, |(_, best)| dist < *best) {
                closest = Some((area.name.clone(), dist));
            }
        }

        GeofenceDecision::Outside { closest }
    }
}
