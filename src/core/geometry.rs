//! Beam propagation and earth geometry helpers
//!
//! All ranges are in km and all angles in degrees unless a name says otherwise.
//! The beam model uses the usual equivalent-earth approach: the beam travels
//! in a straight line over an earth of radius `ratio * EARTH_RADIUS_KM`.

/// Mean earth radius (km)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Standard atmosphere refraction ratio
pub const STANDARD_REFRACTION_RATIO: f64 = 4.0 / 3.0;

/// Straight-beam model over an equivalent earth
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamModel {
    pseudo_radius_km: f64,
    instrument_ht_km: f64,
}

impl BeamModel {
    pub fn new(instrument_ht_km: f64, pseudo_radius_ratio: f64) -> Self {
        Self {
            pseudo_radius_km: EARTH_RADIUS_KM * pseudo_radius_ratio,
            instrument_ht_km,
        }
    }

    /// 4/3 earth model
    pub fn standard(instrument_ht_km: f64) -> Self {
        Self::new(instrument_ht_km, STANDARD_REFRACTION_RATIO)
    }

    pub fn pseudo_radius_km(&self) -> f64 {
        self.pseudo_radius_km
    }

    pub fn instrument_ht_km(&self) -> f64 {
        self.instrument_ht_km
    }

    /// Beam height (km MSL) at a slant range along an elevation
    pub fn height_km(&self, elevation_deg: f64, slant_km: f64) -> f64 {
        let r = self.pseudo_radius_km;
        let sin_el = elevation_deg.to_radians().sin();
        (slant_km * slant_km + r * r + 2.0 * slant_km * r * sin_el).sqrt() - r + self.instrument_ht_km
    }

    /// Distance along the earth surface below the beam
    pub fn ground_range_km(&self, elevation_deg: f64, slant_km: f64) -> f64 {
        let r = self.pseudo_radius_km;
        let dz = self.height_km(elevation_deg, slant_km) - self.instrument_ht_km;
        let cos_el = elevation_deg.to_radians().cos();
        let s = (slant_km * cos_el / (r + dz)).clamp(-1.0, 1.0);
        r * s.asin()
    }

    /// Elevation angle and slant range from the radar to a point at the
    /// given ground range and height (km MSL)
    pub fn elevation_and_slant(&self, ground_km: f64, z_km: f64) -> (f64, f64) {
        let r = self.pseudo_radius_km;
        let theta = ground_km / r;
        let rt = r + (z_km - self.instrument_ht_km);
        let x = rt * theta.sin();
        let y = rt * theta.cos() - r;
        (y.atan2(x).to_degrees(), (x * x + y * y).sqrt())
    }

    /// Slant range at which a beam of the given elevation passes over a
    /// ground range. Infinite when the beam never gets there.
    pub fn slant_range_on_elevation(&self, elevation_deg: f64, ground_km: f64) -> f64 {
        let theta = ground_km / self.pseudo_radius_km;
        let denom = (elevation_deg.to_radians() + theta).cos();
        if denom <= 0.0 {
            return f64::INFINITY;
        }
        self.pseudo_radius_km * theta.sin() / denom
    }

    /// Position of a beam sample in the radar-local frame:
    /// x east, y north (along the ground), z up relative to the radar
    pub fn beam_position(&self, azimuth_deg: f64, elevation_deg: f64, slant_km: f64) -> [f64; 3] {
        let ground = self.ground_range_km(elevation_deg, slant_km);
        let dz = self.height_km(elevation_deg, slant_km) - self.instrument_ht_km;
        local_position(ground, azimuth_deg, dz)
    }
}

/// Radar-local position from ground range, azimuth and height above the radar
pub fn local_position(ground_km: f64, azimuth_deg: f64, dz_km: f64) -> [f64; 3] {
    let (sin_az, cos_az) = azimuth_deg.to_radians().sin_cos();
    [ground_km * sin_az, ground_km * cos_az, dz_km]
}

pub fn distance_sq(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Wrap an azimuth to [0, 360)
pub fn normalize_azimuth(azimuth_deg: f64) -> f64 {
    let az = azimuth_deg.rem_euclid(360.0);
    if az >= 360.0 {
        0.0
    } else {
        az
    }
}

/// Signed smallest difference `a - b`, in (-180, 180]
pub fn azimuth_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Azimuth (deg, clockwise from north) of a local x/y offset
pub fn azimuth_of(x_km: f64, y_km: f64) -> f64 {
    normalize_azimuth(x_km.atan2(y_km).to_degrees())
}

/// Great-circle range (km) and initial bearing (deg) between two points
pub fn latlon_to_range_bearing(lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> (f64, f64) {
    let phi0 = lat0.to_radians();
    let phi1 = lat1.to_radians();
    let dphi = phi1 - phi0;
    let dlambda = (lon1 - lon0).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi0.cos() * phi1.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();
    let range = EARTH_RADIUS_KM * c;

    let y = dlambda.sin() * phi1.cos();
    let x = phi0.cos() * phi1.sin() - phi0.sin() * phi1.cos() * dlambda.cos();
    let bearing = if range == 0.0 { 0.0 } else { normalize_azimuth(y.atan2(x).to_degrees()) };

    (range, bearing)
}

/// Destination point given a start, a great-circle range (km) and a bearing
pub fn range_bearing_to_latlon(lat0: f64, lon0: f64, range_km: f64, bearing_deg: f64) -> (f64, f64) {
    let phi0 = lat0.to_radians();
    let lambda0 = lon0.to_radians();
    let delta = range_km / EARTH_RADIUS_KM;
    let (sin_b, cos_b) = bearing_deg.to_radians().sin_cos();

    let sin_phi1 = phi0.sin() * delta.cos() + phi0.cos() * delta.sin() * cos_b;
    let phi1 = sin_phi1.clamp(-1.0, 1.0).asin();
    let lambda1 = lambda0 + (sin_b * delta.sin() * phi0.cos()).atan2(delta.cos() - phi0.sin() * sin_phi1);

    let lon1 = (lambda1.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    (phi1.to_degrees(), lon1)
}
