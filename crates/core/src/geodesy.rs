//! Projection math: WGS84 degrees -> Albers equal-area metres.
//!
//! Ellipsoidal Albers after Snyder, *Map Projections: A Working Manual*
//! (USGS PP 1395), eqs. 14-3 through 14-21. NAD83 and WGS84 are treated as
//! the same datum; the difference is about a metre, far below the 30 m
//! land-cover cell size.

use crate::types::MapPoint;
use serde::Serialize;

/// Reference ellipsoid: semi-major axis and first eccentricity squared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    pub a: f64,
    pub e2: f64,
}

impl Ellipsoid {
    /// GRS80, the NAD83 ellipsoid.
    pub const GRS80: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        e2: 0.006_694_380_022_90,
    };
}

/// Defining parameters of an Albers grid. Angles in degrees, offsets in
/// metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlbersParams {
    pub lat1: f64,
    pub lat2: f64,
    pub lat0: f64,
    pub lon0: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

impl AlbersParams {
    /// EPSG:5070.
    pub const CONUS: AlbersParams = AlbersParams {
        lat1: 29.5,
        lat2: 45.5,
        lat0: 23.0,
        lon0: -96.0,
        false_easting: 0.0,
        false_northing: 0.0,
    };
}

/// Albers conic equal-area projection on an ellipsoid.
#[derive(Debug, Clone, Copy)]
pub struct AlbersEqualArea {
    a: f64,
    e2: f64,
    e: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
    n: f64,
    c: f64,
    rho0: f64,
}

impl AlbersEqualArea {
    /// Builds a projection. Angles in degrees, offsets in metres.
    pub fn new(
        ellipsoid: Ellipsoid,
        lat1: f64,
        lat2: f64,
        lat0: f64,
        lon0: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let e2 = ellipsoid.e2;
        let e = e2.sqrt();
        let (phi1, phi2, phi0) = (lat1.to_radians(), lat2.to_radians(), lat0.to_radians());

        let m1 = m(phi1, e2);
        let m2 = m(phi2, e2);
        let q0 = q(phi0, e, e2);
        let q1 = q(phi1, e, e2);
        let q2 = q(phi2, e, e2);

        let n = if (lat1 - lat2).abs() < 1e-10 {
            phi1.sin()
        } else {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        };
        let c = m1 * m1 + n * q1;
        let rho0 = ellipsoid.a * (c - n * q0).sqrt() / n;

        Self {
            a: ellipsoid.a,
            e2,
            e,
            lon0: lon0.to_radians(),
            false_easting,
            false_northing,
            n,
            c,
            rho0,
        }
    }

    /// GRS80 projection from grid parameters.
    pub fn from_params(p: AlbersParams) -> Self {
        Self::new(
            Ellipsoid::GRS80,
            p.lat1,
            p.lat2,
            p.lat0,
            p.lon0,
            p.false_easting,
            p.false_northing,
        )
    }

    /// NAD83 / Conus Albers (EPSG:5070), the grid of the NLCD rasters.
    pub fn conus() -> Self {
        Self::from_params(AlbersParams::CONUS)
    }

    /// Projects geographic degrees to map metres.
    pub fn forward(&self, lon: f64, lat: f64) -> MapPoint {
        let phi = lat.to_radians();
        let q = q(phi, self.e, self.e2);
        // Clamp tiny negatives produced at the poles.
        let rho = self.a * (self.c - self.n * q).max(0.0).sqrt() / self.n;
        let theta = self.n * normalize_lon(lon.to_radians() - self.lon0);

        MapPoint {
            x: self.false_easting + rho * theta.sin(),
            y: self.false_northing + self.rho0 - rho * theta.cos(),
        }
    }

    /// Inverse projection, returning `(lon, lat)` in degrees.
    pub fn inverse(&self, point: MapPoint) -> (f64, f64) {
        let x = point.x - self.false_easting;
        let dy = self.rho0 - (point.y - self.false_northing);
        let sign = self.n.signum();

        let rho = (x * x + dy * dy).sqrt();
        let theta = (x * sign).atan2(dy * sign);
        let q = (self.c - (rho * self.n / self.a).powi(2)) / self.n;

        let lat = self.latitude_from_q(q);
        let lon = normalize_lon(self.lon0 + theta / self.n);
        (lon.to_degrees(), lat.to_degrees())
    }

    fn latitude_from_q(&self, q: f64) -> f64 {
        let mut phi = (q / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..16 {
            let sin_phi = phi.sin();
            let cos_phi = phi.cos();
            if cos_phi.abs() < 1e-12 {
                break;
            }
            let one_minus = 1.0 - self.e2 * sin_phi * sin_phi;
            let delta = one_minus * one_minus / (2.0 * cos_phi)
                * (q / (1.0 - self.e2) - sin_phi / one_minus
                    + (1.0 / (2.0 * self.e))
                        * ((1.0 - self.e * sin_phi) / (1.0 + self.e * sin_phi)).ln());
            phi += delta;
            if delta.abs() < 1e-12 {
                break;
            }
        }
        phi
    }
}

/// Snyder eq. 14-15.
fn m(phi: f64, e2: f64) -> f64 {
    let s = phi.sin();
    phi.cos() / (1.0 - e2 * s * s).sqrt()
}

/// Snyder eq. 3-12.
fn q(phi: f64, e: f64, e2: f64) -> f64 {
    let s = phi.sin();
    (1.0 - e2)
        * (s / (1.0 - e2 * s * s) - (1.0 / (2.0 * e)) * ((1.0 - e * s) / (1.0 + e * s)).ln())
}

fn normalize_lon(mut lambda: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    while lambda > PI {
        lambda -= TAU;
    }
    while lambda < -PI {
        lambda += TAU;
    }
    lambda
}

/// Steps `dist_m` metres from `origin` along a grid bearing.
///
/// Planar offset in projected space, which is what the sampling radius
/// (at most a few kilometres) calls for.
pub fn destination_point(origin: MapPoint, bearing_deg: f64, dist_m: f64) -> MapPoint {
    let a = bearing_deg.to_radians();
    MapPoint {
        x: origin.x + dist_m * a.sin(),
        y: origin.y + dist_m * a.cos(),
    }
}
