pub mod analytics;
pub mod movie;
pub mod rating;

/// Rounds half away from zero to `places` decimals, like SQL `ROUND(numeric, n)`.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
