//! Console helpers shared by the reader binary

use std::time::Instant;

/// Counts events and reports the average rate since creation
pub struct RateMeter {
    start: Instant,
    count: u64,
}

impl RateMeter {
    /// Create a new RateMeter starting now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            count: 0,
        }
    }

    /// Record one event
    pub fn tick(&mut self) {
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Average events per second, 0.0 before any time has passed
    pub fn rate_hz(&self) -> f64 {
        let elapsed = self.elapsed_secs();
        if elapsed > 0.0 {
            self.count as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Full-scale angle of [`tilt_gauge`]
pub const TILT_RANGE_DEG: f32 = 90.0;

/// Render a roll or pitch angle on a labelled ±90° gauge
///
/// `o` marks the angle and `|` marks level. The track is forced to an odd
/// number of cells so that 0° has a cell of its own.
///
/// # Example
/// ```
/// use tds01v_interface::tilt_gauge;
///
/// let gauge = tilt_gauge(45.0, 9);
/// assert_eq!(gauge, "-90° [----|-o--] +90°");
/// ```
pub fn tilt_gauge(angle_deg: f32, width: usize) -> String {
    let cells = width.max(3) | 1;
    let center = cells / 2;
    let normalized = (angle_deg / TILT_RANGE_DEG).clamp(-1.0, 1.0);
    let marker = (center as f32 * (1.0 + normalized)).round() as usize;

    let track: String = (0..cells)
        .map(|i| match i {
            _ if i == marker => 'o',
            _ if i == center => '|',
            _ => '-',
        })
        .collect();

    format!("-{0:.0}° [{1}] +{0:.0}°", TILT_RANGE_DEG, track)
}

/// Eight-point compass direction of an azimuth in degrees
pub fn compass_point(azimuth_deg: f32) -> &'static str {
    const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let sector = ((azimuth_deg.rem_euclid(360.0) + 22.5) / 45.0) as usize;
    POINTS[sector % POINTS.len()]
}
