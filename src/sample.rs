//! Decoded TDS01V measurement

/// One complete set of readings from a measurement cycle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    /// Magnetic field X-axis (µT)
    pub mag_x: f32,
    /// Magnetic field Y-axis (µT)
    pub mag_y: f32,
    /// Magnetic field Z-axis (µT)
    pub mag_z: f32,
    /// Azimuth (degrees)
    pub azimuth: f32,
    /// Acceleration X-axis (g)
    pub acc_x: f32,
    /// Acceleration Y-axis (g)
    pub acc_y: f32,
    /// Acceleration Z-axis (g)
    pub acc_z: f32,
    /// Roll angle (degrees)
    pub roll: f32,
    /// Pitch angle (degrees)
    pub pitch: f32,
    /// Air pressure (hPa)
    pub air_pressure: f32,
    /// Altitude (m)
    pub altitude: i32,
    /// Chip internal temperature (°C)
    pub temperature: f32,
    /// Analog supply voltage (mV)
    pub voltage: i32,
}

impl Sample {
    /// Magnetic field vector (µT)
    pub fn mag(&self) -> (f32, f32, f32) {
        (self.mag_x, self.mag_y, self.mag_z)
    }

    /// Acceleration vector (g)
    pub fn acc(&self) -> (f32, f32, f32) {
        (self.acc_x, self.acc_y, self.acc_z)
    }

    /// Total field strength (µT)
    pub fn mag_magnitude(&self) -> f32 {
        (self.mag_x * self.mag_x + self.mag_y * self.mag_y + self.mag_z * self.mag_z).sqrt()
    }

    /// Total acceleration (g)
    pub fn acc_magnitude(&self) -> f32 {
        (self.acc_x * self.acc_x + self.acc_y * self.acc_y + self.acc_z * self.acc_z).sqrt()
    }
}
