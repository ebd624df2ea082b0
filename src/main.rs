//! TDS01V sensor reader - Timed data acquisition and display
//!
//! Opens the sensor module, streams measurements for a fixed time and prints
//! every sample to the console.
//!
//! Usage:
//!   tds01v-reader --port /dev/ttyUSB0 --duration 10

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use clap::Parser;
use log::info;
use tds01v_interface::{
    compass_point, tilt_gauge, ConnectionConfig, RateMeter, Sample, Tds01v, Tds01vError,
    DEFAULT_DEVICE_PATH,
};

#[derive(Parser, Debug)]
#[command(name = "tds01v-reader")]
#[command(about = "Stream TDS01V magnetometer, accelerometer and barometer readings", long_about = None)]
struct Args {
    /// Serial device of the sensor module
    #[arg(short, long, default_value = DEFAULT_DEVICE_PATH)]
    port: String,

    /// Acquisition time in seconds (Ctrl+C stops early)
    #[arg(short, long, default_value = "10")]
    duration: u64,

    /// Response timeout in milliseconds (blocks indefinitely if omitted)
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Give up after this many busy status answers during reset
    #[arg(long)]
    idle_poll_limit: Option<u32>,

    /// Print one compact line per sample instead of the full field list
    #[arg(short, long)]
    compact: bool,
}

impl Args {
    fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::default().with_device_path(self.port.as_str());
        if let Some(ms) = self.timeout_ms {
            config = config.with_read_timeout(Duration::from_millis(ms));
        }
        if let Some(limit) = self.idle_poll_limit {
            config = config.with_idle_poll_limit(limit);
        }
        config
    }
}

fn print_sample(sample: &Sample, meter: &RateMeter) {
    println!(
        "[{}] sample #{} ({:.1} Hz)",
        Local::now().format("%H:%M:%S%.3f"),
        meter.count(),
        meter.rate_hz()
    );
    println!("  mag_x={:.1} mag_y={:.1} mag_z={:.1} µT", sample.mag_x, sample.mag_y, sample.mag_z);
    println!("  azimuth={:.1}° ({})", sample.azimuth, compass_point(sample.azimuth));
    println!("  acc_x={:.2} acc_y={:.2} acc_z={:.2} g", sample.acc_x, sample.acc_y, sample.acc_z);
    println!("  roll ={:6.1}° {}", sample.roll, tilt_gauge(sample.roll, 41));
    println!("  pitch={:6.1}° {}", sample.pitch, tilt_gauge(sample.pitch, 41));
    println!("  air_pressure={:.1} hPa altitude={} m", sample.air_pressure, sample.altitude);
    println!("  temperature={:.1} °C voltage={} mV", sample.temperature, sample.voltage);
}

fn print_compact(sample: &Sample, meter: &RateMeter) {
    println!(
        "{} #{:<6} az {:6.1}° {:<2} |B| {:6.1} µT |a| {:5.2} g roll {:6.1}° pitch {:6.1}° {:7.1} hPa {:5} m {:5.1} °C {:5} mV",
        Local::now().format("%H:%M:%S%.3f"),
        meter.count(),
        sample.azimuth,
        compass_point(sample.azimuth),
        sample.mag_magnitude(),
        sample.acc_magnitude(),
        sample.roll,
        sample.pitch,
        sample.air_pressure,
        sample.altitude,
        sample.temperature,
        sample.voltage
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    println!("TDS01V Sensor Reader");
    println!("====================");
    println!("Device: {}", args.port);
    println!("Duration: {} seconds", args.duration);
    println!("Resetting sensor...");

    let config = args.connection_config();
    let mut sensor = match Tds01v::open_with(&config) {
        Ok(s) => {
            println!("Sensor ready!\n");
            s
        }
        Err(e @ Tds01vError::OpenFailed { .. }) => {
            eprintln!("Error: {}", e);
            eprintln!("Please check:");
            eprintln!("  1. The TDS01V is connected and shows up as {}", args.port);
            eprintln!("  2. You have read/write permission on the device node");
            eprintln!("  3. No other application is using the port");
            return Err(Box::new(e));
        }
        Err(e) => {
            eprintln!("Error opening sensor: {}", e);
            return Err(Box::new(e));
        }
    };

    let compact = args.compact;
    let mut meter = RateMeter::new();
    sensor.register_callback(move |sample| {
        meter.tick();
        if compact {
            print_compact(sample, &meter);
        } else {
            print_sample(sample, &meter);
        }
    })?;

    // Setup Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let stop = sensor.stop_handle();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping acquisition...");
        r.store(false, Ordering::SeqCst);
        stop.stop();
    })?;

    let started = Instant::now();
    let end_time = started + Duration::from_secs(args.duration);
    sensor.start()?;
    info!("acquiring for {} s", args.duration);

    while running.load(Ordering::SeqCst) && Instant::now() < end_time {
        if sensor.is_finalized() {
            eprintln!("Acquisition ended early");
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    sensor.stop();
    let stats = sensor.close()?;
    let elapsed = started.elapsed().as_secs_f64();

    println!("\nAcquisition complete!");
    println!("Cycles: {}", stats.cycles);
    println!("Samples: {}", stats.samples);
    println!("Not accepted: {}", stats.not_accepted);
    println!("Malformed frames: {}", stats.malformed_frames);
    println!("Timeouts: {}", stats.timeouts);
    println!("Elapsed time: {:.2} seconds", elapsed);
    if elapsed > 0.0 {
        println!("Sample rate: {:.1} Hz", stats.samples as f64 / elapsed);
    }
    if let Some(reason) = stats.fatal_error {
        eprintln!("Stopped by error: {}", reason);
    }

    Ok(())
}
