use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::prelude::*;
use serialbridge_frame::{kinds, Frame, FrameWriter, StreamEvent};
use serialbridge_transport::{SerialConfig, SerialStream};
use tracing::info;

use crate::cmd::{install_ctrlc_handler, parse_duration, SimulateArgs};
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

/// Longest uninterrupted sleep between stop-flag checks.
const STOP_CHECK: Duration = Duration::from_millis(50);

/// Board sensors: id, type code and the value range it reports.
const SENSORS: [(u8, u8, f32, f32); 3] = [
    (1, kinds::TEMPERATURE, 20.0, 30.0),
    (2, kinds::PRESSURE, 100.0, 150.0),
    (3, kinds::HUMIDITY, 40.0, 60.0),
];

/// Random readings from the three board sensors.
pub(crate) struct MockSensors {
    rng: StdRng,
}

impl MockSensors {
    pub(crate) fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub(crate) fn next_frame(&mut self) -> Frame {
        let (id, data_type, low, high) = SENSORS[self.rng.gen_range(0..SENSORS.len())];
        Frame::sensor(id, data_type, self.rng.gen_range(low..high))
    }
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let config = SerialConfig::with_baud_rate(args.baud);
    let stream = SerialStream::open_device(&args.device, &config)
        .map_err(|err| transport_error("open failed", err))?;

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&stop))?;

    info!(
        device = %args.device.display(),
        interval_ms = interval.as_millis() as u64,
        "simulating"
    );
    let mut sensors = MockSensors::new(args.seed);
    let mut writer = FrameWriter::new(stream);
    let mut sent = 0u64;

    while args.count.is_none_or(|count| sent < count) && !stop.load(Ordering::Acquire) {
        if sent > 0 {
            pause(interval, &stop);
            if stop.load(Ordering::Acquire) {
                break;
            }
        }
        let frame = sensors.next_frame();
        writer
            .write_frame(&frame)
            .map_err(|err| frame_error("write failed", err))?;
        print_event(&StreamEvent::Frame(frame), format);
        sent += 1;
    }

    info!(frames = sent, "simulation finished");
    Ok(SUCCESS)
}

fn pause(interval: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + interval;
    loop {
        let now = Instant::now();
        if now >= deadline || stop.load(Ordering::Acquire) {
            return;
        }
        thread::sleep(STOP_CHECK.min(deadline - now));
    }
}
