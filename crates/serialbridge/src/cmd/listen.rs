use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serialbridge_dispatch::{Dispatcher, DispatcherConfig, LoadMonitor, TaskResult};
use serialbridge_frame::{DecodeError, FrameConfig, FrameReader};
use serialbridge_gateway::{CommandEcho, Gateway, SensorReading, Sink, SinkSet};
use serialbridge_transport::{is_serial_device, SerialConfig, SerialStream, TransportError};
use tracing::{debug, info};

use crate::cmd::{install_ctrlc_handler, parse_duration, ListenArgs};
use crate::exit::{
    dispatch_error, gateway_error, transport_error, CliError, CliResult, SUCCESS, USAGE,
};
use crate::output::{print_echo, print_reading, print_summary, OutputFormat, Summary};

/// Prints every reading and echo as it is handled.
struct PrintSink {
    format: OutputFormat,
}

impl Sink for PrintSink {
    fn on_sensor(&self, reading: &SensorReading) -> TaskResult {
        print_reading(reading, self.format);
        Ok(())
    }

    fn on_command(&self, echo: &CommandEcho) -> TaskResult {
        print_echo(echo, self.format);
        Ok(())
    }

    fn on_decode_error(&self, error: &DecodeError) -> TaskResult {
        debug!(error = %error, "decode error");
        Ok(())
    }
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    if args.workers == 0 {
        return Err(CliError::new(USAGE, "--workers must be at least 1"));
    }
    let read_timeout = parse_duration(&args.read_timeout)?;
    let stats_interval = parse_duration(&args.stats_interval)?;

    // Captures replay read-only; a serial device gets line settings and a
    // read timeout so Ctrl-C is seen while the line is quiet.
    let mut stream = if is_serial_device(&args.device) {
        let config = SerialConfig::with_baud_rate(args.baud).with_timeout(read_timeout);
        SerialStream::open_port(&args.device, &config)
    } else {
        SerialStream::open_read_only(&args.device)
    }
    .map_err(|err| transport_error("open failed", err))?;
    match stream.set_read_timeout(Some(read_timeout)) {
        Ok(()) => {}
        Err(TransportError::Unsupported { kind, .. }) => {
            debug!(kind, "read timeout unavailable; Ctrl-C takes effect on next read");
        }
        Err(err) => return Err(transport_error("configure failed", err)),
    }

    let config = DispatcherConfig::default().with_max_workers(args.workers);
    let shutdown_timeout = config.shutdown_timeout;
    let dispatcher = Arc::new(
        Dispatcher::new(config).map_err(|err| dispatch_error("dispatcher start failed", err))?,
    );
    let monitor = if args.stats {
        Some(
            LoadMonitor::spawn(dispatcher.gauge(), stats_interval)
                .map_err(|err| dispatch_error("monitor start failed", err))?,
        )
    } else {
        None
    };

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&stop))?;

    info!(device = %args.device.display(), "listening");
    let sinks = SinkSet::new().with(Arc::new(PrintSink { format }));
    let reader = FrameReader::with_config(stream, FrameConfig::default());
    let mut gateway = Gateway::from_reader(reader, Arc::clone(&dispatcher), sinks);

    let outcome = gateway.run_until(&stop, args.count);
    let report = dispatcher.shutdown(shutdown_timeout);
    drop(monitor);
    let stats = outcome.map_err(|err| gateway_error("listen failed", err))?;

    if args.stats {
        let reassembly = gateway.reassembler_stats();
        let summary = Summary::from_reassembler(reassembly, stats.rejected, gateway.buffered())
            .with_gateway(&stats, &dispatcher.snapshot());
        print_summary(&summary, format);
    }

    report
        .into_result()
        .map_err(|err| dispatch_error("shutdown", err))?;
    Ok(SUCCESS)
}
