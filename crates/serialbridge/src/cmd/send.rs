use std::sync::Arc;

use serialbridge_dispatch::{Dispatcher, DispatcherConfig};
use serialbridge_gateway::{CommandSender, MemorySink, Sink, SinkSet};
use serialbridge_transport::{SerialConfig, SerialStream};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{
    dispatch_error, gateway_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS,
    TRANSPORT_ERROR,
};
use crate::output::{print_command_log, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let config = SerialConfig::with_baud_rate(args.baud).with_timeout(timeout);
    let stream = SerialStream::open_device(&args.device, &config)
        .map_err(|err| transport_error("open failed", err))?;

    let dispatcher = Arc::new(
        Dispatcher::new(DispatcherConfig::default().with_max_workers(1))
            .map_err(|err| dispatch_error("dispatcher start failed", err))?,
    );
    let memory = Arc::new(MemorySink::new());
    let sender = CommandSender::new(
        stream,
        Arc::clone(&dispatcher),
        SinkSet::new().with(Arc::clone(&memory) as Arc<dyn Sink>),
    );

    sender
        .send(args.actuator, args.command, args.operator.as_deref())
        .map_err(|err| gateway_error("send failed", err))?;
    dispatcher
        .shutdown(timeout)
        .into_result()
        .map_err(|err| dispatch_error("send failed", err))?;

    let log = memory
        .commands()
        .pop()
        .ok_or_else(|| CliError::new(INTERNAL, "command finished without a log entry"))?;
    print_command_log(&log, format);

    if log.success {
        Ok(SUCCESS)
    } else {
        Err(CliError::new(
            TRANSPORT_ERROR,
            format!(
                "send failed: {}",
                log.error.as_deref().unwrap_or("unknown error")
            ),
        ))
    }
}
