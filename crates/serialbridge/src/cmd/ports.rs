use serialbridge_transport::available_ports;

use crate::cmd::PortsArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_ports, OutputFormat};

pub fn run(args: PortsArgs, format: OutputFormat) -> CliResult<i32> {
    let mut ports = available_ports().map_err(|err| transport_error("port scan failed", err))?;
    if args.usb {
        ports.retain(|port| port.kind == "usb");
    }
    print_ports(&ports, format);
    Ok(SUCCESS)
}
