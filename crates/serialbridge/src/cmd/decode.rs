use std::fs;

use serialbridge_frame::{Reassembler, StreamEvent};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_event, print_summary, OutputFormat, Summary};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = match &args.file {
        Some(path) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        None => parse_hex(&args.hex)?,
    };

    let mut reassembler = Reassembler::new();
    reassembler.append(&bytes);

    let mut rejected = 0u64;
    for event in reassembler.poll() {
        if let StreamEvent::Rejected(_) = event {
            rejected += 1;
        }
        print_event(&event, format);
    }

    let stats = reassembler.stats();
    if args.stats {
        print_summary(
            &Summary::from_reassembler(stats, rejected, reassembler.buffered()),
            format,
        );
    }

    if stats.frames_decoded == 0 && !bytes.is_empty() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("no valid frames in {} byte(s)", bytes.len()),
        ));
    }
    Ok(SUCCESS)
}

/// Parse hex arguments. Whitespace, `:` and `,` separate bytes; `0x` prefixes are allowed.
fn parse_hex(args: &[String]) -> CliResult<Vec<u8>> {
    let mut digits = String::new();
    for token in args
        .iter()
        .flat_map(|arg| arg.split(|c: char| c.is_whitespace() || c == ':' || c == ','))
    {
        let token = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        digits.push_str(token);
    }

    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(CliError::new(
            DATA_INVALID,
            format!("invalid hex digit: {bad:?}"),
        ));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("odd number of hex digits ({})", digits.len()),
        ));
    }

    (0..digits.len())
        .step_by(2)
        .map(|at| {
            u8::from_str_radix(&digits[at..at + 2], 16)
                .map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex byte: {err}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parses_compact_and_spaced_hex() {
        assert_eq!(
            parse_hex(&args(&["AABB05"])).unwrap(),
            vec![0xAA, 0xBB, 0x05]
        );
        assert_eq!(
            parse_hex(&args(&["aa bb", "0x05", "01:02"])).unwrap(),
            vec![0xAA, 0xBB, 0x05, 0x01, 0x02]
        );
    }

    #[test]
    fn rejects_bad_hex() {
        assert_eq!(parse_hex(&args(&["ABC"])).unwrap_err().code, DATA_INVALID);
        assert_eq!(parse_hex(&args(&["ZZ"])).unwrap_err().code, DATA_INVALID);
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(parse_hex(&[]).unwrap().is_empty());
    }
}
