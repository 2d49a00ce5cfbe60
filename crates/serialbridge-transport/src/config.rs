use std::time::Duration;

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

/// Default line speed of the sensor boards.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read timeout of an opened port.
pub const DEFAULT_PORT_TIMEOUT: Duration = Duration::from_millis(200);

/// Line settings applied when a serial port is opened.
///
/// Defaults to 9600 baud, 8N1, no flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    /// How long a read waits for the first byte before returning `TimedOut`.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            timeout: DEFAULT_PORT_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// 8N1 at the given baud rate.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn builder(&self, path: &str) -> serialport::SerialPortBuilder {
        serialport::new(path, self.baud_rate)
            .data_bits(self.data_bits)
            .stop_bits(self.stop_bits)
            .parity(self.parity)
            .flow_control(self.flow_control)
            .timeout(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_9600_8n1() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.flow_control, FlowControl::None);
    }

    #[test]
    fn builders_override_single_settings() {
        let config = SerialConfig::with_baud_rate(115_200)
            .with_parity(Parity::Even)
            .with_stop_bits(StopBits::Two)
            .with_data_bits(DataBits::Seven)
            .with_timeout(Duration::from_millis(50));

        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::Two);
        assert_eq!(config.data_bits, DataBits::Seven);
        assert_eq!(config.timeout, Duration::from_millis(50));
    }
}
