// Line-based serial channel to the motor controller
//
// The link is half-duplex: a reply can only be matched to its request if
// requests are never interleaved, so every user must hold exclusive access
// (`&mut`) for the whole exchange.

use serialport::{self, ClearBuffer, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::odrive::Result;

/// Something that carries request lines to the controller
pub trait LineChannel: Send {
    /// Write one line, no reply expected
    fn send(&mut self, line: &str) -> Result<()>;

    /// Write one line and wait up to `timeout` for a reply line.
    /// Returns an empty string when nothing arrived in time.
    fn send_and_receive(&mut self, line: &str, timeout: Duration) -> Result<String>;
}

/// Serial port carrying the ASCII protocol
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Open the port (8N1) and discard anything already buffered
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_millis(100))
            .open()?;
        port.clear(ClearBuffer::All)?;

        Ok(Self { port })
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        // Drop stale replies so the next read answers this request
        self.port.clear(ClearBuffer::Input)?;
        debug!("-> {}", line);
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }

    /// Read bytes until a newline or until the deadline passes
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.port.set_timeout(remaining)?;

            match self.port.read(&mut byte) {
                Ok(0) => continue,
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => line.push(byte[0]),
                Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Some(String::from_utf8_lossy(&line).trim().to_string()))
    }
}

impl LineChannel for SerialLink {
    fn send(&mut self, line: &str) -> Result<()> {
        self.write_line(line)
    }

    fn send_and_receive(&mut self, line: &str, timeout: Duration) -> Result<String> {
        self.write_line(line)?;
        match self.read_line(timeout)? {
            Some(response) => {
                debug!("<- {}", response);
                Ok(response)
            }
            None => {
                warn!("No response received for command: {}", line);
                Ok(String::new())
            }
        }
    }
}
