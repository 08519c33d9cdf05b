//! Serial port configuration and connection management
//!
//! Handles USB UART discovery and the console connection to the target.

use super::{decode_line, Endpoint};
use anyhow::{Context, Result};
use colored::Colorize;
use log::debug;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Default console baud rate for PX4/NuttX targets
pub const DEFAULT_BAUD: u32 = 57600;

/// Default pattern used to pick the USB UART adapter
pub const DEFAULT_DEVICE_MATCH: &str = "USB UART";

/// Configuration for serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyUSB0, /dev/ttyACM0)
    pub port_path: String,
    /// Baud rate (default: 57600)
    pub baud_rate: u32,
    /// Data bits (default: 8)
    pub data_bits: DataBits,
    /// Parity (default: None)
    pub parity: Parity,
    /// Stop bits (default: 1)
    pub stop_bits: StopBits,
    /// Flow control (default: None)
    pub flow_control: FlowControl,
    /// Longest a single line read may block
    pub timeout: Duration,
    /// Gap after which a partially received line is handed back
    pub inter_byte_timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::from("/dev/ttyUSB0"),
            baud_rate: DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: Duration::from_secs(3),
            inter_byte_timeout: Duration::from_secs(1),
        }
    }
}

impl PortConfig {
    /// Create a new 8N1 configuration with default timeouts
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the inter-byte timeout
    pub fn with_inter_byte_timeout(mut self, timeout: Duration) -> Self {
        self.inter_byte_timeout = timeout;
        self
    }
}

/// Wrapper around the target's console port
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    config: PortConfig,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration
    pub fn open(config: PortConfig) -> Result<Self> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()
            .with_context(|| format!("Failed to open serial port: {}", config.port_path))?;

        debug!(
            "opened {} at {} baud (timeout {:?}, inter-byte {:?})",
            config.port_path, config.baud_rate, config.timeout, config.inter_byte_timeout
        );

        Ok(Self { port, config })
    }

    /// Read raw bytes up to and including `\n`.
    ///
    /// Stops early once the read timeout has elapsed, or once the line has
    /// started and the sender goes quiet for longer than the inter-byte
    /// timeout. Timeouts are not errors; whatever arrived is returned.
    pub fn read_raw_line(&mut self) -> io::Result<Vec<u8>> {
        let deadline = Instant::now() + self.config.timeout;
        let mut buffer = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let mut wait = deadline - now;
            if !buffer.is_empty() {
                wait = wait.min(self.config.inter_byte_timeout);
            }
            self.port.set_timeout(wait)?;

            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    buffer.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::TimedOut => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(buffer)
    }
}

impl Endpoint for SerialConnection {
    fn read_line(&mut self) -> io::Result<String> {
        let raw = self.read_raw_line()?;
        Ok(decode_line(&raw))
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}

/// Information about a detected serial port
#[derive(Debug, Clone, PartialEq)]
pub struct PortInfo {
    pub path: String,
    pub port_type: PortType,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PortType {
    UsbSerial,
    PciSerial,
    Bluetooth,
    Unknown,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortType::UsbSerial => write!(f, "USB Serial"),
            PortType::PciSerial => write!(f, "PCI Serial"),
            PortType::Bluetooth => write!(f, "Bluetooth"),
            PortType::Unknown => write!(f, "Unknown"),
        }
    }
}

impl PortInfo {
    /// Short port name (last path component)
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Human readable description, the USB product string when available
    pub fn description(&self) -> String {
        match (&self.product, &self.manufacturer) {
            (Some(prod), _) => prod.clone(),
            (None, Some(mfg)) => mfg.clone(),
            (None, None) => "n/a".to_string(),
        }
    }

    /// Hardware id in the form `USB VID:PID=0403:6001 SER=A1B2`
    pub fn hwid(&self) -> String {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => {
                let mut id = format!("USB VID:PID={:04X}:{:04X}", vid, pid);
                if let Some(ref sn) = self.serial_number {
                    id.push_str(&format!(" SER={}", sn));
                }
                id
            }
            _ => "n/a".to_string(),
        }
    }

    /// Case-insensitive match against path, description and hwid
    pub fn matches(&self, pattern: &str) -> bool {
        let pattern = pattern.to_lowercase();
        [self.path.clone(), self.description(), self.hwid()]
            .iter()
            .any(|field| field.to_lowercase().contains(&pattern))
    }
}

/// List all available serial ports
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().with_context(|| "Failed to enumerate serial ports")?;

    let port_infos: Vec<PortInfo> = ports
        .into_iter()
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    PortType::UsbSerial,
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::PciPort => {
                    (PortType::PciSerial, None, None, None, None, None)
                }
                serialport::SerialPortType::BluetoothPort => {
                    (PortType::Bluetooth, None, None, None, None, None)
                }
                serialport::SerialPortType::Unknown => {
                    (PortType::Unknown, None, None, None, None, None)
                }
            };

            PortInfo {
                path: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect();

    Ok(port_infos)
}

/// Pick the default device: only when exactly one port matches the pattern
pub fn select_default_device(ports: Vec<PortInfo>, pattern: &str) -> Option<PortInfo> {
    let mut matching: Vec<PortInfo> = ports.into_iter().filter(|p| p.matches(pattern)).collect();

    if matching.len() == 1 {
        matching.pop()
    } else {
        debug!(
            "{} ports match {:?}, no default device selected",
            matching.len(),
            pattern
        );
        None
    }
}

/// Discover the default device among the connected serial ports
pub fn discover_default_device(pattern: &str) -> Result<Option<PortInfo>> {
    Ok(select_default_device(list_ports()?, pattern))
}

/// Print details of the auto-selected device
pub fn print_default_device(port: &PortInfo) {
    println!("Default USB UART port: {}", port.name().white().bold());
    println!(" device: {}", port.path);
    println!(" description: \"{}\"", port.description());
    println!(" hwid: {}", port.hwid());
    println!(
        " manufacturer: {}",
        port.manufacturer.as_deref().unwrap_or("n/a")
    );
}

/// Print formatted list of available serial ports
pub fn print_ports() -> Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("\n{}", "Troubleshooting tips:".cyan().bold());
        println!("  1. Connect the USB UART adapter of the test rig");
        println!("  2. Check if the device is recognized: ls -la /dev/ttyUSB* /dev/ttyACM*");
        println!("  3. Add your user to the 'dialout' group: sudo usermod -aG dialout $USER");
        return Ok(());
    }

    println!("{}", "Available Serial Ports:".green().bold());
    println!("{}", "=".repeat(60));

    for port in ports {
        println!("\n{}: {}", "Port".cyan(), port.path.white().bold());
        println!("  Type: {}", port.port_type);
        println!("  Description: {}", port.description());
        println!("  HWID: {}", port.hwid());

        if let Some(ref mfg) = port.manufacturer {
            println!("  Manufacturer: {}", mfg);
        }
    }

    println!("\n{}", "=".repeat(60));
    println!(
        "{}",
        "Use: hil-monitor --device <PORT> to start monitoring".yellow()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb_port(path: &str, product: &str) -> PortInfo {
        PortInfo {
            path: path.to_string(),
            port_type: PortType::UsbSerial,
            manufacturer: Some("FTDI".to_string()),
            product: Some(product.to_string()),
            serial_number: Some("A10KXYZ".to_string()),
            vid: Some(0x0403),
            pid: Some(0x6001),
        }
    }

    fn plain_port(path: &str) -> PortInfo {
        PortInfo {
            path: path.to_string(),
            port_type: PortType::PciSerial,
            manufacturer: None,
            product: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    #[test]
    fn test_default_config() {
        let config = PortConfig::default();
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.port_path, "/dev/ttyUSB0");
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.flow_control, FlowControl::None);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.inter_byte_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_config_builder() {
        let config = PortConfig::new("/dev/ttyACM0")
            .with_baud_rate(921600)
            .with_timeout(Duration::from_secs(1))
            .with_inter_byte_timeout(Duration::from_millis(200));

        assert_eq!(config.port_path, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 921600);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.inter_byte_timeout, Duration::from_millis(200));
    }

    #[test]
    fn test_port_info_fields() {
        let port = usb_port("/dev/ttyUSB3", "FT232R USB UART");
        assert_eq!(port.name(), "ttyUSB3");
        assert_eq!(port.description(), "FT232R USB UART");
        assert_eq!(port.hwid(), "USB VID:PID=0403:6001 SER=A10KXYZ");

        let pci = plain_port("/dev/ttyS0");
        assert_eq!(pci.description(), "n/a");
        assert_eq!(pci.hwid(), "n/a");
    }

    #[test]
    fn test_select_unique_match() {
        let ports = vec![
            plain_port("/dev/ttyS0"),
            usb_port("/dev/ttyUSB0", "FT232R USB UART"),
            usb_port("/dev/ttyACM0", "PX4 FMU v5.x"),
        ];

        let selected = select_default_device(ports, DEFAULT_DEVICE_MATCH).unwrap();
        assert_eq!(selected.path, "/dev/ttyUSB0");
    }

    #[test]
    fn test_select_is_case_insensitive() {
        let ports = vec![usb_port("/dev/ttyUSB0", "ft232r usb uart")];
        assert!(select_default_device(ports, "USB UART").is_some());
    }

    #[test]
    fn test_select_matches_hwid() {
        let ports = vec![
            usb_port("/dev/ttyUSB0", "adapter"),
            plain_port("/dev/ttyS0"),
        ];
        let selected = select_default_device(ports, "0403:6001").unwrap();
        assert_eq!(selected.path, "/dev/ttyUSB0");
    }

    #[test]
    fn test_select_ambiguous_or_missing() {
        let ambiguous = vec![
            usb_port("/dev/ttyUSB0", "FT232R USB UART"),
            usb_port("/dev/ttyUSB1", "FT232R USB UART"),
        ];
        assert!(select_default_device(ambiguous, DEFAULT_DEVICE_MATCH).is_none());

        let missing = vec![plain_port("/dev/ttyS0")];
        assert!(select_default_device(missing, DEFAULT_DEVICE_MATCH).is_none());
        assert!(select_default_device(Vec::new(), DEFAULT_DEVICE_MATCH).is_none());
    }

    #[cfg(unix)]
    fn pty_connection(
        timeout: Duration,
        inter_byte: Duration,
    ) -> (SerialConnection, serialport::TTYPort) {
        let (master, slave) = serialport::TTYPort::pair().unwrap();
        let config = PortConfig::new("pty")
            .with_timeout(timeout)
            .with_inter_byte_timeout(inter_byte);
        let conn = SerialConnection {
            port: Box::new(master),
            config,
        };
        (conn, slave)
    }

    #[cfg(unix)]
    #[test]
    fn test_read_line_splits_on_inter_byte_gap() {
        let (mut conn, mut device) =
            pty_connection(Duration::from_millis(1500), Duration::from_millis(200));

        let writer = std::thread::spawn(move || {
            device.write_all(b"sensor cal").unwrap();
            std::thread::sleep(Duration::from_millis(600));
            device.write_all(b"ibration\n").unwrap();
            device.write_all(b"nsh> ").unwrap();
            device
        });

        // Sender paused mid-line: the first fragment comes back on its own
        assert_eq!(conn.read_line().unwrap(), "sensor cal");

        let rest = conn.read_line().unwrap();
        assert!(rest.starts_with("ibration"), "{rest:?}");
        assert!(rest.ends_with('\n'));

        // Unterminated prompt is returned after the inter-byte gap
        assert_eq!(conn.read_line().unwrap(), "nsh> ");

        writer.join().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_read_line_empty_on_timeout() {
        let (mut conn, _device) =
            pty_connection(Duration::from_millis(300), Duration::from_millis(100));

        let started = Instant::now();
        assert_eq!(conn.read_line().unwrap(), "");
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[cfg(unix)]
    #[test]
    fn test_send_reaches_device() {
        let (mut conn, mut device) =
            pty_connection(Duration::from_millis(300), Duration::from_millis(100));
        device.set_timeout(Duration::from_secs(1)).unwrap();

        conn.send(b"\n").unwrap();

        let mut byte = [0u8; 1];
        device.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], b'\n');
    }
}
