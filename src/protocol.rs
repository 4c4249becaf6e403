//! Frame layout and register map of the 7-in-1 NPK soil probe.
//!
//! The probe speaks a small subset of Modbus RTU: the master sends a
//! "Read Holding Registers" request for seven registers and the probe answers
//! with a fixed 19 byte frame.
//!
//! ```text
//! request:  [addr][0x03][startHi][startLo][countHi][countLo][crcLo][crcHi]
//! response: [addr][0x03][0x0E][14 payload bytes][crcLo][crcHi]
//! ```
//!
//! This module only builds and validates frames; it never touches a transport.
use crate::crc;
use std::fmt;

/// Errors raised when constructing protocol values from user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The address is outside the assignable range.
    #[error(
        "The address value {0} is outside the valid range of {min} to {max}",
        min = Address::MIN,
        max = Address::MAX
    )]
    AddressOutOfRange(u8),

    /// The baud rate is not one the probe supports.
    #[error("Unsupported baud rate {0}, supported values are 2400, 4800 and 9600")]
    InvalidBaudRate(u32),
}

/// Why a response frame was rejected.
///
/// Each validation step of [`decode_response`] has its own variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedReason {
    #[error("bad length: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("bad byte count: expected {expected}, got {actual}")]
    ByteCount { expected: u8, actual: u8 },

    #[error("CRC mismatch: calculated {expected:#06X}, received {actual:#06X}")]
    Checksum { expected: u16, actual: u16 },

    #[error("bad address: expected {expected:#04X}, got {actual:#04X}")]
    Address { expected: u8, actual: u8 },

    #[error("bad function code: expected {expected:#04X}, got {actual:#04X}")]
    Function { expected: u8, actual: u8 },
}

/// Modbus function code "Read Holding Registers".
pub const READ_HOLDING_REGISTERS: u8 = 0x03;

/// Length of every request frame this crate builds.
pub const REQUEST_LEN: usize = 8;

/// Address (slave id) of the probe on the RS485 bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address(u8);

impl Address {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 247;
}

impl std::ops::Deref for Address {
    type Target = u8;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for Address {
    fn default() -> Self {
        Self(0x01)
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::AddressOutOfRange(value))
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Serial speeds offered by the probe firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaudRate {
    B2400,
    #[default]
    B4800,
    B9600,
}

impl TryFrom<u32> for BaudRate {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2400 => Ok(BaudRate::B2400),
            4800 => Ok(BaudRate::B4800),
            9600 => Ok(BaudRate::B9600),
            _ => Err(Error::InvalidBaudRate(value)),
        }
    }
}

impl From<&BaudRate> for u32 {
    fn from(baud_rate: &BaudRate) -> u32 {
        match baud_rate {
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
        }
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u32::from(self))
    }
}

/// The seven holding registers of the probe, as transmitted.
///
/// Moisture, temperature and pH are reported in tenths; conductivity and the
/// nutrient values are plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRegisters {
    pub moisture: u16,
    pub temperature: u16,
    pub conductivity: u16,
    pub ph: u16,
    pub nitrogen: u16,
    pub phosphorus: u16,
    pub potassium: u16,
}

impl RawRegisters {
    /// First register of the block.
    pub const ADDRESS: u16 = 0x0000;
    /// Number of registers in the block.
    pub const QUANTITY: u16 = 7;
    /// Payload bytes carried by a response.
    pub const BYTE_COUNT: u8 = (Self::QUANTITY * 2) as u8;
    /// Total response length: header, payload and CRC.
    pub const RESPONSE_LEN: usize = 3 + Self::BYTE_COUNT as usize + 2;

    pub const MOISTURE_SCALE: f64 = 0.1;
    pub const TEMPERATURE_SCALE: f64 = 0.1;
    pub const PH_SCALE: f64 = 0.1;
    /// Some probe revisions report EC in tenths or tens; this one does not.
    pub const CONDUCTIVITY_SCALE: f64 = 1.0;

    /// Builds the register set from seven words in wire order.
    pub fn from_words(words: [u16; 7]) -> Self {
        let [moisture, temperature, conductivity, ph, nitrogen, phosphorus, potassium] = words;
        Self {
            moisture,
            temperature,
            conductivity,
            ph,
            nitrogen,
            phosphorus,
            potassium,
        }
    }

    /// Returns the seven words in wire order.
    pub fn to_words(&self) -> [u16; 7] {
        [
            self.moisture,
            self.temperature,
            self.conductivity,
            self.ph,
            self.nitrogen,
            self.phosphorus,
            self.potassium,
        ]
    }

    /// Volumetric soil moisture in percent.
    pub fn moisture_pct(&self) -> f64 {
        self.moisture as f64 * Self::MOISTURE_SCALE
    }

    /// Soil temperature in °C.
    pub fn temperature_c(&self) -> f64 {
        self.temperature as f64 * Self::TEMPERATURE_SCALE
    }

    /// Electrical conductivity in µS/cm.
    pub fn conductivity_us_cm(&self) -> f64 {
        self.conductivity as f64 * Self::CONDUCTIVITY_SCALE
    }

    pub fn ph(&self) -> f64 {
        self.ph as f64 * Self::PH_SCALE
    }

    /// Nitrogen in mg/kg.
    pub fn nitrogen_mg_kg(&self) -> f64 {
        self.nitrogen as f64
    }

    /// Phosphorus in mg/kg.
    pub fn phosphorus_mg_kg(&self) -> f64 {
        self.phosphorus as f64
    }

    /// Potassium in mg/kg.
    pub fn potassium_mg_kg(&self) -> f64 {
        self.potassium as f64
    }
}

impl fmt::Display for RawRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Moisture: {:.1} %", self.moisture_pct())?;
        writeln!(f, "Temperature: {:.1} °C", self.temperature_c())?;
        writeln!(f, "Conductivity: {:.1} uS/cm", self.conductivity_us_cm())?;
        writeln!(f, "pH: {:.1}", self.ph())?;
        write!(
            f,
            "N: {}  P: {}  K: {} (mg/kg)",
            self.nitrogen, self.phosphorus, self.potassium
        )
    }
}

/// Builds a "Read Holding Registers" request frame.
pub fn build_request(slave: u8, start_register: u16, register_count: u16) -> [u8; REQUEST_LEN] {
    let [start_hi, start_lo] = start_register.to_be_bytes();
    let [count_hi, count_lo] = register_count.to_be_bytes();
    let header = [
        slave,
        READ_HOLDING_REGISTERS,
        start_hi,
        start_lo,
        count_hi,
        count_lo,
    ];
    let [crc_lo, crc_hi] = crc::checksum(&header).to_le_bytes();
    [
        header[0], header[1], header[2], header[3], header[4], header[5], crc_lo, crc_hi,
    ]
}

/// Validates a response frame and decodes its registers.
///
/// The checks run in a fixed order and stop at the first failure: frame
/// length, declared byte count, CRC, then address and function code. The CRC
/// is checked before the header fields so a corrupted frame is never reported
/// as a wrong address.
pub fn decode_response(
    bytes: &[u8],
    expected_slave: u8,
    expected_byte_count: u8,
) -> Result<RawRegisters, MalformedReason> {
    let expected_len = 3 + expected_byte_count as usize + 2;
    if bytes.len() != expected_len {
        return Err(MalformedReason::Length {
            expected: expected_len,
            actual: bytes.len(),
        });
    }

    if bytes[2] != expected_byte_count {
        return Err(MalformedReason::ByteCount {
            expected: expected_byte_count,
            actual: bytes[2],
        });
    }

    let (body, _) = bytes.split_at(bytes.len() - 2);
    let calculated = crc::checksum(body);
    let received = crc::trailing(bytes).unwrap_or_default();
    if calculated != received {
        return Err(MalformedReason::Checksum {
            expected: calculated,
            actual: received,
        });
    }

    if bytes[0] != expected_slave {
        return Err(MalformedReason::Address {
            expected: expected_slave,
            actual: bytes[0],
        });
    }
    if bytes[1] != READ_HOLDING_REGISTERS {
        return Err(MalformedReason::Function {
            expected: READ_HOLDING_REGISTERS,
            actual: bytes[1],
        });
    }

    // A well-formed frame of some other size still carries no probe reading.
    if expected_byte_count != RawRegisters::BYTE_COUNT {
        return Err(MalformedReason::ByteCount {
            expected: RawRegisters::BYTE_COUNT,
            actual: expected_byte_count,
        });
    }

    let mut words = [0u16; 7];
    for (word, chunk) in words.iter_mut().zip(body[3..].chunks_exact(2)) {
        *word = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
    Ok(RawRegisters::from_words(words))
}

/// Encodes a response frame for `registers`, as the probe would send it.
///
/// Used to exercise the decoder and the clients without hardware.
pub fn encode_response(slave: u8, registers: &RawRegisters) -> Vec<u8> {
    let mut frame = Vec::with_capacity(RawRegisters::RESPONSE_LEN);
    frame.push(slave);
    frame.push(READ_HOLDING_REGISTERS);
    frame.push(RawRegisters::BYTE_COUNT);
    for word in registers.to_words() {
        frame.extend_from_slice(&word.to_be_bytes());
    }
    crc::append(&mut frame);
    frame
}
