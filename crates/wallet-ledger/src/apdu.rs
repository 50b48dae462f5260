//! APDU command framing for the device app.
//!
//! USB/HID transport is provided by the caller through [`Exchange`].

use async_trait::async_trait;
use tracing::debug;

use crate::error::DeviceError;

/// CLA byte shared by the Ethereum-family Ledger apps.
pub const CLA: u8 = 0xE0;

/// Largest data field a short APDU can carry.
pub const MAX_DATA_LEN: usize = 255;

pub const SW_OK: u16 = 0x9000;

/// Instructions understood by the Celo (Ethereum-family) app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    GetAddress = 0x02,
    SignTransaction = 0x04,
    GetAppConfiguration = 0x06,
    SignPersonalMessage = 0x08,
    SignEip712Hashed = 0x0C,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl ApduCommand {
    pub fn new(ins: Instruction, p1: u8, p2: u8, data: Vec<u8>) -> Result<Self, DeviceError> {
        if data.len() > MAX_DATA_LEN {
            return Err(DeviceError::Other(format!(
                "APDU data too long: {} bytes",
                data.len()
            )));
        }
        Ok(Self {
            cla: CLA,
            ins: ins as u8,
            p1,
            p2,
            data,
        })
    }

    /// Serializes as `CLA INS P1 P2 Lc data`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.data.len());
        bytes.push(self.cla);
        bytes.push(self.ins);
        bytes.push(self.p1);
        bytes.push(self.p2);
        bytes.push(self.data.len() as u8);
        bytes.extend_from_slice(&self.data);

        debug!(
            cla = self.cla,
            ins = self.ins,
            p1 = self.p1,
            p2 = self.p2,
            len = self.data.len(),
            "apdu command"
        );

        bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub status_code: u16,
}

impl ApduResponse {
    /// Splits a raw response into data and the trailing two-byte status word.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DeviceError> {
        if bytes.len() < 2 {
            return Err(DeviceError::InvalidResponse(
                "APDU response shorter than the status word".into(),
            ));
        }

        let (data, sw) = bytes.split_at(bytes.len() - 2);
        Ok(Self {
            data: data.to_vec(),
            status_code: u16::from_be_bytes([sw[0], sw[1]]),
        })
    }

    pub fn is_success(&self) -> bool {
        self.status_code == SW_OK
    }

    /// Returns the data on success, or the status word as a transport status
    /// error.
    pub fn into_result(self) -> Result<Vec<u8>, DeviceError> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(DeviceError::status(self.status_code))
        }
    }
}

/// The opaque transport to the device: sends one command, returns its
/// response. Transport failures are reported as [`DeviceError::Transport`].
#[async_trait]
pub trait Exchange: Send {
    async fn exchange(&mut self, command: &ApduCommand) -> Result<ApduResponse, DeviceError>;
}
