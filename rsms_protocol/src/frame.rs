// frame.rs: outer message envelope: marker, header, data unit, XOR check code

use thiserror::Error;

use crate::{CommandFlag, EncryptType, ACK_COMMAND};

pub const START_MARKER: [u8; 2] = *b"##";
pub const VIN_LEN: usize = 17;
/// Marker(2) + command(1) + ack(1) + vin(17) + encrypt(1) + length(2).
pub const HEADER_LEN: usize = 24;
pub const CHECKSUM_LEN: usize = 1;

const OFF_COMMAND: usize = 2;
const OFF_ACK: usize = 3;
const OFF_VIN: usize = 4;
const OFF_ENCRYPT: usize = 21;
const OFF_LENGTH: usize = 22;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("data unit of {0} bytes exceeds the 16-bit length field")]
    DataUnitTooLarge(usize),
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("bad start marker {0:02x?}")]
    BadMarker([u8; 2]),
    #[error("unknown command flag 0x{0:02x}")]
    UnknownCommand(u8),
    #[error("unknown encryption type 0x{0:02x}")]
    UnknownEncryption(u8),
    #[error("length field says {declared} bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("check code 0x{actual:02x} does not match computed 0x{expected:02x}")]
    Checksum { expected: u8, actual: u8 },
}

/// XOR fold; 0 for an empty slice.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Builds framed messages for one vehicle identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBuilder {
    vin: [u8; VIN_LEN],
}

impl MessageBuilder {
    /// VIN is zero-padded when short and truncated when long.
    pub fn new(vin: &str) -> Self {
        let mut field = [0u8; VIN_LEN];
        let n = vin.len().min(VIN_LEN);
        field[..n].copy_from_slice(&vin.as_bytes()[..n]);
        Self { vin: field }
    }

    pub fn vin(&self) -> &[u8; VIN_LEN] {
        &self.vin
    }

    pub fn build(&self, command: CommandFlag, data_unit: &[u8]) -> Result<Vec<u8>, FrameError> {
        let unit_len = u16::try_from(data_unit.len())
            .map_err(|_| FrameError::DataUnitTooLarge(data_unit.len()))?;

        let total = HEADER_LEN + data_unit.len() + CHECKSUM_LEN;
        let mut out = vec![0u8; total];
        out[..2].copy_from_slice(&START_MARKER);
        out[OFF_COMMAND] = command as u8;
        out[OFF_ACK] = ACK_COMMAND;
        out[OFF_VIN..OFF_VIN + VIN_LEN].copy_from_slice(&self.vin);
        out[OFF_ENCRYPT] = EncryptType::None as u8;
        out[OFF_LENGTH..HEADER_LEN].copy_from_slice(&unit_len.to_be_bytes());
        out[HEADER_LEN..total - 1].copy_from_slice(data_unit);
        out[total - 1] = checksum(&out[OFF_COMMAND..total - 1]);
        Ok(out)
    }
}

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub command: CommandFlag,
    pub ack_flag: u8,
    pub vin: [u8; VIN_LEN],
    pub encrypt_type: EncryptType,
    pub data_unit: Vec<u8>,
}

impl Message {
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(FrameError::TooShort(buf.len()));
        }
        if buf[..2] != START_MARKER {
            return Err(FrameError::BadMarker([buf[0], buf[1]]));
        }
        let declared = u16::from_be_bytes([buf[OFF_LENGTH], buf[OFF_LENGTH + 1]]) as usize;
        let actual = buf.len() - HEADER_LEN - CHECKSUM_LEN;
        if declared != actual {
            return Err(FrameError::LengthMismatch { declared, actual });
        }
        let last = buf.len() - 1;
        let expected = checksum(&buf[OFF_COMMAND..last]);
        if expected != buf[last] {
            return Err(FrameError::Checksum { expected, actual: buf[last] });
        }

        let command = CommandFlag::try_from(buf[OFF_COMMAND])?;
        let encrypt_type = EncryptType::try_from(buf[OFF_ENCRYPT])?;
        let mut vin = [0u8; VIN_LEN];
        vin.copy_from_slice(&buf[OFF_VIN..OFF_VIN + VIN_LEN]);

        Ok(Self {
            command,
            ack_flag: buf[OFF_ACK],
            vin,
            encrypt_type,
            data_unit: buf[HEADER_LEN..last].to_vec(),
        })
    }

    /// VIN with trailing zero padding removed.
    pub fn vin_str(&self) -> String {
        let end = self.vin.iter().position(|b| *b == 0).unwrap_or(VIN_LEN);
        String::from_utf8_lossy(&self.vin[..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const VIN: &str = "LSVNV2180E2012345";

    #[test]
    fn header_layout() {
        let msg = MessageBuilder::new(VIN)
            .build(CommandFlag::RealtimeReport, &[0xAA, 0xBB])
            .expect("build");
        assert_eq!(&msg[..2], b"##");
        assert_eq!(msg[2], 0x02);
        assert_eq!(msg[3], 0xFE);
        assert_eq!(&msg[4..21], VIN.as_bytes());
        assert_eq!(msg[21], 0x01);
        assert_eq!(&msg[22..24], &[0, 2]);
        assert_eq!(&msg[24..26], &[0xAA, 0xBB]);
    }

    #[test]
    fn empty_unit_checksum_covers_header() {
        assert_eq!(checksum(&[]), 0);
        let msg = MessageBuilder::new(VIN)
            .build(CommandFlag::VehicleLogout, &[])
            .expect("build");
        assert_eq!(msg.len(), 25);
        assert_eq!(msg[24], checksum(&msg[2..24]));
    }

    #[test]
    fn vin_padding_and_truncation() {
        let short = MessageBuilder::new("ABC");
        assert_eq!(&short.vin()[..3], b"ABC");
        assert!(short.vin()[3..].iter().all(|b| *b == 0));

        let long = MessageBuilder::new("LSVNV2180E2012345XYZ");
        assert_eq!(long.vin(), b"LSVNV2180E2012345");
    }

    #[test]
    fn oversized_unit_rejected() {
        let unit = vec![0u8; u16::MAX as usize + 1];
        assert_eq!(
            MessageBuilder::new(VIN).build(CommandFlag::ReissueReport, &unit),
            Err(FrameError::DataUnitTooLarge(unit.len()))
        );
    }

    #[test]
    fn parse_recovers_fields() {
        let msg = MessageBuilder::new("ABC")
            .build(CommandFlag::VehicleLogin, &[1, 2, 3])
            .expect("build");
        let back = Message::parse(&msg).expect("parse");
        assert_eq!(back.command, CommandFlag::VehicleLogin);
        assert_eq!(back.ack_flag, ACK_COMMAND);
        assert_eq!(back.encrypt_type, EncryptType::None);
        assert_eq!(back.vin_str(), "ABC");
        assert_eq!(back.data_unit, vec![1, 2, 3]);
    }

    #[test]
    fn parse_rejects_bad_frames() {
        let mut msg = MessageBuilder::new(VIN)
            .build(CommandFlag::RealtimeReport, &[9, 9])
            .expect("build");
        assert!(matches!(Message::parse(&msg[..10]), Err(FrameError::TooShort(10))));

        let last = msg.len() - 1;
        msg[last] ^= 0xFF;
        assert!(matches!(Message::parse(&msg), Err(FrameError::Checksum { .. })));

        msg[0] = b'$';
        assert!(matches!(Message::parse(&msg), Err(FrameError::BadMarker(_))));
    }

    proptest! {
        #[test]
        fn prop_length_field_matches_unit(unit in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let msg = MessageBuilder::new(VIN).build(CommandFlag::RealtimeReport, &unit).unwrap();
            prop_assert_eq!(msg.len(), HEADER_LEN + unit.len() + CHECKSUM_LEN);
            let declared = u16::from_be_bytes([msg[22], msg[23]]) as usize;
            prop_assert_eq!(declared, unit.len());
        }

        #[test]
        fn prop_checksum_is_xor_of_body(unit in proptest::collection::vec(any::<u8>(), 0..512)) {
            let msg = MessageBuilder::new(VIN).build(CommandFlag::ReissueReport, &unit).unwrap();
            let last = msg.len() - 1;
            prop_assert_eq!(checksum(&msg[2..last]), msg[last]);
        }

        #[test]
        fn prop_single_byte_flip_changes_checksum(
            unit in proptest::collection::vec(any::<u8>(), 1..256),
            pos in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let msg = MessageBuilder::new(VIN).build(CommandFlag::RealtimeReport, &unit).unwrap();
            let last = msg.len() - 1;
            let mut body = msg[2..last].to_vec();
            let i = pos.index(body.len());
            body[i] ^= mask;
            prop_assert_ne!(checksum(&body), msg[last]);
        }
    }
}
