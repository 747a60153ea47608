//! Modbus/TCP application framing: MBAP header followed by a function PDU.
//!
//! Only the three functions the chamber controllers need are supported:
//! read holding registers (0x03), write single coil (0x05) and write
//! multiple registers (0x10). Everything is big-endian on the wire.

use crate::error::{HwError, Result};

pub const FN_READ_HOLDING: u8 = 0x03;
pub const FN_WRITE_SINGLE_COIL: u8 = 0x05;
pub const FN_WRITE_MULTIPLE: u8 = 0x10;

/// Bytes in the MBAP header (transaction, protocol, length, unit).
pub const MBAP_LEN: usize = 7;
pub const MAX_READ_REGISTERS: u16 = 125;
pub const MAX_WRITE_REGISTERS: usize = 123;

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;
const EXCEPTION_BIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transaction_id: u16,
    /// Byte count of unit id + PDU.
    pub length: u16,
    pub unit_id: u8,
}

impl Header {
    /// Number of PDU bytes that follow the header.
    pub fn pdu_len(&self) -> usize {
        usize::from(self.length).saturating_sub(1)
    }
}

fn frame(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(MBAP_LEN + pdu.len());
    out.extend_from_slice(&transaction_id.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
    out.push(unit_id);
    out.extend_from_slice(pdu);
    out
}

pub fn encode_read_holding(
    transaction_id: u16,
    unit_id: u8,
    address: u16,
    count: u16,
) -> Result<Vec<u8>> {
    if count == 0 || count > MAX_READ_REGISTERS {
        return Err(HwError::Frame(format!(
            "read count {count} outside 1..={MAX_READ_REGISTERS}"
        )));
    }
    let mut pdu = Vec::with_capacity(5);
    pdu.push(FN_READ_HOLDING);
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&count.to_be_bytes());
    Ok(frame(transaction_id, unit_id, &pdu))
}

pub fn encode_write_registers(
    transaction_id: u16,
    unit_id: u8,
    address: u16,
    values: &[u16],
) -> Result<Vec<u8>> {
    if values.is_empty() || values.len() > MAX_WRITE_REGISTERS {
        return Err(HwError::Frame(format!(
            "write of {} registers outside 1..={MAX_WRITE_REGISTERS}",
            values.len()
        )));
    }
    let qty = values.len() as u16;
    let mut pdu = Vec::with_capacity(6 + values.len() * 2);
    pdu.push(FN_WRITE_MULTIPLE);
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&qty.to_be_bytes());
    pdu.push((values.len() * 2) as u8);
    for v in values {
        pdu.extend_from_slice(&v.to_be_bytes());
    }
    Ok(frame(transaction_id, unit_id, &pdu))
}

pub fn encode_write_coil(transaction_id: u16, unit_id: u8, address: u16, value: bool) -> Vec<u8> {
    let raw = if value { COIL_ON } else { COIL_OFF };
    let mut pdu = Vec::with_capacity(5);
    pdu.push(FN_WRITE_SINGLE_COIL);
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&raw.to_be_bytes());
    frame(transaction_id, unit_id, &pdu)
}

pub fn parse_header(buf: &[u8; MBAP_LEN]) -> Result<Header> {
    let transaction_id = u16::from_be_bytes([buf[0], buf[1]]);
    let protocol = u16::from_be_bytes([buf[2], buf[3]]);
    let length = u16::from_be_bytes([buf[4], buf[5]]);
    if protocol != 0 {
        return Err(HwError::Frame(format!("unexpected protocol id {protocol}")));
    }
    // unit id + at least a function code
    if length < 2 {
        return Err(HwError::Frame(format!("length field {length} too short")));
    }
    Ok(Header {
        transaction_id,
        length,
        unit_id: buf[6],
    })
}

/// Validate a response PDU against the request that produced it.
///
/// Exception responses (function | 0x80) surface as [`HwError::Exception`].
pub fn check_response(
    header: &Header,
    transaction_id: u16,
    unit_id: u8,
    function: u8,
    pdu: &[u8],
) -> Result<()> {
    if header.transaction_id != transaction_id {
        return Err(HwError::Frame(format!(
            "transaction id mismatch: sent {transaction_id}, got {}",
            header.transaction_id
        )));
    }
    if header.unit_id != unit_id {
        return Err(HwError::Frame(format!(
            "unit id mismatch: sent {unit_id}, got {}",
            header.unit_id
        )));
    }
    let Some(&code) = pdu.first() else {
        return Err(HwError::Frame("empty PDU".to_string()));
    };
    if code == function | EXCEPTION_BIT {
        return Err(HwError::Exception {
            function,
            code: pdu.get(1).copied().unwrap_or(0),
        });
    }
    if code != function {
        return Err(HwError::Frame(format!(
            "function mismatch: sent 0x{function:02x}, got 0x{code:02x}"
        )));
    }
    Ok(())
}

pub fn parse_read_holding(pdu: &[u8], count: u16) -> Result<Vec<u16>> {
    let expected = usize::from(count) * 2;
    let byte_count = pdu.get(1).copied().map(usize::from);
    if byte_count != Some(expected) || pdu.len() != 2 + expected {
        return Err(HwError::Frame(format!(
            "read response carries {:?} bytes, expected {expected}",
            byte_count
        )));
    }
    Ok(pdu[2..]
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

pub fn check_write_registers_echo(pdu: &[u8], address: u16, qty: u16) -> Result<()> {
    if pdu.len() != 5 {
        return Err(HwError::Frame(format!("write echo length {}", pdu.len())));
    }
    let echoed_addr = u16::from_be_bytes([pdu[1], pdu[2]]);
    let echoed_qty = u16::from_be_bytes([pdu[3], pdu[4]]);
    if echoed_addr != address || echoed_qty != qty {
        return Err(HwError::Frame(format!(
            "write echo {echoed_addr}/{echoed_qty} does not match {address}/{qty}"
        )));
    }
    Ok(())
}

pub fn check_write_coil_echo(pdu: &[u8], address: u16, value: bool) -> Result<()> {
    if pdu.len() != 5 {
        return Err(HwError::Frame(format!("coil echo length {}", pdu.len())));
    }
    let echoed_addr = u16::from_be_bytes([pdu[1], pdu[2]]);
    let echoed_val = u16::from_be_bytes([pdu[3], pdu[4]]);
    let expected = if value { COIL_ON } else { COIL_OFF };
    if echoed_addr != address || echoed_val != expected {
        return Err(HwError::Frame(format!(
            "coil echo {echoed_addr}/0x{echoed_val:04x} does not match request"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_of(frame: &[u8]) -> Header {
        let mut h = [0u8; MBAP_LEN];
        h.copy_from_slice(&frame[..MBAP_LEN]);
        parse_header(&h).unwrap()
    }

    #[test]
    fn read_request_layout() {
        let f = encode_read_holding(0x0102, 1, 100, 8).unwrap();
        assert_eq!(f, vec![0x01, 0x02, 0, 0, 0, 6, 1, 0x03, 0, 100, 0, 8]);
        assert_eq!(header_of(&f).pdu_len(), 5);
    }

    #[test]
    fn write_request_layout() {
        let f = encode_write_registers(7, 1, 0x0200, &[72, 0x1234]).unwrap();
        assert_eq!(
            f,
            vec![0, 7, 0, 0, 0, 11, 1, 0x10, 0x02, 0x00, 0, 2, 4, 0, 72, 0x12, 0x34]
        );
    }

    #[test]
    fn coil_request_layout() {
        let f = encode_write_coil(3, 9, 10, true);
        assert_eq!(f, vec![0, 3, 0, 0, 0, 6, 9, 0x05, 0, 10, 0xFF, 0x00]);
    }

    #[test]
    fn rejects_oversized_requests() {
        assert!(encode_read_holding(1, 1, 0, 0).is_err());
        assert!(encode_read_holding(1, 1, 0, 126).is_err());
        assert!(encode_write_registers(1, 1, 0, &[]).is_err());
        assert!(encode_write_registers(1, 1, 0, &[0; 124]).is_err());
    }

    #[test]
    fn exception_response_is_typed() {
        let h = Header {
            transaction_id: 5,
            length: 3,
            unit_id: 1,
        };
        let err = check_response(&h, 5, 1, FN_WRITE_MULTIPLE, &[0x90, 0x02]).unwrap_err();
        assert!(matches!(
            err,
            HwError::Exception {
                function: 0x10,
                code: 0x02
            }
        ));
    }

    #[test]
    fn mismatched_transaction_is_rejected() {
        let h = Header {
            transaction_id: 6,
            length: 3,
            unit_id: 1,
        };
        assert!(check_response(&h, 5, 1, FN_READ_HOLDING, &[0x03, 0]).is_err());
    }

    #[test]
    fn read_response_words() {
        let pdu = [0x03, 4, 0, 75, 0x01, 0x00];
        assert_eq!(parse_read_holding(&pdu, 2).unwrap(), vec![75, 256]);
        assert!(parse_read_holding(&pdu, 3).is_err());
    }

    #[test]
    fn write_echoes() {
        check_write_registers_echo(&[0x10, 0, 100, 0, 8], 100, 8).unwrap();
        assert!(check_write_registers_echo(&[0x10, 0, 100, 0, 7], 100, 8).is_err());
        check_write_coil_echo(&[0x05, 0, 10, 0xFF, 0x00], 10, true).unwrap();
        assert!(check_write_coil_echo(&[0x05, 0, 10, 0x00, 0x00], 10, true).is_err());
    }

    #[test]
    fn header_rejects_foreign_protocol() {
        assert!(parse_header(&[0, 1, 0, 1, 0, 6, 1]).is_err());
        assert!(parse_header(&[0, 1, 0, 0, 0, 1, 1]).is_err());
    }
}
