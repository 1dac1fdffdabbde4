//! Modbus/TCP MBAP framing: a 7-byte header (transaction id, protocol
//! id, length, unit id) followed by the PDU. Function codes 1-4 only;
//! the engine never writes to a PLC.

use bytes::{Buf, BufMut, BytesMut};
use common::error::{CResult, EngineError};

pub struct ReadRequest {
    pub function_code: u8,
    pub unit_id: u8,
    pub address: u16,
    pub quantity: u16,
}

impl ReadRequest {
    pub fn encode(&self, transaction_id: u16) -> BytesMut {
        let mut pdu = BytesMut::with_capacity(5);
        pdu.put_u8(self.function_code);
        pdu.put_u16(self.address);
        pdu.put_u16(self.quantity);

        let mut frame = BytesMut::with_capacity(7 + pdu.len());
        frame.put_u16(transaction_id);
        frame.put_u16(0); // protocol id, always 0 for Modbus/TCP
        frame.put_u16((pdu.len() + 1) as u16); // + unit id byte
        frame.put_u8(self.unit_id);
        frame.extend_from_slice(&pdu);
        frame
    }
}

/// A decoded read response: the raw register values (one entry per
/// register for 3/4, one bit packed per byte for 1/2 as returned by
/// the server, already unpacked to booleans by the caller).
pub struct ReadResponse {
    pub registers: Vec<u16>,
    pub bits: Vec<bool>,
}

/// Parses an MBAP-framed PDU response into registers or bits depending
/// on the function code that was requested.
pub fn decode_response(function_code: u8, expected_quantity: u16, frame: &[u8]) -> CResult<ReadResponse> {
    if frame.len() < 9 {
        return Err(EngineError::transport("short modbus frame"));
    }
    let mut buf = &frame[7..]; // skip MBAP header
    let resp_fn = buf.get_u8();
    if resp_fn & 0x80 != 0 {
        let exception_code = if buf.has_remaining() { buf.get_u8() } else { 0 };
        return Err(EngineError::transport(format!(
            "modbus exception response (function {resp_fn:#x}, code {exception_code:#x})"
        )));
    }
    if resp_fn != function_code {
        return Err(EngineError::transport(format!(
            "unexpected function code in response: got {resp_fn:#x}, expected {function_code:#x}"
        )));
    }

    let byte_count = buf.get_u8() as usize;
    if buf.remaining() < byte_count {
        return Err(EngineError::transport("truncated modbus payload"));
    }

    match function_code {
        1 | 2 => {
            let mut bits = Vec::with_capacity(expected_quantity as usize);
            let bytes = &buf[..byte_count];
            for i in 0..expected_quantity as usize {
                let byte = bytes[i / 8];
                bits.push((byte >> (i % 8)) & 1 != 0);
            }
            Ok(ReadResponse {
                registers: vec![],
                bits,
            })
        }
        3 | 4 => {
            let mut registers = Vec::with_capacity(byte_count / 2);
            let mut bytes = &buf[..byte_count];
            while bytes.remaining() >= 2 {
                registers.push(bytes.get_u16());
            }
            Ok(ReadResponse {
                registers,
                bits: vec![],
            })
        }
        other => Err(EngineError::transport(format!("unsupported function code {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_mbap_header_and_pdu() {
        let req = ReadRequest {
            function_code: 3,
            unit_id: 1,
            address: 0,
            quantity: 2,
        };
        let frame = req.encode(7);
        assert_eq!(&frame[0..2], &7u16.to_be_bytes());
        assert_eq!(&frame[2..4], &0u16.to_be_bytes());
        assert_eq!(frame[6], 1); // unit id
        assert_eq!(frame[7], 3); // function code
    }

    #[test]
    fn decodes_holding_register_response() {
        let mut frame = BytesMut::new();
        frame.put_u16(7);
        frame.put_u16(0);
        frame.put_u16(5);
        frame.put_u8(1); // unit id
        frame.put_u8(3); // function code
        frame.put_u8(4); // byte count
        frame.put_u16(0x1234);
        frame.put_u16(0x5678);

        let resp = decode_response(3, 2, &frame).unwrap();
        assert_eq!(resp.registers, vec![0x1234, 0x5678]);
    }

    #[test]
    fn decodes_exception_as_transport_error() {
        let mut frame = BytesMut::new();
        frame.put_u16(7);
        frame.put_u16(0);
        frame.put_u16(3);
        frame.put_u8(1);
        frame.put_u8(0x83); // function code 3 with exception bit set
        frame.put_u8(0x02); // illegal data address

        let err = decode_response(3, 1, &frame).unwrap_err();
        assert_eq!(err.code(), "TRANSPORT_ERROR");
    }
}
