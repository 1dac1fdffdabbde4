//! A single pooled Modbus/TCP socket and the request/response round
//! trip over it.

use std::time::Duration;

use bytes::BytesMut;
use common::error::{CResult, EngineError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::frame::{decode_response, ReadRequest, ReadResponse};

pub struct ModbusConnection {
    stream: TcpStream,
    timeout: Duration,
    next_transaction_id: u16,
}

impl ModbusConnection {
    pub async fn connect(host: &str, port: u16, timeout_ms: u64) -> CResult<Self> {
        let timeout_dur = Duration::from_millis(timeout_ms);
        let stream = timeout(timeout_dur, TcpStream::connect((host, port)))
            .await
            .map_err(|_| EngineError::transport(format!("connect to {host}:{port} timed out")))?
            .map_err(|e| EngineError::transport(format!("connect to {host}:{port} failed: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| EngineError::transport(e.to_string()))?;
        Ok(ModbusConnection {
            stream,
            timeout: timeout_dur,
            next_transaction_id: 1,
        })
    }

    pub async fn read(
        &mut self,
        function_code: u8,
        unit_id: u8,
        address: u16,
        quantity: u16,
    ) -> CResult<ReadResponse> {
        let transaction_id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);

        let request = ReadRequest {
            function_code,
            unit_id,
            address,
            quantity,
        };
        let frame = request.encode(transaction_id);

        timeout(self.timeout, self.stream.write_all(&frame))
            .await
            .map_err(|_| EngineError::transport("modbus write timed out"))?
            .map_err(|e| EngineError::transport(format!("modbus write failed: {e}")))?;

        let mut header = [0u8; 7];
        timeout(self.timeout, self.stream.read_exact(&mut header))
            .await
            .map_err(|_| EngineError::transport("modbus read timed out"))?
            .map_err(|e| EngineError::transport(format!("modbus read failed: {e}")))?;

        let remaining_len = u16::from_be_bytes([header[4], header[5]]) as usize;
        // remaining_len counts the unit-id byte already read plus the PDU.
        let pdu_len = remaining_len.saturating_sub(1);
        let mut pdu = vec![0u8; pdu_len];
        timeout(self.timeout, self.stream.read_exact(&mut pdu))
            .await
            .map_err(|_| EngineError::transport("modbus read timed out"))?
            .map_err(|e| EngineError::transport(format!("modbus read failed: {e}")))?;

        let mut full = BytesMut::with_capacity(7 + pdu.len());
        full.extend_from_slice(&header);
        full.extend_from_slice(&pdu);

        decode_response(function_code, quantity, &full)
    }
}
