use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use stc_traits::{Connector, RegisterBus};
use tracing::{debug, trace};

use crate::error::{HwError, Result};
use crate::modbus;

/// Blocking Modbus/TCP client bound to one controller.
pub struct TcpRegisterBus {
    stream: TcpStream,
    peer: String,
    next_tid: u16,
}

impl TcpRegisterBus {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let peer = format!("{host}:{port}");
        let addrs = (host, port).to_socket_addrs().map_err(|e| HwError::Connect {
            addr: peer.clone(),
            reason: e.to_string(),
        })?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, clamp_timeout(timeout)) {
                Ok(stream) => {
                    // Small request/response frames; don't wait for Nagle.
                    stream.set_nodelay(true)?;
                    debug!(peer = %peer, "controller connected");
                    return Ok(Self {
                        stream,
                        peer,
                        next_tid: 1,
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(HwError::Connect {
            addr: peer,
            reason: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no address resolved".to_string()),
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn take_tid(&mut self) -> u16 {
        let tid = self.next_tid;
        self.next_tid = self.next_tid.wrapping_add(1).max(1);
        tid
    }

    /// Send one request frame and return the validated response PDU.
    fn transact(
        &mut self,
        tid: u16,
        unit_id: u8,
        function: u8,
        request: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let timeout = clamp_timeout(timeout);
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        self.stream.write_all(request).map_err(HwError::from_io)?;

        let mut head = [0u8; modbus::MBAP_LEN];
        self.stream.read_exact(&mut head).map_err(HwError::from_io)?;
        let header = modbus::parse_header(&head)?;
        let mut pdu = vec![0u8; header.pdu_len()];
        self.stream.read_exact(&mut pdu).map_err(HwError::from_io)?;
        trace!(peer = %self.peer, tid, function, bytes = pdu.len(), "modbus response");
        modbus::check_response(&header, tid, unit_id, function, &pdu)?;
        Ok(pdu)
    }
}

// set_read_timeout rejects a zero duration
fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}

impl RegisterBus for TcpRegisterBus {
    fn read_holding(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
        timeout: Duration,
    ) -> std::result::Result<Vec<u16>, Box<dyn std::error::Error + Send + Sync>> {
        let tid = self.take_tid();
        let req = modbus::encode_read_holding(tid, unit_id, address, count)?;
        let pdu = self.transact(tid, unit_id, modbus::FN_READ_HOLDING, &req, timeout)?;
        Ok(modbus::parse_read_holding(&pdu, count)?)
    }

    fn write_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[u16],
        timeout: Duration,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let tid = self.take_tid();
        let req = modbus::encode_write_registers(tid, unit_id, address, values)?;
        let pdu = self.transact(tid, unit_id, modbus::FN_WRITE_MULTIPLE, &req, timeout)?;
        modbus::check_write_registers_echo(&pdu, address, values.len() as u16)?;
        Ok(())
    }

    fn write_coil(
        &mut self,
        unit_id: u8,
        address: u16,
        value: bool,
        timeout: Duration,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let tid = self.take_tid();
        let req = modbus::encode_write_coil(tid, unit_id, address, value);
        let pdu = self.transact(tid, unit_id, modbus::FN_WRITE_SINGLE_COIL, &req, timeout)?;
        modbus::check_write_coil_echo(&pdu, address, value)?;
        Ok(())
    }
}

/// Opens real TCP connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> std::result::Result<Box<dyn RegisterBus>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Box::new(TcpRegisterBus::connect(host, port, timeout)?))
    }
}
