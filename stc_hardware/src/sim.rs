use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use stc_traits::{Connector, RegisterBus};

use crate::error::HwError;

/// One write observed by the simulated controller, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimWrite {
    Registers { unit_id: u8, address: u16, values: Vec<u16> },
    Coil { unit_id: u8, address: u16, value: bool },
}

impl SimWrite {
    pub fn address(&self) -> u16 {
        match self {
            SimWrite::Registers { address, .. } | SimWrite::Coil { address, .. } => *address,
        }
    }
}

#[derive(Debug, Default)]
struct Bank {
    holding: BTreeMap<u16, u16>,
    coils: BTreeMap<u16, bool>,
    writes: Vec<SimWrite>,
    fail_writes_at: BTreeSet<u16>,
    timeout_writes_at: BTreeSet<u16>,
    fail_reads: bool,
}

impl Bank {
    /// Injected failure for a write to `address`, if any.
    fn write_fault(&self, address: u16, function: u8) -> Option<HwError> {
        if self.timeout_writes_at.contains(&address) {
            Some(HwError::Timeout)
        } else if self.fail_writes_at.contains(&address) {
            Some(HwError::Exception {
                function,
                code: 0x04,
            })
        } else {
            None
        }
    }
}

/// In-memory controller. Clones share the same register bank so a test can
/// hand one clone to the core and inspect another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedController {
    bank: Arc<Mutex<Bank>>,
}

impl SimulatedController {
    pub fn new() -> Self {
        Self::default()
    }

    fn bank(&self) -> MutexGuard<'_, Bank> {
        self.bank.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Preload holding registers starting at `address`.
    pub fn set_holding(&self, address: u16, values: &[u16]) {
        let mut bank = self.bank();
        for (i, v) in values.iter().enumerate() {
            bank.holding.insert(address.wrapping_add(i as u16), *v);
        }
    }

    pub fn holding(&self, address: u16, count: u16) -> Vec<u16> {
        let bank = self.bank();
        (0..count)
            .map(|i| bank.holding.get(&address.wrapping_add(i)).copied().unwrap_or(0))
            .collect()
    }

    pub fn coil(&self, address: u16) -> bool {
        self.bank().coils.get(&address).copied().unwrap_or(false)
    }

    /// Every write (registers and coils) received so far.
    pub fn writes(&self) -> Vec<SimWrite> {
        self.bank().writes.clone()
    }

    /// Answer writes to `address` with a device exception.
    pub fn fail_writes_at(&self, address: u16) {
        self.bank().fail_writes_at.insert(address);
    }

    /// Let writes to `address` time out without reaching the bank.
    pub fn timeout_writes_at(&self, address: u16) {
        self.bank().timeout_writes_at.insert(address);
    }

    /// Answer every read with a timeout.
    pub fn fail_reads(&self, fail: bool) {
        self.bank().fail_reads = fail;
    }
}

impl RegisterBus for SimulatedController {
    fn read_holding(
        &mut self,
        _unit_id: u8,
        address: u16,
        count: u16,
        _timeout: Duration,
    ) -> Result<Vec<u16>, Box<dyn std::error::Error + Send + Sync>> {
        if self.bank().fail_reads {
            return Err(Box::new(HwError::Timeout));
        }
        let words = self.holding(address, count);
        tracing::debug!(address, ?words, "read holding (simulated)");
        Ok(words)
    }

    fn write_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[u16],
        _timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut bank = self.bank();
        if let Some(e) = bank.write_fault(address, crate::modbus::FN_WRITE_MULTIPLE) {
            return Err(Box::new(e));
        }
        for (i, v) in values.iter().enumerate() {
            bank.holding.insert(address.wrapping_add(i as u16), *v);
        }
        bank.writes.push(SimWrite::Registers {
            unit_id,
            address,
            values: values.to_vec(),
        });
        tracing::debug!(address, ?values, "write registers (simulated)");
        Ok(())
    }

    fn write_coil(
        &mut self,
        unit_id: u8,
        address: u16,
        value: bool,
        _timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut bank = self.bank();
        if let Some(e) = bank.write_fault(address, crate::modbus::FN_WRITE_SINGLE_COIL) {
            return Err(Box::new(e));
        }
        bank.coils.insert(address, value);
        bank.writes.push(SimWrite::Coil {
            unit_id,
            address,
            value,
        });
        tracing::debug!(address, value, "write coil (simulated)");
        Ok(())
    }
}

/// Hands out clones of one [`SimulatedController`], or refuses connections.
#[derive(Debug, Clone, Default)]
pub struct SimConnector {
    controller: SimulatedController,
    refuse: bool,
    connects: Arc<Mutex<Vec<String>>>,
}

impl SimConnector {
    pub fn new(controller: SimulatedController) -> Self {
        Self {
            controller,
            refuse: false,
            connects: Arc::default(),
        }
    }

    /// A connector whose every connect attempt fails.
    pub fn unreachable() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn controller(&self) -> &SimulatedController {
        &self.controller
    }

    /// `host:port` of every connect attempt so far.
    pub fn connect_attempts(&self) -> Vec<String> {
        self.connects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl Connector for SimConnector {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<Box<dyn RegisterBus>, Box<dyn std::error::Error + Send + Sync>> {
        let addr = format!("{host}:{port}");
        self.connects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(addr.clone());
        if self.refuse {
            return Err(Box::new(HwError::Connect {
                addr,
                reason: "connection refused (simulated)".to_string(),
            }));
        }
        Ok(Box::new(self.controller.clone()))
    }
}
