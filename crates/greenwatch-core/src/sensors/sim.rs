//! Register-level model of the sensor board
//!
//! [`SimBoard`] stands in for the LSM6DSO on the host bus and for the LPS22HH
//! wired to the IMU's auxiliary bus. Only the registers the drivers touch have
//! behaviour; everything else is plain storage. Every successful register
//! access is recorded as a [`BusOp`] so tests can assert on exact sequences.

use core::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use log::trace;

use super::lps22hh::{self, IF_ADD_INC, LPS22HH_ADDRESS, LPS22HH_WHO_AM_I, SWRESET};
use super::lsm6dso::{
    self, LSM6DSO_ADDRESS, LSM6DSO_WHO_AM_I, MASTER_ON, SENS_HUB_ENDOP, SHUB_REG_ACCESS,
    SLAVE0_NACK, SW_RESET, WR_ONCE_DONE, hub_regs,
};

/// One register access seen on the host bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Write { address: u8, reg: u8, value: u8 },
    Read { address: u8, reg: u8 },
}

/// A register that clears a self-resetting bit after a number of reads.
#[derive(Debug, Default)]
struct Countdown {
    latency: u32,
    remaining: Option<u32>,
}

impl Countdown {
    fn arm(&mut self) {
        self.remaining = Some(self.latency);
    }

    /// Whether the bit is still set for this read.
    fn tick(&mut self) -> bool {
        match self.remaining {
            Some(0) | None => {
                self.remaining = None;
                false
            }
            Some(n) => {
                self.remaining = Some(n - 1);
                true
            }
        }
    }
}

struct Imu {
    main: [u8; 128],
    hub: [u8; 64],
    ready_after: Option<u32>,
    status_reads: u32,
    reset: Countdown,
    hub_latency: u32,
    hub_pending: Option<u32>,
    hub_stuck: bool,
}

impl Imu {
    fn new() -> Self {
        let mut main = [0u8; 128];
        main[lsm6dso::regs::PIN_CTRL as usize] = 0x3F;
        main[lsm6dso::regs::WHO_AM_I as usize] = LSM6DSO_WHO_AM_I;
        Self {
            main,
            hub: [0; 64],
            ready_after: Some(0),
            status_reads: 0,
            reset: Countdown::default(),
            hub_latency: 0,
            hub_pending: None,
            hub_stuck: false,
        }
    }

    fn in_hub_bank(&self) -> bool {
        self.main[lsm6dso::regs::FUNC_CFG_ACCESS as usize] & SHUB_REG_ACCESS != 0
    }
}

struct Baro {
    regs: [u8; 128],
    reset: Countdown,
    attached: bool,
}

impl Baro {
    fn new() -> Self {
        let mut regs = [0u8; 128];
        regs[lps22hh::regs::WHO_AM_I as usize] = LPS22HH_WHO_AM_I;
        regs[lps22hh::regs::CTRL_REG2 as usize] = IF_ADD_INC;
        regs[lps22hh::regs::STATUS as usize] = 0x03;
        Self {
            regs,
            reset: Countdown::default(),
            attached: true,
        }
    }

    fn write(&mut self, reg: u8, value: u8) {
        let reg = reg & 0x7F;
        self.regs[reg as usize] = value;
        if reg == lps22hh::regs::CTRL_REG2 && value & SWRESET != 0 {
            self.reset.arm();
        }
    }

    fn read(&mut self, reg: u8) -> u8 {
        let reg = reg & 0x7F;
        if reg == lps22hh::regs::CTRL_REG2 && !self.reset.tick() {
            self.regs[reg as usize] &= !SWRESET;
        }
        self.regs[reg as usize]
    }
}

struct BoardState {
    imu: Imu,
    baro: Baro,
    nacks: u32,
    ops: Vec<BusOp>,
    light_raw: u16,
}

impl BoardState {
    fn imu_write(&mut self, reg: u8, value: u8) {
        let reg = reg & 0x7F;
        if reg == lsm6dso::regs::FUNC_CFG_ACCESS {
            self.imu.main[reg as usize] = value;
            return;
        }

        if self.imu.in_hub_bank() {
            let slot = reg as usize % self.imu.hub.len();
            self.imu.hub[slot] = value;
            if reg == hub_regs::MASTER_CONFIG && value & MASTER_ON != 0 {
                self.hub_trigger();
            }
            return;
        }

        self.imu.main[reg as usize] = value;
        if reg == lsm6dso::regs::CTRL3_C && value & SW_RESET != 0 {
            self.imu.reset.arm();
        }
    }

    fn imu_read(&mut self, reg: u8) -> u8 {
        let reg = reg & 0x7F;
        if reg == lsm6dso::regs::FUNC_CFG_ACCESS {
            return self.imu.main[reg as usize];
        }

        if self.imu.in_hub_bank() {
            if reg == hub_regs::STATUS_MASTER {
                self.hub_complete();
            }
            return self.imu.hub[reg as usize % self.imu.hub.len()];
        }

        match reg {
            lsm6dso::regs::STATUS_REG => {
                let ready = self
                    .imu
                    .ready_after
                    .is_some_and(|after| self.imu.status_reads >= after);
                self.imu.status_reads = self.imu.status_reads.saturating_add(1);
                if ready { 0x07 } else { 0x00 }
            }
            lsm6dso::regs::CTRL3_C => {
                if !self.imu.reset.tick() {
                    self.imu.main[reg as usize] &= !SW_RESET;
                }
                self.imu.main[reg as usize]
            }
            _ => self.imu.main[reg as usize],
        }
    }

    fn hub_trigger(&mut self) {
        self.imu.hub[hub_regs::STATUS_MASTER as usize] = 0;
        self.imu.hub_pending = Some(self.imu.hub_latency);
    }

    /// Advance a pending one-shot transaction by one status read.
    fn hub_complete(&mut self) {
        if self.imu.hub_stuck {
            return;
        }
        match self.imu.hub_pending {
            None => return,
            Some(0) => self.imu.hub_pending = None,
            Some(n) => {
                self.imu.hub_pending = Some(n - 1);
                return;
            }
        }

        let slave = self.imu.hub[hub_regs::SLV0_ADD as usize];
        let sub = self.imu.hub[hub_regs::SLV0_SUBADD as usize];
        let mut status = WR_ONCE_DONE | SENS_HUB_ENDOP;

        if slave >> 1 != LPS22HH_ADDRESS || !self.baro.attached {
            status |= SLAVE0_NACK;
        } else if slave & 0x01 != 0 {
            self.imu.hub[hub_regs::SENSOR_HUB_1 as usize] = self.baro.read(sub);
        } else {
            let value = self.imu.hub[hub_regs::DATAWRITE_SLV0 as usize];
            self.baro.write(sub, value);
        }
        self.imu.hub[hub_regs::STATUS_MASTER as usize] = status;
    }
}

/// Shared handle to the simulated board.
#[derive(Clone)]
pub struct SimBoard {
    state: Rc<RefCell<BoardState>>,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BoardState {
                imu: Imu::new(),
                baro: Baro::new(),
                nacks: 0,
                ops: Vec::new(),
                light_raw: 0,
            })),
        }
    }

    /// A bus handle reaching this board. Handles are cheap and share state.
    pub fn bus(&self) -> SimBus {
        SimBus {
            state: self.state.clone(),
        }
    }

    /// Every register access since creation or the last [`SimBoard::clear_ops`].
    pub fn ops(&self) -> Vec<BusOp> {
        self.state.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    /// Fail the next `count` bus transactions with an address NACK.
    pub fn inject_nacks(&self, count: u32) {
        self.state.borrow_mut().nacks = count;
    }

    /// IMU data-ready flags read as set from the `reads`-th status read on.
    /// `None` keeps them clear forever.
    pub fn set_imu_ready_after(&self, reads: Option<u32>) {
        let mut state = self.state.borrow_mut();
        state.imu.ready_after = reads;
        state.imu.status_reads = 0;
    }

    pub fn set_imu_reset_latency(&self, reads: u32) {
        self.state.borrow_mut().imu.reset.latency = reads;
    }

    pub fn set_baro_reset_latency(&self, reads: u32) {
        self.state.borrow_mut().baro.reset.latency = reads;
    }

    /// Status reads a one-shot hub transaction takes to complete.
    pub fn set_hub_latency(&self, reads: u32) {
        self.state.borrow_mut().imu.hub_latency = reads;
    }

    /// Keep hub transactions from ever completing.
    pub fn set_hub_stuck(&self, stuck: bool) {
        self.state.borrow_mut().imu.hub_stuck = stuck;
    }

    /// Disconnect the barometer from the auxiliary bus.
    pub fn detach_baro(&self) {
        self.state.borrow_mut().baro.attached = false;
    }

    pub fn in_hub_bank(&self) -> bool {
        self.state.borrow().imu.in_hub_bank()
    }

    pub fn imu_register(&self, reg: u8) -> u8 {
        self.state.borrow().imu.main[reg as usize & 0x7F]
    }

    pub fn set_imu_register(&self, reg: u8, value: u8) {
        self.state.borrow_mut().imu.main[reg as usize & 0x7F] = value;
    }

    pub fn hub_register(&self, reg: u8) -> u8 {
        let state = self.state.borrow();
        state.imu.hub[reg as usize % state.imu.hub.len()]
    }

    pub fn baro_register(&self, reg: u8) -> u8 {
        self.state.borrow().baro.regs[reg as usize & 0x7F]
    }

    pub fn set_baro_register(&self, reg: u8, value: u8) {
        self.state.borrow_mut().baro.regs[reg as usize & 0x7F] = value;
    }

    fn set_imu_words(&self, first: u8, words: &[i16]) {
        let mut state = self.state.borrow_mut();
        for (i, word) in words.iter().enumerate() {
            let reg = first as usize + 2 * i;
            state.imu.main[reg..reg + 2].copy_from_slice(&word.to_le_bytes());
        }
    }

    pub fn set_accel_raw(&self, axes: [i16; 3]) {
        self.set_imu_words(lsm6dso::regs::OUTX_L_A, &axes);
    }

    pub fn set_gyro_raw(&self, axes: [i16; 3]) {
        self.set_imu_words(lsm6dso::regs::OUTX_L_G, &axes);
    }

    pub fn set_imu_temperature_raw(&self, raw: i16) {
        self.set_imu_words(lsm6dso::regs::OUT_TEMP_L, &[raw]);
    }

    /// Store a signed 24-bit pressure sample.
    pub fn set_baro_pressure_raw(&self, raw: i32) {
        let bytes = raw.to_le_bytes();
        let first = lps22hh::regs::PRESS_OUT_XL as usize;
        self.state.borrow_mut().baro.regs[first..first + 3].copy_from_slice(&bytes[..3]);
    }

    pub fn set_baro_temperature_raw(&self, raw: i16) {
        let first = lps22hh::regs::TEMP_OUT_L as usize;
        self.state.borrow_mut().baro.regs[first..first + 2].copy_from_slice(&raw.to_le_bytes());
    }

    /// Conversion result the simulated ADC hands to its callback.
    pub fn set_light_raw(&self, raw: u16) {
        self.state.borrow_mut().light_raw = raw & 0x0FFF;
    }

    pub fn light_raw(&self) -> u16 {
        self.state.borrow().light_raw
    }
}

/// Host bus handle into a [`SimBoard`].
#[derive(Clone)]
pub struct SimBus {
    state: Rc<RefCell<BoardState>>,
}

impl ErrorType for SimBus {
    type Error = ErrorKind;
}

impl I2c for SimBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.nacks > 0 {
            state.nacks -= 1;
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        if address != LSM6DSO_ADDRESS {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        let mut cursor: Option<u8> = None;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    let Some((&reg, data)) = bytes.split_first() else {
                        continue;
                    };
                    cursor = Some(reg);
                    for (i, &value) in data.iter().enumerate() {
                        let reg = reg.wrapping_add(i as u8);
                        trace!("sim: write {:#04x} = {:#04x}", reg, value);
                        state.ops.push(BusOp::Write {
                            address,
                            reg,
                            value,
                        });
                        state.imu_write(reg, value);
                    }
                }
                Operation::Read(buffer) => {
                    let Some(reg) = cursor else {
                        return Err(ErrorKind::Other);
                    };
                    state.ops.push(BusOp::Read { address, reg });
                    for (i, slot) in buffer.iter_mut().enumerate() {
                        *slot = state.imu_read(reg.wrapping_add(i as u8));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_selection() {
        let board = SimBoard::new();
        let mut bus = board.bus();
        let mut value = [0u8];

        bus.write_read(LSM6DSO_ADDRESS, &[0x02], &mut value).unwrap();
        assert_eq!(value[0], 0x3F);

        bus.write(LSM6DSO_ADDRESS, &[0x01, 0x40]).unwrap();
        bus.write(LSM6DSO_ADDRESS, &[0x02, 0x55]).unwrap();
        bus.write_read(LSM6DSO_ADDRESS, &[0x02], &mut value).unwrap();
        assert_eq!(value[0], 0x55);

        bus.write(LSM6DSO_ADDRESS, &[0x01, 0x00]).unwrap();
        bus.write_read(LSM6DSO_ADDRESS, &[0x02], &mut value).unwrap();
        assert_eq!(value[0], 0x3F);
    }

    #[test]
    fn test_injected_nacks_are_consumed() {
        let board = SimBoard::new();
        let mut bus = board.bus();
        board.inject_nacks(2);

        assert!(bus.write(LSM6DSO_ADDRESS, &[0x10, 0x00]).is_err());
        assert!(bus.write(LSM6DSO_ADDRESS, &[0x10, 0x00]).is_err());
        assert!(bus.write(LSM6DSO_ADDRESS, &[0x10, 0x00]).is_ok());
        assert_eq!(board.ops().len(), 1);
    }

    #[test]
    fn test_ready_countdown() {
        let board = SimBoard::new();
        board.set_imu_ready_after(Some(2));
        let mut bus = board.bus();
        let mut status = [0u8];

        let mut seen = Vec::new();
        for _ in 0..3 {
            bus.write_read(LSM6DSO_ADDRESS, &[0x1E], &mut status).unwrap();
            seen.push(status[0]);
        }
        assert_eq!(seen, [0x00, 0x00, 0x07]);
    }
}
