//! In-memory register file standing in for the expander on the I2C bus

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation, SevenBitAddress};
use parking_lot::Mutex;
use std::sync::Arc;

use super::registers::{BIT_ADDRESSED_REGS, BIT_PWMCON0_LOAD, REG_PWMCON0};

#[derive(Default)]
struct FakeState {
    regs: Vec<u8>,
    pointer: u8,
    writes: Vec<(u8, u8)>,
    fail: bool,
    stick_load: bool,
}

/// Cloneable fake bus; clones share one register file
#[derive(Clone)]
pub(crate) struct FakeBus {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBus {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                regs: vec![0; 256],
                ..Default::default()
            })),
        }
    }

    pub(crate) fn reg(&self, reg: u8) -> u8 {
        self.state.lock().regs[usize::from(reg)]
    }

    pub(crate) fn set_reg(&self, reg: u8, value: u8) {
        self.state.lock().regs[usize::from(reg)] = value;
    }

    /// Raw bytes written to `reg`, in order
    pub(crate) fn writes_to(&self, reg: u8) -> Vec<u8> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(r, _)| *r == reg)
            .map(|(_, v)| *v)
            .collect()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    pub(crate) fn fail(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    /// Keep the PWM LOAD bit set after it is written, as if the chip hung
    pub(crate) fn stick_pwm_load(&self, stick: bool) {
        self.state.lock().stick_load = stick;
    }
}

impl FakeState {
    fn write_reg(&mut self, reg: u8, value: u8) {
        self.writes.push((reg, value));
        let slot = &mut self.regs[usize::from(reg)];

        if BIT_ADDRESSED_REGS.contains(&reg) {
            let bit = value & 0b111;
            if value & 0b1000 != 0 {
                *slot |= 1 << bit;
            } else {
                *slot &= !(1 << bit);
            }
            return;
        }

        *slot = value;
        if reg == REG_PWMCON0 && !self.stick_load {
            *slot &= !(1 << BIT_PWMCON0_LOAD);
        }
    }
}

impl ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c<SevenBitAddress> for FakeBus {
    fn transaction(
        &mut self,
        _address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        if state.fail {
            return Err(ErrorKind::Other);
        }

        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    let Some((&reg, data)) = bytes.split_first() else {
                        continue;
                    };
                    state.pointer = reg;
                    for &value in data {
                        let reg = state.pointer;
                        state.write_reg(reg, value);
                        state.pointer = state.pointer.wrapping_add(1);
                    }
                }
                Operation::Read(buf) => {
                    for byte in buf.iter_mut() {
                        *byte = state.regs[usize::from(state.pointer)];
                        state.pointer = state.pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}
