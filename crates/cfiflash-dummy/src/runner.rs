//! Execution of the stock ARMv4 flash routines
//!
//! The emulated CPU doesn't decode instructions. It recognizes which routine
//! was downloaded at the entry point and performs that routine's loads,
//! stores and polls through the target's own memory map, so the flash bank
//! sees exactly the bus cycles the real loop would issue.

use crate::DummyTarget;
use alloc::vec;
use cfiflash_core::algorithm::{armv4, Algorithm};
use cfiflash_core::cfi::command::BusWord;
use cfiflash_core::error::{Error, Result};
use cfiflash_core::target::{RegParam, Target};

const REGISTER_COUNT: usize = 16;

/// Polls (or loop iterations) the emulated CPU manages per millisecond
const STEPS_PER_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Routine {
    Write(u32),
    EraseCheck,
}

fn register_index(name: &str) -> Option<usize> {
    name.strip_prefix('r')?
        .parse::<usize>()
        .ok()
        .filter(|&i| i < REGISTER_COUNT)
}

impl DummyTarget {
    /// Find which routine sits at `entry`
    fn identify_routine(&mut self, entry: u32) -> Option<(Routine, &'static Algorithm)> {
        let set = &armv4::ALGORITHMS;
        let candidates = [
            (Routine::Write(1), &set.write_8),
            (Routine::Write(2), &set.write_16),
            (Routine::Write(4), &set.write_32),
            (Routine::EraseCheck, &set.erase_check),
        ];
        let endianness = self.endianness();
        for (routine, algorithm) in candidates {
            let code = algorithm.code_bytes(endianness);
            let mut loaded = vec![0u8; code.len()];
            if self.read_buffer(entry, &mut loaded).is_ok() && loaded == code {
                return Some((routine, algorithm));
            }
        }
        None
    }

    pub(crate) fn execute(
        &mut self,
        entry: u32,
        exit: u32,
        params: &mut [RegParam],
        timeout_ms: u32,
    ) -> Result<()> {
        if !self.halted {
            return Err(Error::TargetBusy);
        }
        let Some((routine, algorithm)) = self.identify_routine(entry) else {
            log::error!("no known routine at 0x{:08x}", entry);
            return Err(Error::AlgorithmFailed);
        };
        if exit != entry.wrapping_add(algorithm.exit_offset) {
            log::error!(
                "{} would not stop at 0x{:08x} (exit is at 0x{:08x})",
                algorithm.name,
                exit,
                entry.wrapping_add(algorithm.exit_offset)
            );
            return Err(Error::AlgorithmFailed);
        }

        let mut regs = [0u32; REGISTER_COUNT];
        for param in params.iter().filter(|p| p.is_input()) {
            let index = register_index(param.name).ok_or(Error::AlgorithmFailed)?;
            regs[index] = param.value;
        }

        let budget = timeout_ms as u64 * STEPS_PER_MS;
        log::trace!("running {} at 0x{:08x}", algorithm.name, entry);
        match routine {
            Routine::Write(width) => self.run_write(&mut regs, width, budget)?,
            Routine::EraseCheck => self.run_erase_check(&mut regs, budget)?,
        }
        self.algorithm_runs += 1;

        for param in params.iter_mut().filter(|p| p.is_output()) {
            let index = register_index(param.name).ok_or(Error::AlgorithmFailed)?;
            param.value = regs[index];
        }
        Ok(())
    }

    fn load(&mut self, address: u32, width: u32) -> Result<u32> {
        let mut bytes = [0u8; 4];
        let w = width as usize;
        self.read_memory(address, width, 1, &mut bytes[..w])?;
        Ok(BusWord::from_bytes(&bytes[..w], self.endianness()).value())
    }

    fn store(&mut self, address: u32, value: u32, width: u32) -> Result<()> {
        let bytes = BusWord::from_value(value, width).to_bytes(self.endianness());
        self.write_memory(address, width, 1, &bytes[..width as usize])
    }

    /// r0 source, r1 destination, r2 word count, r3 program command, r4 status
    fn run_write(&mut self, regs: &mut [u32; REGISTER_COUNT], width: u32, budget: u64) -> Result<()> {
        loop {
            regs[4] = self.load(regs[0], width)?;
            regs[0] = regs[0].wrapping_add(width);
            self.store(regs[1], regs[3], width)?;
            self.store(regs[1], regs[4], width)?;

            let mut polls = 0u64;
            loop {
                regs[4] = self.load(regs[1], width)?;
                if regs[4] & 0x80 != 0 {
                    break;
                }
                polls += 1;
                if polls > budget {
                    log::error!("block write timed out at 0x{:08x}", regs[1]);
                    return Err(Error::AlgorithmFailed);
                }
            }
            if regs[4] & 0x7f != 0 {
                return Ok(());
            }

            regs[2] = regs[2].wrapping_sub(1);
            if regs[2] == 0 {
                return Ok(());
            }
            regs[1] = regs[1].wrapping_add(width);
        }
    }

    /// r0 address, r1 byte count, r2 accumulator
    fn run_erase_check(&mut self, regs: &mut [u32; REGISTER_COUNT], budget: u64) -> Result<()> {
        let mut steps = 0u64;
        loop {
            regs[3] = self.load(regs[0], 1)?;
            regs[0] = regs[0].wrapping_add(1);
            regs[2] &= regs[3];
            regs[1] = regs[1].wrapping_sub(1);
            if regs[1] == 0 {
                return Ok(());
            }
            steps += 1;
            if steps > budget {
                return Err(Error::AlgorithmFailed);
            }
        }
    }
}
