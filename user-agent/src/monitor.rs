// src/monitor.rs

//! Scan passes against the unhooker device.
//!
//! A pass asks the device for a report and, when hooks are present and
//! `auto_unhook` is set, repairs the table and asks again to confirm.
//! `watch` mode repeats passes on a fixed interval.

use anyhow::{Context, bail};
use shared::constants::{IOCTL_UNHOOKER_GET_STATUS, IOCTL_UNHOOKER_UNHOOK};
use shared::Report;
use std::thread;
use unhooker_driver::consts::nt_success;
use unhooker_driver::{IrpRequest, UnhookerDevice};

use crate::config::model::{MonitorConfig, MonitorMode};

/// What one pass saw and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub report: Report,
    pub repaired: bool,
    /// Report taken after the repair, if one ran.
    pub after: Option<Report>,
}

impl PassOutcome {
    /// Hooks still present when the pass finished.
    pub fn remaining(&self) -> u32 {
        self.after.as_ref().unwrap_or(&self.report).header.modified_count
    }
}

pub struct Monitor {
    device: UnhookerDevice,
    cfg: MonitorConfig,
}

impl Monitor {
    pub fn new(device: UnhookerDevice, cfg: MonitorConfig) -> Self {
        Self { device, cfg }
    }

    pub fn device(&self) -> &UnhookerDevice {
        &self.device
    }

    /// Issue GetStatus and decode what came back.
    pub fn get_status(&self) -> anyhow::Result<Report> {
        let mut buf = vec![0u8; self.cfg.buffer_size];
        let done = self.device.dispatch(IrpRequest::DeviceControl {
            code: IOCTL_UNHOOKER_GET_STATUS,
            output: &mut buf,
        });
        if !nt_success(done.status) {
            bail!("GetStatus failed with status {:#010x}", done.status);
        }
        Report::parse(&buf[..done.information]).context("device returned a malformed report")
    }

    /// Issue Unhook.
    pub fn unhook(&self) -> anyhow::Result<()> {
        let done = self.device.dispatch(IrpRequest::DeviceControl {
            code: IOCTL_UNHOOKER_UNHOOK,
            output: &mut [],
        });
        if !nt_success(done.status) {
            bail!("Unhook failed with status {:#010x}", done.status);
        }
        Ok(())
    }

    pub fn run_pass(&self) -> anyhow::Result<PassOutcome> {
        let report = self.get_status()?;
        if report.is_clean() {
            log::info!("Service table clean");
            return Ok(PassOutcome { report, repaired: false, after: None });
        }

        log::warn!(
            "Modified entries: {}, packed: {}",
            report.header.modified_count,
            report.header.entry_count
        );
        if !self.cfg.auto_unhook {
            return Ok(PassOutcome { report, repaired: false, after: None });
        }

        self.unhook()?;
        let after = self.get_status()?;
        if after.is_clean() {
            log::info!("Service table restored");
        } else {
            log::error!("Entries still modified after repair: {}", after.header.modified_count);
        }
        Ok(PassOutcome { report, repaired: true, after: Some(after) })
    }

    /// Run passes per the configured mode, handing each outcome to
    /// `on_pass`. Returns the number of passes made.
    pub fn run(&self, mut on_pass: impl FnMut(u64, &PassOutcome)) -> anyhow::Result<u64> {
        let limit = match self.cfg.mode {
            MonitorMode::Once => 1,
            MonitorMode::Watch => self.cfg.max_passes,
        };

        let mut pass = 0u64;
        loop {
            pass += 1;
            log::debug!("Starting pass {}", pass);
            let outcome = self.run_pass().with_context(|| format!("pass {} failed", pass))?;
            on_pass(pass, &outcome);

            if limit != 0 && pass >= limit {
                return Ok(pass);
            }
            log::debug!("Sleeping for {:?}", self.cfg.interval);
            thread::sleep(self.cfg.interval);
        }
    }
}
