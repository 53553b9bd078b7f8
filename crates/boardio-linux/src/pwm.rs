//! PWM through the sysfs class interface (`/sys/class/pwm`)

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use boardio_core::backend::PwmChannel;
use boardio_core::board::PwmRef;
use boardio_core::Result as CoreResult;

use crate::error::Result;
use crate::sysfs::{read_number, write_attr};

const PWM_CLASS: &str = "/sys/class/pwm";

/// udev may take a moment to set up the channel directory after export
const EXPORT_RETRIES: u32 = 10;
const EXPORT_DELAY: Duration = Duration::from_millis(20);

/// An exported sysfs PWM channel
pub struct LinuxPwm {
    pwm: PwmRef,
    dir: PathBuf,
    exported: bool,
}

impl LinuxPwm {
    /// Export (if needed) and open a channel
    pub fn open(pwm: PwmRef) -> Result<Self> {
        Self::open_in(Path::new(PWM_CLASS), pwm)
    }

    fn open_in(class: &Path, pwm: PwmRef) -> Result<Self> {
        let chip = class.join(format!("pwmchip{}", pwm.chip));
        let dir = chip.join(format!("pwm{}", pwm.channel));
        let mut exported = false;
        if !dir.exists() {
            log::debug!("pwm: exporting {}:{}", pwm.chip, pwm.channel);
            write_attr(&chip.join("export"), pwm.channel)?;
            exported = true;
            for _ in 0..EXPORT_RETRIES {
                if dir.join("period").exists() {
                    break;
                }
                thread::sleep(EXPORT_DELAY);
            }
        }
        Ok(Self { pwm, dir, exported })
    }

    fn attr(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl PwmChannel for LinuxPwm {
    fn set_period_ns(&mut self, ns: u64) -> CoreResult<()> {
        write_attr(&self.attr("period"), ns)?;
        Ok(())
    }

    fn period_ns(&self) -> CoreResult<u64> {
        Ok(read_number(&self.attr("period"))?)
    }

    fn set_duty_ns(&mut self, ns: u64) -> CoreResult<()> {
        write_attr(&self.attr("duty_cycle"), ns)?;
        Ok(())
    }

    fn duty_ns(&self) -> CoreResult<u64> {
        Ok(read_number(&self.attr("duty_cycle"))?)
    }

    fn set_enabled(&mut self, enabled: bool) -> CoreResult<()> {
        write_attr(&self.attr("enable"), u8::from(enabled))?;
        log::debug!(
            "pwm: {}:{} {}",
            self.pwm.chip,
            self.pwm.channel,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    fn is_enabled(&self) -> CoreResult<bool> {
        Ok(read_number::<u8>(&self.attr("enable"))? != 0)
    }
}

impl Drop for LinuxPwm {
    fn drop(&mut self) {
        if !self.exported {
            return;
        }
        let unexport = self
            .dir
            .parent()
            .map(|chip| write_attr(&chip.join("unexport"), self.pwm.channel));
        if let Some(Err(e)) = unexport {
            log::warn!("pwm: unexport failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_class(tag: &str) -> PathBuf {
        let class = std::env::temp_dir().join(format!("boardio-pwm-{}-{}", tag, std::process::id()));
        let channel = class.join("pwmchip0/pwm1");
        std::fs::create_dir_all(&channel).unwrap();
        for (attr, value) in [("period", "0"), ("duty_cycle", "0"), ("enable", "0")] {
            std::fs::write(channel.join(attr), value).unwrap();
        }
        class
    }

    #[test]
    fn channel_attributes() {
        let class = fake_class("attrs");
        let mut pwm = LinuxPwm::open_in(&class, PwmRef { chip: 0, channel: 1 }).unwrap();
        assert!(!pwm.exported);

        pwm.set_period_ns(1_000_000).unwrap();
        pwm.set_duty_ns(250_000).unwrap();
        pwm.set_enabled(true).unwrap();
        assert_eq!(pwm.period_ns().unwrap(), 1_000_000);
        assert_eq!(pwm.duty_ns().unwrap(), 250_000);
        assert!(pwm.is_enabled().unwrap());
    }

    #[test]
    fn missing_chip_fails_export() {
        let class = fake_class("missing");
        assert!(LinuxPwm::open_in(&class, PwmRef { chip: 3, channel: 0 }).is_err());
    }
}
