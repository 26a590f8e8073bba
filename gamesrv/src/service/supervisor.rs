//! OS process supervisor adapter.
//!
//! Every query shells out to `systemctl`, `journalctl` or `ps` and parses the
//! fixed-format text they print. Nothing is cached.

use super::ServiceState;
use crate::utils::Command;

/// Resident memory and CPU load of one process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    pub memory_bytes: u64,
    pub cpu_percent: f64,
}

/// Operations on services managed by the OS supervisor.
pub trait Supervisor {
    fn state(&self, unit: &str) -> anyhow::Result<ServiceState>;

    fn is_enabled(&self, unit: &str) -> anyhow::Result<bool>;

    /// Main PID, `0` when no process is running.
    fn main_pid(&self, unit: &str) -> anyhow::Result<u32>;

    /// Exit status of the last main process, `0` when none has failed.
    fn exit_status(&self, unit: &str) -> anyhow::Result<i32>;

    /// Requests a start without waiting for it to finish.
    fn start(&self, unit: &str) -> anyhow::Result<()>;

    fn stop(&self, unit: &str) -> anyhow::Result<()>;

    fn enable(&self, unit: &str) -> anyhow::Result<()>;

    fn disable(&self, unit: &str) -> anyhow::Result<()>;

    /// Re-reads unit definitions after they were edited.
    fn reload(&self) -> anyhow::Result<()>;

    /// The last `lines` log lines of `unit`.
    fn logs(&self, unit: &str, lines: usize) -> anyhow::Result<String>;

    fn usage(&self, pid: u32) -> anyhow::Result<ResourceUsage>;
}

/// [`Supervisor`] backed by systemd.
#[derive(Debug, Default, Clone, Copy)]
pub struct Systemd;

impl Systemd {
    fn show(&self, unit: &str, property: &str) -> anyhow::Result<String> {
        Command::new("systemctl")
            .args(["show", "-p", property, unit])
            .output_text()
    }
}

impl Supervisor for Systemd {
    fn state(&self, unit: &str) -> anyhow::Result<ServiceState> {
        let out = Command::new("systemctl")
            .args(["is-active", unit])
            .output_text()?;
        Ok(ServiceState::from_active(&out))
    }

    fn is_enabled(&self, unit: &str) -> anyhow::Result<bool> {
        let out = Command::new("systemctl")
            .args(["is-enabled", unit])
            .output_text()?;
        Ok(out == "enabled")
    }

    fn main_pid(&self, unit: &str) -> anyhow::Result<u32> {
        Ok(parse_property(&self.show(unit, "MainPID")?, "MainPID").unwrap_or(0))
    }

    fn exit_status(&self, unit: &str) -> anyhow::Result<i32> {
        Ok(parse_property(&self.show(unit, "ExecMainStatus")?, "ExecMainStatus").unwrap_or(0))
    }

    fn start(&self, unit: &str) -> anyhow::Result<()> {
        Command::new("systemctl")
            .args(["start", "--no-block", unit])
            .run()
    }

    fn stop(&self, unit: &str) -> anyhow::Result<()> {
        Command::new("systemctl").args(["stop", unit]).run()
    }

    fn enable(&self, unit: &str) -> anyhow::Result<()> {
        Command::new("systemctl").args(["enable", unit]).run()
    }

    fn disable(&self, unit: &str) -> anyhow::Result<()> {
        Command::new("systemctl").args(["disable", unit]).run()
    }

    fn reload(&self) -> anyhow::Result<()> {
        Command::new("systemctl").arg("daemon-reload").run()
    }

    fn logs(&self, unit: &str, lines: usize) -> anyhow::Result<String> {
        Command::new("journalctl")
            .args(["-u", unit, "-n", &lines.to_string(), "--no-pager"])
            .output_text()
    }

    fn usage(&self, pid: u32) -> anyhow::Result<ResourceUsage> {
        let pid = pid.to_string();
        let rss = Command::new("ps")
            .args(["h", "-p", &pid, "-o", "rss"])
            .output_text()?;
        let cpu = Command::new("ps")
            .args(["h", "-p", &pid, "-o", "%cpu"])
            .output_text()?;
        Ok(ResourceUsage {
            // ps reports kilobytes
            memory_bytes: rss.trim().parse::<u64>().unwrap_or(0) * 1024,
            cpu_percent: cpu.trim().parse().unwrap_or(0.0),
        })
    }
}

/// Extracts `value` from a `Name=value` line printed by `systemctl show`.
fn parse_property<T: std::str::FromStr>(out: &str, name: &str) -> Option<T> {
    out.lines()
        .find_map(|line| line.strip_prefix(name)?.strip_prefix('='))
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_show_properties() {
        assert_eq!(parse_property::<u32>("MainPID=4242", "MainPID"), Some(4242));
        assert_eq!(parse_property::<u32>("MainPID=0\n", "MainPID"), Some(0));
        assert_eq!(
            parse_property::<i32>("ExecMainStatus=137", "ExecMainStatus"),
            Some(137)
        );
        assert_eq!(parse_property::<u32>("", "MainPID"), None);
        assert_eq!(parse_property::<u32>("MainPIDX=3", "MainPID"), None);
    }

    #[test]
    fn maps_active_states() {
        assert_eq!(ServiceState::from_active("active"), ServiceState::Running);
        assert_eq!(ServiceState::from_active("reloading"), ServiceState::Running);
        assert_eq!(ServiceState::from_active("activating"), ServiceState::Starting);
        assert_eq!(ServiceState::from_active("deactivating"), ServiceState::Stopping);
        assert_eq!(ServiceState::from_active("failed"), ServiceState::Failed);
        assert_eq!(ServiceState::from_active("inactive"), ServiceState::Stopped);
        assert_eq!(ServiceState::from_active(""), ServiceState::Stopped);
    }
}
