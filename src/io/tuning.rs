/// Process tuning for stable timings: real-time scheduling, CPU pinning and
/// real-time IO priority
use crate::config::ScanConfig;
use crate::{ScanError, ScanResult};
use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;

const RT_PRIORITY: libc::c_int = 31;

// linux/ioprio.h
const IOPRIO_WHO_PROCESS: libc::c_int = 1;
const IOPRIO_CLASS_RT: libc::c_int = 1;
const IOPRIO_CLASS_SHIFT: libc::c_int = 13;

fn ioprio_value(class: libc::c_int, level: libc::c_int) -> libc::c_int {
    (class << IOPRIO_CLASS_SHIFT) | level
}

/// Apply the tuning enabled in `config`. Any failure is fatal.
pub fn apply_process_tuning(config: &ScanConfig) -> ScanResult<()> {
    if config.realtime {
        make_real_time()?;
        tracing::info!(priority = RT_PRIORITY, "switched to SCHED_FIFO");
    }
    if config.affinity {
        pin_to_first_cpu()?;
        tracing::info!("pinned to CPU 0");
    }
    if config.rt_ioprio {
        set_rt_ioprio()?;
        tracing::info!("IO priority set to real-time");
    }
    Ok(())
}

fn make_real_time() -> ScanResult<()> {
    let param = libc::sched_param {
        sched_priority: RT_PRIORITY,
    };
    // SAFETY: param is a valid sched_param for the current process
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret < 0 {
        return Err(ScanError::Tuning(format!(
            "scheduler: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

fn pin_to_first_cpu() -> ScanResult<()> {
    let mut cpus = CpuSet::new();
    cpus.set(0)
        .map_err(|e| ScanError::Tuning(format!("affinity: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpus)
        .map_err(|e| ScanError::Tuning(format!("affinity: {e}")))
}

fn set_rt_ioprio() -> ScanResult<()> {
    // SAFETY: ioprio_set takes three integer arguments and touches no memory
    let ret = unsafe {
        libc::syscall(
            libc::SYS_ioprio_set,
            IOPRIO_WHO_PROCESS,
            0,
            ioprio_value(IOPRIO_CLASS_RT, 0),
        )
    };
    if ret != 0 {
        return Err(ScanError::Tuning(format!(
            "ioprio: can't make process IO class real-time: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ioprio_encoding() {
        assert_eq!(ioprio_value(IOPRIO_CLASS_RT, 0), 0x2000);
        assert_eq!(ioprio_value(IOPRIO_CLASS_RT, 4), 0x2004);
    }

    #[test]
    fn test_disabled_tuning_is_noop() {
        let config = ScanConfig::new("/dev/null").background();
        assert!(apply_process_tuning(&config).is_ok());
    }
}
