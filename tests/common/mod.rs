/// Shared fixtures for the integration tests: disk images on tmpfs and
/// quiet scan controllers
use latentscan::io::SimulatedDevice;
use latentscan::ui::Console;
use latentscan::{PassController, ScanConfig};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

pub const SECTOR: usize = 512;

/// Disk image of `blocks` blocks of `sectors_per_block` sectors
pub fn disk_image(blocks: usize, sectors_per_block: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create disk image");
    let block = vec![0x5Au8; sectors_per_block * SECTOR];
    for _ in 0..blocks {
        file.write_all(&block).expect("Failed to fill disk image");
    }
    file.flush().expect("Failed to flush disk image");
    file
}

/// Config for scanning an image file: tmpfs rejects O_DIRECT and the test
/// process may not tune itself
pub fn image_config(path: &Path, sectors_per_block: u64) -> ScanConfig {
    let mut config = ScanConfig::new(path)
        .with_sectors_per_block(sectors_per_block)
        .with_disk_cache_mib(0)
        .with_backoff(Duration::ZERO);
    config.direct = false;
    config.sync = false;
    config.flush = false;
    config.affinity = false;
    config.realtime = false;
    config.rt_ioprio = false;
    config
}

/// Config for a simulated device, which needs no file at all
pub fn simulated_config() -> ScanConfig {
    ScanConfig::new("/dev/simulated")
        .with_disk_cache_mib(0)
        .with_backoff(Duration::ZERO)
}

/// 128 healthy blocks answering in 1 ms
pub fn healthy_device() -> SimulatedDevice {
    SimulatedDevice::new(128, 256)
}

pub fn quiet_controller(config: ScanConfig) -> PassController {
    PassController::new(config)
        .expect("Invalid test configuration")
        .with_console(Console::silent())
}
