/// Real device access: positioned O_DIRECT reads into an aligned buffer
use super::buffer::AlignedBuffer;
use super::sysfs::SysfsCounters;
use super::{BlockDevice, BlockRead, IoCounters};
use crate::config::ScanConfig;
use crate::{ScanError, ScanResult};
use nix::fcntl::{posix_fadvise, PosixFadviseAdvice};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileExt, FileTypeExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Instant;

// BLKGETSIZE64 = _IOR(0x12, 114, size_t)
nix::ioctl_read!(blk_get_size64, 0x12, 114, u64);

pub struct RawDevice {
    file: File,
    path: PathBuf,
    size_bytes: u64,
    block_count: u64,
    sectors_per_block: u64,
    block_bytes: u64,
    direct: bool,
    buffer: AlignedBuffer,
    counters: Option<SysfsCounters>,
}

impl RawDevice {
    /// Open the configured device read-only with the configured flags.
    ///
    /// The size is rounded down to whole blocks and optionally limited by
    /// `max_sectors`.
    pub fn open(config: &ScanConfig) -> ScanResult<Self> {
        let path = config.device.clone();
        let mut flags = 0;
        if config.direct {
            flags |= libc::O_DIRECT;
        }
        if config.sync {
            flags |= libc::O_SYNC;
        }
        if config.exclusive {
            flags |= libc::O_EXCL;
        }
        tracing::debug!(
            device = %path.display(),
            direct = config.direct,
            sync = config.sync,
            exclusive = config.exclusive,
            "opening device"
        );

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(flags)
            .open(&path)?;

        let size_bytes = device_size(&file, &path)?;
        let block_bytes = config.block_bytes();
        let mut block_count = size_bytes / block_bytes;
        if block_count == 0 {
            return Err(ScanError::DeviceTooSmall {
                bytes: size_bytes,
                block_bytes,
            });
        }
        if let Some(max_sectors) = config.max_sectors {
            block_count = block_count.min(max_sectors.div_ceil(config.sectors_per_block));
        }
        tracing::info!(
            device = %path.display(),
            size_bytes,
            block_count,
            "device opened"
        );

        if config.flush {
            drop_page_cache(&file)?;
        }

        let counters = SysfsCounters::for_device(&path)?;
        if counters.is_none() {
            tracing::warn!(
                device = %path.display(),
                "no kernel I/O counters, interrupted reads will go unnoticed"
            );
        }

        let buffer_len = usize::try_from(block_bytes).map_err(|_| {
            ScanError::InvalidConfig(format!("block of {block_bytes} bytes is too large"))
        })?;

        Ok(Self {
            file,
            path,
            size_bytes,
            block_count,
            sectors_per_block: config.sectors_per_block,
            block_bytes,
            direct: config.direct,
            buffer: AlignedBuffer::page_aligned(buffer_len)?,
            counters,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Device size before rounding to whole blocks
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

fn device_size(file: &File, path: &Path) -> ScanResult<u64> {
    let metadata = file.metadata()?;
    let file_type = metadata.file_type();
    if file_type.is_file() {
        Ok(metadata.len())
    } else if file_type.is_block_device() {
        let mut size: u64 = 0;
        // SAFETY: BLKGETSIZE64 writes a single u64 through the pointer
        unsafe { blk_get_size64(file.as_raw_fd(), &mut size) }
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
        Ok(size)
    } else {
        Err(ScanError::UnsupportedDevice(format!(
            "{} is neither a block device nor a regular file",
            path.display()
        )))
    }
}

/// Drop cached pages of the device so the first pass really hits the disk
fn drop_page_cache(file: &File) -> ScanResult<()> {
    let fd = file.as_raw_fd();
    for advice in [
        PosixFadviseAdvice::POSIX_FADV_DONTNEED,
        PosixFadviseAdvice::POSIX_FADV_NOREUSE,
    ] {
        posix_fadvise(fd, 0, 0, advice)
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
    }
    Ok(())
}

impl BlockDevice for RawDevice {
    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn sectors_per_block(&self) -> u64 {
        self.sectors_per_block
    }

    fn is_direct(&self) -> bool {
        self.direct
    }

    fn read_n_blocks_at(&mut self, offset: u64, count: u64) -> ScanResult<Vec<BlockRead>> {
        let mut reads = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
        let buffer = self.buffer.as_mut_slice();
        let wanted = usize::try_from(self.block_bytes).unwrap_or(buffer.len());

        let mut previous = Instant::now();
        for block in offset..offset + count {
            let result = self
                .file
                .read_at(&mut buffer[..wanted], block * self.block_bytes);
            let now = Instant::now();
            let latency_ms = now.duration_since(previous).as_secs_f64() * 1000.0;
            previous = now;

            let read = match result {
                Ok(bytes) if bytes == wanted => BlockRead::Complete { latency_ms },
                Ok(bytes) => BlockRead::Short { bytes, latency_ms },
                Err(e) if e.raw_os_error() == Some(libc::EIO) => {
                    tracing::warn!(block, "I/O error reading block");
                    BlockRead::IoError { latency_ms }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                    BlockRead::Short {
                        bytes: 0,
                        latency_ms,
                    }
                }
                Err(source) => return Err(ScanError::ReadFailed { block, source }),
            };
            reads.push(read);
        }
        Ok(reads)
    }

    fn io_counters(&mut self) -> Option<IoCounters> {
        let counters = self.counters.as_ref()?;
        match counters.read() {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!(
                    path = %counters.stat_path().display(),
                    error = %e,
                    "failed to read I/O counters"
                );
                None
            }
        }
    }
}
