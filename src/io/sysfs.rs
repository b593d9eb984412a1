/// Kernel block device counters from `/sys/block/<name>/stat`
///
/// Used only to detect foreign I/O that overlapped a timed read; the scan is
/// correct without them, just less able to spot contaminated samples.
use super::IoCounters;
use crate::ScanResult;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SysfsCounters {
    stat_path: PathBuf,
}

impl SysfsCounters {
    /// Locate the stat file of a block device.
    ///
    /// Symlinks (like `/dev/disk/by-id/...`) are resolved first. Returns
    /// `None` for anything that is not a block special file or has no stat
    /// file.
    pub fn for_device(device: &Path) -> ScanResult<Option<Self>> {
        let resolved = std::fs::canonicalize(device)?;
        let metadata = std::fs::metadata(&resolved)?;
        if !metadata.file_type().is_block_device() {
            return Ok(None);
        }

        let Some(name) = resolved.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        tracing::debug!(device = %resolved.display(), name, "looking up sysfs stat file");

        Ok(Self::locate(Path::new("/sys"), name))
    }

    /// Whole disks live in `block/`, partitions only in `class/block/`
    fn locate(sys_root: &Path, name: &str) -> Option<Self> {
        [
            sys_root.join("block").join(name).join("stat"),
            sys_root.join("class/block").join(name).join("stat"),
        ]
        .into_iter()
        .find(|candidate| candidate.is_file())
        .map(|stat_path| Self { stat_path })
    }

    pub fn from_stat_path(stat_path: impl Into<PathBuf>) -> Self {
        Self {
            stat_path: stat_path.into(),
        }
    }

    pub fn stat_path(&self) -> &Path {
        &self.stat_path
    }

    pub fn read(&self) -> ScanResult<IoCounters> {
        let text = std::fs::read_to_string(&self.stat_path)?;
        parse_stat(&text).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("malformed stat file {}", self.stat_path.display()),
            )
            .into()
        })
    }
}

/// Fields 1 (reads completed), 3 (sectors read) and 5 (writes completed)
pub fn parse_stat(text: &str) -> Option<IoCounters> {
    let fields: Vec<u64> = text
        .split_whitespace()
        .take(5)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if fields.len() < 5 {
        return None;
    }
    Some(IoCounters {
        reads: fields[0],
        sectors_read: fields[2],
        writes: fields[4],
    })
}
