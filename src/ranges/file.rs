/// LBA range files
///
/// One range per line, `start_lba end_lba`, end exclusive. Used for the
/// suspect-sector output (`-w`) and the scan-only-these-ranges input (`-r`).
use super::{BlockRange, BlockRangeList};
use crate::{ScanError, ScanResult};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Write `list` as LBA ranges. An empty list leaves a zero-length file.
pub fn write_range_file(
    path: &Path,
    list: &BlockRangeList,
    sectors_per_block: u64,
) -> ScanResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for range in list {
        writeln!(
            out,
            "{} {}",
            range.offset * sectors_per_block,
            range.end() * sectors_per_block
        )?;
    }
    out.flush()?;
    Ok(())
}

/// Read LBA ranges and convert them to block ranges.
///
/// The start rounds down and the end rounds up to whole blocks. Inverted
/// ranges, ranges not sorted by start and files without any range are
/// rejected.
pub fn read_range_file(path: &Path, sectors_per_block: u64) -> ScanResult<BlockRangeList> {
    let reader = BufReader::new(File::open(path)?);
    let error = |line: usize, reason: String| ScanError::RangeFile {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut list = BlockRangeList::new();
    let mut previous_start: Option<u64> = None;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let number = index + 1;
        let mut fields = line.split_whitespace();
        let (start, end) = match (fields.next(), fields.next(), fields.next()) {
            (None, _, _) => continue,
            (Some(start), Some(end), None) => (start, end),
            _ => return Err(error(number, "expected two LBA numbers".to_string())),
        };
        let start: u64 = start
            .parse()
            .map_err(|e| error(number, format!("bad start LBA {start:?}: {e}")))?;
        let end: u64 = end
            .parse()
            .map_err(|e| error(number, format!("bad end LBA {end:?}: {e}")))?;

        if end <= start {
            return Err(error(
                number,
                format!("end LBA {end} is not after start LBA {start}"),
            ));
        }
        if previous_start.is_some_and(|previous| start < previous) {
            return Err(error(number, "ranges are not sorted".to_string()));
        }
        previous_start = Some(start);

        let offset = start / sectors_per_block;
        let end_block = end.div_ceil(sectors_per_block);
        list.push(BlockRange::new(offset, end_block - offset));
    }

    if list.is_empty() {
        return Err(error(0, "file contains no ranges".to_string()));
    }
    Ok(list)
}
