/// Detailed per-block statistics, one tab-separated line per read block
use crate::stats::StatTable;
use crate::ScanResult;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const HEADER: &str =
    "# block, avg, trunc_avg, std_dev, rel_std_dev, trunc_rel_std_dev, num_of_samples, samples";

/// Write the stats of every initialized block, with the individual samples
/// appended when `with_samples` is set.
///
/// The `trunc_*` columns hold the intelligent estimators: plain below five
/// samples, trimmed from five up.
pub fn write_stats_file(path: &Path, stats: &StatTable, with_samples: bool) -> ScanResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_stats(&mut out, stats, with_samples)?;
    out.flush()?;
    tracing::info!(path = %path.display(), "stats file written");
    Ok(())
}

pub fn write_stats(out: &mut impl Write, stats: &StatTable, with_samples: bool) -> ScanResult<()> {
    writeln!(out, "{HEADER}")?;
    for (index, block) in stats.initialized() {
        write!(
            out,
            "{}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{}",
            index,
            block.average(),
            block.int_average(),
            block.stdev(),
            block.rel_stdev(),
            block.int_rel_stdev(),
            block.count()
        )?;
        if with_samples {
            for sample in block.samples() {
                write!(out, "\t{sample:.4}")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_table() -> StatTable {
        let mut stats = StatTable::new(4);
        for t in [1.0, 2.0, 3.0] {
            stats[1].add_time(t);
        }
        stats[3].add_error();
        stats
    }

    #[test]
    fn test_only_initialized_blocks_listed() {
        let mut out = Vec::new();
        write_stats(&mut out, &sample_table(), false).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        // too few samples to trim, the plain estimators are written
        assert_eq!(lines[1], "1\t2.0000\t2.0000\t1.0000\t0.5000\t0.5000\t3");
        assert!(lines[2].starts_with("3\tNaN\t"));
        assert!(lines[2].ends_with("\t0"));
    }

    #[test]
    fn test_trimmed_columns_from_five_samples() {
        let mut stats = StatTable::new(1);
        for t in [1.0, 2.0, 3.0, 4.0, 100.0] {
            stats[0].add_time(t);
        }
        let mut out = Vec::new();
        write_stats(&mut out, &stats, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        let fields: Vec<&str> = text.lines().nth(1).unwrap().split('\t').collect();

        assert_eq!(fields[1], "22.0000");
        // window [2, 3, 4] once the outer samples are trimmed
        assert_eq!(fields[2], "3.0000");
        assert_eq!(fields[5], "0.3333");
        assert_eq!(fields[6], "5");
    }

    #[test]
    fn test_samples_appended() {
        let mut out = Vec::new();
        write_stats(&mut out, &sample_table(), true).unwrap();
        let text = String::from_utf8(out).unwrap();
        let line = text.lines().nth(1).unwrap();
        let fields: Vec<&str> = line.split('\t').collect();

        assert_eq!(fields.len(), 10);
        assert_eq!(&fields[7..], &["1.0000", "2.0000", "3.0000"]);
    }

    #[test]
    fn test_stats_file_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.txt");
        write_stats_file(&path, &sample_table(), false).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(HEADER));
        assert_eq!(text.lines().count(), 3);
    }
}
