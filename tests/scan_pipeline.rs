/// End-to-end scans: sweep, re-reads, classification and every output file
#[path = "common/mod.rs"]
mod common;

use common::{disk_image, healthy_device, image_config, quiet_controller, simulated_config};
use latentscan::io::{BlockDevice, RawDevice, SimulatedDevice};
use latentscan::ranges::{read_range_file, write_range_file};
use latentscan::report::{
    stats_file::HEADER, write_json_report, write_stats_file, DiskVerdict, JsonReport, ScanSummary,
};
use latentscan::{reset_interrupted, BlockRange};
use serial_test::serial;
use tempfile::TempDir;

#[test]
#[serial]
fn test_healthy_device_is_excellent() {
    reset_interrupted();
    let mut pass = quiet_controller(simulated_config());
    let mut device = healthy_device();

    let outcome = pass.run(&mut device).unwrap();
    let summary = ScanSummary::from_outcome(&outcome, pass.thresholds());

    assert!(outcome.bad_blocks.is_empty());
    assert_eq!(summary.tested_blocks, 128);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.verdict, DiskVerdict::Excellent);
    assert!(!summary.verdict.is_alarming());
}

#[test]
#[serial]
fn test_suspects_survive_a_range_file_round_trip() {
    reset_interrupted();
    let dir = TempDir::new().unwrap();
    let sectors_file = dir.path().join("suspects.txt");
    let faulty = || {
        SimulatedDevice::new(128, 256)
            .with_failing_block(40)
            .with_slow_block(90, 40.0)
    };

    let mut pass = quiet_controller(simulated_config());
    let outcome = pass.run(&mut faulty()).unwrap();
    assert_eq!(
        outcome.bad_blocks.to_vec(),
        vec![BlockRange::single(40), BlockRange::single(90)]
    );

    write_range_file(&sectors_file, &outcome.bad_blocks, 256).unwrap();
    assert_eq!(
        std::fs::read_to_string(&sectors_file).unwrap(),
        "10240 10496\n23040 23296\n"
    );

    // second run over the suspects only
    let ranges = read_range_file(&sectors_file, 256).unwrap();
    let mut device = faulty();
    let mut pass = quiet_controller(simulated_config());
    let rescan = pass.run_ranges(&mut device, &ranges).unwrap();

    assert_eq!(rescan.bad_blocks.to_vec(), outcome.bad_blocks.to_vec());
    assert_eq!(rescan.stats.initialized().count(), 2);
    assert!(rescan.stats[40].errors() > 0);
}

#[test]
#[serial]
fn test_failing_disk_verdict() {
    reset_interrupted();
    // any block that keeps returning EIO fails the disk
    let mut device = [10, 50, 100]
        .into_iter()
        .fold(SimulatedDevice::new(128, 256), |dev, block| {
            dev.with_failing_block(block)
        });
    let mut pass = quiet_controller(simulated_config().with_max_reads(4));

    let outcome = pass.run(&mut device).unwrap();
    let summary = ScanSummary::from_outcome(&outcome, pass.thresholds());

    assert_eq!(summary.histogram.errors, 3);
    assert_eq!(summary.verdict, DiskVerdict::Failed);
    assert!(summary.verdict.is_alarming());
    assert_eq!(outcome.bad_blocks.len(), 3);
}

#[test]
#[serial]
fn test_image_file_scan_writes_every_output() {
    reset_interrupted();
    let dir = TempDir::new().unwrap();
    let image = disk_image(32, 8);
    let config = image_config(image.path(), 8).with_max_reads(4);

    let mut device = RawDevice::open(&config).unwrap();
    assert_eq!(device.block_count(), 32);
    let mut pass = quiet_controller(config.clone());
    let outcome = pass.run(&mut device).unwrap();
    let summary = ScanSummary::from_outcome(&outcome, pass.thresholds());

    assert!(outcome.sweep.loops >= 1);
    assert!(!outcome.interrupted);
    assert_eq!(outcome.stats.initialized().count(), 32);
    assert_eq!(summary.tested_blocks, 32);
    assert_eq!(summary.errors, 0);

    let stats_path = dir.path().join("stats.txt");
    write_stats_file(&stats_path, &outcome.stats, true).unwrap();
    let text = std::fs::read_to_string(&stats_path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(HEADER));
    assert_eq!(lines.count(), 32);

    let json_path = dir.path().join("report.json");
    write_json_report(&json_path, &JsonReport::new(&config, &outcome, &summary)).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(value["summary"]["tested_blocks"], 32);
    assert_eq!(value["config"]["sectors_per_block"], 8);
    assert_eq!(value["interrupted"], false);

    let mut rendered = Vec::new();
    summary.write_to(&mut rendered, false).unwrap();
    let rendered = String::from_utf8(rendered).unwrap();
    assert!(rendered.contains("ERR"));
}
