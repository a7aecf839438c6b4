//! Quicklook production against recorded tool invocations.

mod support;

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uvex_qc::core::domain::{Band, BandMetrics, FieldAggregate, FieldId, RunNumber};
use uvex_qc::quicklook::{
    ConfMapIndex, QuicklookDriver, QuicklookError, QuicklookJob, QuicklookSettings, RunPathIndex,
};

use support::FakeTools;

struct Archive {
    _root: TempDir,
    data: PathBuf,
    scratch: PathBuf,
    outdir: PathBuf,
    runs: RunPathIndex,
    confs: ConfMapIndex,
}

/// Raw frames for runs 101..=106 and one confidence map per band.
fn archive() -> Archive {
    let root = TempDir::new().unwrap();
    let data = root.path().join("sep2007");
    fs::create_dir_all(&data).unwrap();

    let mut listing = Vec::new();
    for run in 101..=106 {
        let path = data.join(format!("r{}.fit", run));
        fs::write(&path, support::mosaic_fits()).unwrap();
        listing.push(path.display().to_string());
    }
    for name in ["U_conf.fit", "g_conf.fit", "r_conf.fit"] {
        let path = data.join(name);
        fs::write(&path, b"conf").unwrap();
        listing.push(path.display().to_string());
    }

    Archive {
        scratch: root.path().join("scratch"),
        outdir: root.path().join("quicklook"),
        runs: RunPathIndex::from_listing(&listing, &[]),
        confs: ConfMapIndex::from_listing(&listing),
        data,
        _root: root,
    }
}

fn field(number: u32, runs: [u32; 3], time: &str) -> FieldAggregate {
    let mut aggregate = FieldAggregate::new(FieldId::plain(number));
    aggregate.dir = Some("sep2007".to_string());
    for (band, run) in [Band::U, Band::G, Band::R].into_iter().zip(runs) {
        aggregate.set_band(
            band,
            BandMetrics {
                run: RunNumber(run),
                time: Some(time.to_string()),
                ..Default::default()
            },
        );
    }
    aggregate
}

fn settings(scratch: &Path) -> QuicklookSettings {
    QuicklookSettings {
        workdir: scratch.to_path_buf(),
        ..QuicklookSettings::default()
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

#[test]
fn test_directory_produces_small_jpegs() {
    let archive = archive();
    assert_eq!(archive.runs.len(), 6);
    let aggregates = vec![field(9, [101, 102, 103], "2007-09-02 23:41:07")];

    let mut driver = QuicklookDriver::new(
        FakeTools::default(),
        &archive.runs,
        &archive.confs,
        settings(&archive.scratch),
    );
    let summary = driver.run_directory(&aggregates, "sep2007", &archive.outdir);

    assert_eq!(summary.succeeded, vec![FieldId::plain(9)]);
    assert!(summary.failed.is_empty());
    assert_eq!(
        file_names(&archive.outdir.join("sep2007")),
        vec![
            "20070902-2341-103-0009-col-small.jpg",
            "20070902-2341-103-0009-g-small.jpg",
            "20070902-2341-103-0009-r-small.jpg",
            "20070902-2341-103-0009-u-small.jpg",
        ]
    );
    assert!(file_names(&archive.scratch).is_empty());

    let tools = driver.runner();
    assert_eq!(tools.calls.len(), 11);
    assert_eq!(tools.calls_to("mosaic"), 3);
    assert_eq!(tools.calls_to("mJPEG"), 3);
    assert_eq!(tools.calls_to("convert"), 5);

    let first = &tools.calls[0];
    assert_eq!(first.name(), "mosaic");
    assert_eq!(PathBuf::from(&first.args[0]), archive.data.join("r101.fit"));
    assert_eq!(PathBuf::from(&first.args[1]), archive.data.join("U_conf.fit"));
    assert_eq!(first.args[4], "--skyflag=0");

    let combine = &tools.calls[9];
    let channels: Vec<String> = combine.args[..3]
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    assert!(channels[0].ends_with("-r.jpg[6210x6145+0+0]"));
    assert!(channels[1].ends_with("-g.jpg[6210x6145+0+0]"));
    assert!(channels[2].ends_with("-u.jpg[6210x6145+0+0]"));
}

#[test]
fn test_failed_field_is_cleaned_up_and_batch_continues() {
    let archive = archive();
    let aggregates = vec![
        field(9, [101, 102, 103], "2007-09-02 23:41:07"),
        field(10, [104, 105, 106], "2007-09-03 01:02:59"),
    ];

    let mut driver = QuicklookDriver::new(
        FakeTools::failing("mJPEG", "-103-0009-g.fit"),
        &archive.runs,
        &archive.confs,
        settings(&archive.scratch),
    );
    let summary = driver.run_directory(&aggregates, "sep2007", &archive.outdir);

    assert_eq!(summary.succeeded, vec![FieldId::plain(10)]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, FieldId::plain(9));
    assert!(summary.failed[0].1.contains("cannot open input"));
    assert_eq!(summary.total(), 2);

    let produced = file_names(&archive.outdir.join("sep2007"));
    assert_eq!(produced.len(), 4);
    assert!(produced.iter().all(|n| n.starts_with("20070903-0102-106-0010")));
    assert!(file_names(&archive.scratch).is_empty());
}

#[test]
fn test_missing_inputs_run_no_tools() {
    let archive = archive();
    let mut driver = QuicklookDriver::new(
        FakeTools::default(),
        &archive.runs,
        &archive.confs,
        settings(&archive.scratch),
    );

    let unknown_run =
        QuicklookJob::from_aggregate(&field(11, [101, 102, 999], "2007-09-02 23:41:07")).unwrap();
    let err = driver.run_job(&unknown_run, &archive.outdir).unwrap_err();
    assert!(matches!(err, QuicklookError::MissingRun(RunNumber(999))));

    fs::remove_file(archive.data.join("r102.fit")).unwrap();
    let missing_file =
        QuicklookJob::from_aggregate(&field(12, [101, 102, 103], "2007-09-02 23:41:07")).unwrap();
    let err = driver.run_job(&missing_file, &archive.outdir).unwrap_err();
    assert!(matches!(err, QuicklookError::MissingFile(_)));

    let bad_time = QuicklookJob::from_aggregate(&field(13, [101, 103, 104], "yesterday")).unwrap();
    let err = driver.run_job(&bad_time, &archive.outdir).unwrap_err();
    assert!(matches!(err, QuicklookError::InvalidTimestamp(_)));

    assert!(driver.runner().calls.is_empty());
    assert!(file_names(&archive.outdir).is_empty());
}

#[test]
fn test_missing_confidence_map() {
    let archive = archive();
    let mut confs = ConfMapIndex::new();
    let dir = archive.data.display().to_string();
    confs.insert(dir.clone(), Band::U, archive.data.join("U_conf.fit"));
    confs.insert(dir, Band::G, archive.data.join("g_conf.fit"));

    let mut driver = QuicklookDriver::new(
        FakeTools::default(),
        &archive.runs,
        &confs,
        settings(&archive.scratch),
    );
    let job =
        QuicklookJob::from_aggregate(&field(9, [101, 102, 103], "2007-09-02 23:41:07")).unwrap();
    let err = driver.run_job(&job, &archive.outdir).unwrap_err();
    assert!(matches!(
        err,
        QuicklookError::MissingConfidenceMap { band: Band::R, .. }
    ));
    assert!(driver.runner().calls.is_empty());
}
