//! Image indices used to locate reduced frames and confidence maps.
//!
//! Both indices are built from a flat listing of FITS paths (one per line),
//! stored as JSON documents and loaded read-only by the quicklook driver:
//!
//! ```text
//! run index:   {"583191": "/data/uvex_sep2007/r583191.fit"}
//! conf index:  {"/data/uvex_sep2007": {"u": "/data/uvex_sep2007/U_conf.fit"}}
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::domain::{Band, FieldAggregate, FieldId, RunNumber};

/// Path fragments marking directories of rejected or duplicate data.
pub const DEFAULT_IGNORED_MARKERS: [&str; 7] = [
    "junk", "badones", "crap", "9thoct", "Uband", "gband", "PROBLEMS",
];

/// Bands whose runs a quicklook needs.
pub const QUICKLOOK_BANDS: [Band; 3] = [Band::U, Band::G, Band::R];

/// Recursively lists `*.fit` and `*.fits` files below `root`, following
/// symlinks, in a stable order.
pub fn list_fits_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry =
            entry.with_context(|| format!("Failed to walk directory: {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.ends_with("fit") || name.ends_with("fits") {
            files.push(entry.into_path());
        }
    }
    log::info!("Found {} FITS files below {}", files.len(), root.display());
    Ok(files)
}

pub fn write_file_list(files: &[PathBuf], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for entry in files {
        writeln!(writer, "{}", entry.display())
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Reads a file listing, skipping blank lines.
pub fn read_file_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file list: {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Run number of a raw frame file name such as `r583191.fit` or
/// `r583191.fits.fz`.
pub fn run_from_filename(name: &str) -> Option<RunNumber> {
    let rest = name.strip_prefix('r')?;
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 || !rest[digits_len..].starts_with(".fit") {
        return None;
    }
    rest[..digits_len].parse().ok().map(RunNumber)
}

/// Band key of a confidence-map file name; `None` for anything else.
///
/// `u` and `g` prefixes are matched case-insensitively, the others as
/// written (`r`, `i`, `ha`/`Ha`/`h_`).
pub fn confidence_band_key(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    if lower.starts_with('u') {
        Some("u")
    } else if lower.starts_with('g') {
        Some("g")
    } else if name.starts_with('r') {
        Some("r")
    } else if name.starts_with('i') {
        Some("i")
    } else if lower.starts_with("ha") || name.starts_with("h_") {
        Some("ha")
    } else {
        None
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let de = &mut serde_json::Deserializer::from_str(&content);
    serde_path_to_error::deserialize(de).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Run number → raw frame path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunPathIndex {
    paths: BTreeMap<RunNumber, PathBuf>,
}

impl RunPathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes raw frames of a listing. Paths containing an ignored marker
    /// are skipped; a later path for the same run replaces the earlier one.
    pub fn from_listing<I, S>(entries: I, ignored_markers: &[String]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::new();
        let mut ignored = 0;
        for entry in entries {
            let path = entry.as_ref().trim();
            if ignored_markers.iter().any(|m| path.contains(m.as_str())) {
                ignored += 1;
                continue;
            }
            if let Some(run) = run_from_filename(file_name(path)) {
                if let Some(previous) = index.insert(run, PathBuf::from(path)) {
                    log::debug!("Run {} found twice, replacing {}", run, previous.display());
                }
            }
        }
        log::info!("Indexed {} runs ({} paths ignored)", index.len(), ignored);
        index
    }

    pub fn insert(&mut self, run: RunNumber, path: PathBuf) -> Option<PathBuf> {
        self.paths.insert(run, path)
    }

    pub fn get(&self, run: RunNumber) -> Option<&Path> {
        self.paths.get(&run).map(PathBuf::as_path)
    }

    pub fn contains(&self, run: RunNumber) -> bool {
        self.paths.contains_key(&run)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        read_json(path).context("Failed to load run index")
    }

    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        write_json(self, path)?;
        log::info!("Wrote {} runs to {}", self.len(), path.display());
        Ok(())
    }
}

/// Data directory → band key → confidence map path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfMapIndex {
    maps: BTreeMap<String, BTreeMap<String, PathBuf>>,
}

impl ConfMapIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes confidence maps (paths containing `conf` or `cpm`) by their
    /// directory and the band prefix of the file name.
    pub fn from_listing<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::new();
        for entry in entries {
            let path = entry.as_ref().trim();
            if !(path.contains("conf") || path.contains("cpm")) {
                continue;
            }
            let dir = parent_dir(path);
            let maps = index.maps.entry(dir.to_string()).or_default();
            if let Some(key) = confidence_band_key(file_name(path)) {
                maps.insert(key.to_string(), PathBuf::from(path));
            }
        }
        log::info!("Indexed confidence maps of {} directories", index.len());
        index
    }

    pub fn insert(&mut self, directory: impl Into<String>, band: Band, path: PathBuf) {
        self.maps
            .entry(directory.into())
            .or_default()
            .insert(band.suffix().to_string(), path);
    }

    /// Confidence map for frames stored in `directory`.
    pub fn get(&self, directory: &str, band: Band) -> Option<&Path> {
        self.maps
            .get(directory)
            .and_then(|maps| maps.get(band.suffix()))
            .map(PathBuf::as_path)
    }

    /// Confidence map for the directory holding `image`.
    pub fn for_image(&self, image: &Path, band: Band) -> Option<&Path> {
        let dir = image.parent()?.to_string_lossy();
        self.get(&dir, band)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        read_json(path).context("Failed to load confidence map index")
    }

    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        write_json(self, path)?;
        log::info!("Wrote confidence maps of {} directories to {}", self.len(), path.display());
        Ok(())
    }
}

/// A quicklook run absent from the run index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRun {
    pub field: FieldId,
    pub band: Band,
    pub run: RunNumber,
}

/// Outcome of [`check_index`].
#[derive(Debug, Clone, Default)]
pub struct IndexCheck {
    /// Fields with U, g and r present whose runs were looked up.
    pub checked: usize,
    /// Fields skipped because their directory is known to be missing.
    pub skipped: usize,
    pub missing: Vec<MissingRun>,
}

impl IndexCheck {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Verifies that every run a quicklook would need is indexed.
pub fn check_index(
    aggregates: &[FieldAggregate],
    index: &RunPathIndex,
    missing_dirs: &[String],
) -> IndexCheck {
    let mut check = IndexCheck::default();

    for aggregate in aggregates {
        if !aggregate.has_all(&QUICKLOOK_BANDS) {
            continue;
        }
        if let Some(dir) = &aggregate.dir {
            if missing_dirs.iter().any(|d| d == dir) {
                check.skipped += 1;
                continue;
            }
        }

        check.checked += 1;
        for band in QUICKLOOK_BANDS {
            if let Some(metrics) = aggregate.band(band) {
                if !index.contains(metrics.run) {
                    log::error!("{} {}: run {} not indexed", aggregate.field, band, metrics.run);
                    check.missing.push(MissingRun {
                        field: aggregate.field,
                        band,
                        run: metrics.run,
                    });
                }
            }
        }
    }

    log::info!(
        "Checked {} fields ({} skipped): {} runs missing",
        check.checked,
        check.skipped,
        check.missing.len()
    );
    check
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::BandMetrics;
    use tempfile::TempDir;

    fn markers() -> Vec<String> {
        DEFAULT_IGNORED_MARKERS.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_run_from_filename() {
        assert_eq!(run_from_filename("r583191.fit"), Some(RunNumber(583191)));
        assert_eq!(run_from_filename("r583191.fits.fz"), Some(RunNumber(583191)));
        assert_eq!(run_from_filename("r583191_conf.fit"), None);
        assert_eq!(run_from_filename("rconf.fit"), None);
        assert_eq!(run_from_filename("U_conf.fit"), None);
    }

    #[test]
    fn test_confidence_band_key() {
        assert_eq!(confidence_band_key("U_conf.fit"), Some("u"));
        assert_eq!(confidence_band_key("g_conf.fit"), Some("g"));
        assert_eq!(confidence_band_key("r_conf.fit"), Some("r"));
        assert_eq!(confidence_band_key("i_cpm.fit"), Some("i"));
        assert_eq!(confidence_band_key("Ha_conf.fits"), Some("ha"));
        assert_eq!(confidence_band_key("h_conf.fit"), Some("ha"));
        assert_eq!(confidence_band_key("conf.fit"), None);
        assert_eq!(confidence_band_key("R_conf.fit"), None);
    }

    #[test]
    fn test_run_index_from_listing() {
        let listing = [
            "/data/uvex_sep2007/r583191.fit",
            "/data/uvex_sep2007/junk/r583192.fit",
            "/data/uvex_sep2007/U_conf.fit",
            "/data/PROBLEMS/r583193.fit",
            "/data/uvex_oct2007/r583191.fit",
        ];
        let index = RunPathIndex::from_listing(listing, &markers());

        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get(RunNumber(583191)),
            Some(Path::new("/data/uvex_oct2007/r583191.fit"))
        );
        assert!(!index.contains(RunNumber(583192)));
    }

    #[test]
    fn test_conf_index_from_listing() {
        let listing = [
            "/data/sep2007/U_conf.fit",
            "/data/sep2007/g_conf.fit",
            "/data/sep2007/r_conf.fit",
            "/data/sep2007/r583191.fit",
            "/data/sep2007/weird_cpm.fit",
        ];
        let index = ConfMapIndex::from_listing(listing);

        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get("/data/sep2007", Band::U),
            Some(Path::new("/data/sep2007/U_conf.fit"))
        );
        assert_eq!(
            index.for_image(Path::new("/data/sep2007/r583191.fit"), Band::R),
            Some(Path::new("/data/sep2007/r_conf.fit"))
        );
        assert_eq!(index.get("/data/sep2007", Band::HeI), None);
    }

    #[test]
    fn test_json_documents() {
        let dir = TempDir::new().unwrap();
        let runs = RunPathIndex::from_listing(["/d/r1.fit", "/d/r22.fit"], &[]);
        let path = dir.path().join("run2path.json");
        runs.to_json_file(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["22"], "/d/r22.fit");
        assert_eq!(RunPathIndex::from_json_file(&path).unwrap(), runs);

        let mut confs = ConfMapIndex::new();
        confs.insert("/d", Band::G, PathBuf::from("/d/g_conf.fit"));
        let path = dir.path().join("dir2conf.json");
        confs.to_json_file(&path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["/d"]["g"], "/d/g_conf.fit");
        assert_eq!(ConfMapIndex::from_json_file(&path).unwrap(), confs);
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"583191": 12}"#).unwrap();

        let err = RunPathIndex::from_json_file(&path).unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("583191"), "{}", chain);
    }

    #[test]
    fn test_list_fits_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sep2007")).unwrap();
        std::fs::write(dir.path().join("sep2007/r2.fit"), b"").unwrap();
        std::fs::write(dir.path().join("sep2007/r1.fits"), b"").unwrap();
        std::fs::write(dir.path().join("sep2007/notes.txt"), b"").unwrap();

        let files = list_fits_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["r1.fits", "r2.fit"]);

        let list = dir.path().join("files.txt");
        write_file_list(&files, &list).unwrap();
        assert_eq!(read_file_list(&list).unwrap().len(), 2);
    }

    #[test]
    fn test_check_index() {
        let metrics = |run| BandMetrics {
            run: RunNumber(run),
            ..Default::default()
        };
        let mut complete = FieldAggregate::new(FieldId::plain(1));
        complete.dir = Some("sep2007".to_string());
        complete.set_band(Band::U, metrics(1));
        complete.set_band(Band::G, metrics(2));
        complete.set_band(Band::R, metrics(3));

        let mut skipped = complete.clone();
        skipped.field = FieldId::plain(2);
        skipped.dir = Some("jul2013".to_string());

        let mut partial = FieldAggregate::new(FieldId::plain(3));
        partial.set_band(Band::R, metrics(9));

        let index = RunPathIndex::from_listing(["/d/r1.fit", "/d/r3.fit"], &[]);
        let check = check_index(
            &[complete, skipped, partial],
            &index,
            &["jul2013".to_string()],
        );

        assert_eq!(check.checked, 1);
        assert_eq!(check.skipped, 1);
        assert_eq!(
            check.missing,
            vec![MissingRun {
                field: FieldId::plain(1),
                band: Band::G,
                run: RunNumber(2)
            }]
        );
        assert!(!check.is_complete());
    }
}
