use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::core::domain::{Band, FieldAggregate, FieldId, RunNumber};
use crate::quicklook::command::{ToolCommand, ToolRunner};
use crate::quicklook::error::{QuicklookError, QuicklookResult};
use crate::quicklook::fits_header;
use crate::quicklook::lookup::{ConfMapIndex, RunPathIndex, QUICKLOOK_BANDS};

/// Paths of the external programs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolPaths {
    pub mosaic: PathBuf,
    pub mjpeg: PathBuf,
    pub convert: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            mosaic: PathBuf::from("mosaic"),
            mjpeg: PathBuf::from("mJPEG"),
            convert: PathBuf::from("convert"),
        }
    }
}

/// Rendering parameters passed to the tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderParams {
    /// Lower stretch bound of the grey-scale rendering.
    pub low: String,
    pub high: String,
    pub stretch: String,
    /// Width in pixels of the downscaled JPEGs.
    pub small_width: u32,
    pub small_quality: u32,
    /// Common geometry the three channels are cropped to before combining.
    pub crop: String,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            low: "25%".to_string(),
            high: "99.9%".to_string(),
            stretch: "log".to_string(),
            small_width: 600,
            small_quality: 70,
            crop: "6210x6145+0+0".to_string(),
        }
    }
}

/// Tool locations, rendering parameters and the scratch directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuicklookSettings {
    pub tools: ToolPaths,
    pub render: RenderParams,
    pub workdir: PathBuf,
}

impl Default for QuicklookSettings {
    fn default() -> Self {
        Self {
            tools: ToolPaths::default(),
            render: RenderParams::default(),
            workdir: std::env::temp_dir().join("uvex-qc-scratch"),
        }
    }
}

/// Inputs of one field's quicklook.
#[derive(Debug, Clone, PartialEq)]
pub struct QuicklookJob {
    pub field: FieldId,
    pub dir: Option<String>,
    pub run_u: RunNumber,
    pub run_g: RunNumber,
    pub run_r: RunNumber,
    /// Timestamp of the r exposure, e.g. `2007-09-02 23:41:07`.
    pub time_r: Option<String>,
}

impl QuicklookJob {
    pub fn from_aggregate(aggregate: &FieldAggregate) -> QuicklookResult<Self> {
        let run = |band: Band| {
            aggregate
                .band(band)
                .map(|m| m.run)
                .ok_or_else(|| QuicklookError::MissingBand {
                    field: aggregate.field.to_string(),
                    band,
                })
        };

        Ok(Self {
            field: aggregate.field,
            dir: aggregate.dir.clone(),
            run_u: run(Band::U)?,
            run_g: run(Band::G)?,
            run_r: run(Band::R)?,
            time_r: aggregate.band(Band::R).and_then(|m| m.time.clone()),
        })
    }

    pub fn run(&self, band: Band) -> Option<RunNumber> {
        match band {
            Band::U => Some(self.run_u),
            Band::G => Some(self.run_g),
            Band::R => Some(self.run_r),
            Band::HeI => None,
        }
    }

    /// File name root `<YYYYMMDD-HHMM>-<run_r>-<field>`.
    pub fn root_name(&self) -> QuicklookResult<String> {
        let time = self.time_r.as_deref().unwrap_or("");
        Ok(format!(
            "{}-{}-{}",
            compact_timestamp(time)?,
            self.run_r,
            self.field
        ))
    }
}

/// Compacts an exposure timestamp to minute precision: `20070902-2341`.
pub fn compact_timestamp(time: &str) -> QuicklookResult<String> {
    let trimmed = time.trim();
    let minutes = trimmed
        .get(..16)
        .ok_or_else(|| QuicklookError::InvalidTimestamp(time.to_string()))?;

    ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(minutes, fmt).ok())
        .map(|t| t.format("%Y%m%d-%H%M").to_string())
        .ok_or_else(|| QuicklookError::InvalidTimestamp(time.to_string()))
}

/// Aggregates of one data directory that have U, g and r exposures.
pub fn select_jobs(aggregates: &[FieldAggregate], dir: &str) -> Vec<QuicklookJob> {
    aggregates
        .iter()
        .filter(|a| a.dir.as_deref() == Some(dir) && a.has_all(&QUICKLOOK_BANDS))
        .filter_map(|a| QuicklookJob::from_aggregate(a).ok())
        .collect()
}

/// Distinct data directories, sorted. One batch job is run per directory.
pub fn data_directories(aggregates: &[FieldAggregate]) -> Vec<String> {
    aggregates
        .iter()
        .filter_map(|a| a.dir.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Files of a successful quicklook, in the output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct QuicklookOutput {
    pub field: FieldId,
    pub files: Vec<PathBuf>,
}

/// Outcome of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<FieldId>,
    pub failed: Vec<(FieldId, String)>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

struct Inputs {
    images: [PathBuf; 3],
    confs: [PathBuf; 3],
}

/// Drives the external tool sequence for each field.
///
/// The run and confidence-map indices are borrowed read-only; tool calls go
/// through a [`ToolRunner`].
pub struct QuicklookDriver<'a, R: ToolRunner> {
    runner: R,
    runs: &'a RunPathIndex,
    confs: &'a ConfMapIndex,
    settings: QuicklookSettings,
}

impl<'a, R: ToolRunner> QuicklookDriver<'a, R> {
    pub fn new(
        runner: R,
        runs: &'a RunPathIndex,
        confs: &'a ConfMapIndex,
        settings: QuicklookSettings,
    ) -> Self {
        Self {
            runner,
            runs,
            confs,
            settings,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn settings(&self) -> &QuicklookSettings {
        &self.settings
    }

    fn resolve_inputs(&self, job: &QuicklookJob) -> QuicklookResult<Inputs> {
        let mut images: [PathBuf; 3] = Default::default();
        let mut confs: [PathBuf; 3] = Default::default();

        for (i, band) in QUICKLOOK_BANDS.iter().enumerate() {
            let run = job.run(*band).ok_or(QuicklookError::MissingBand {
                field: job.field.to_string(),
                band: *band,
            })?;
            let image = self.runs.get(run).ok_or(QuicklookError::MissingRun(run))?;
            if !image.exists() {
                return Err(QuicklookError::MissingFile(image.to_path_buf()));
            }
            let conf = self.confs.for_image(image, *band).ok_or_else(|| {
                QuicklookError::MissingConfidenceMap {
                    directory: image
                        .parent()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                    band: *band,
                }
            })?;

            images[i] = image.to_path_buf();
            confs[i] = conf.to_path_buf();
        }

        Ok(Inputs { images, confs })
    }

    fn small_command(&self, input: &Path, output: &Path) -> ToolCommand {
        let render = &self.settings.render;
        ToolCommand::new(&self.settings.tools.convert)
            .arg(input)
            .arg("-resize")
            .arg(render.small_width.to_string())
            .arg("-quality")
            .arg(render.small_quality.to_string())
            .arg(output)
    }

    fn execute(&mut self, command: ToolCommand) -> QuicklookResult<()> {
        self.runner.run(&command)?;
        Ok(())
    }

    /// Runs the mosaic/render/combine sequence into the scratch directory.
    /// Every file the sequence may create is recorded in `produced`.
    fn render(
        &mut self,
        inputs: &Inputs,
        root: &Path,
        produced: &mut Vec<PathBuf>,
    ) -> QuicklookResult<Vec<PathBuf>> {
        let scratch = |suffix: &str| {
            let mut name = root.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };
        let tools = self.settings.tools.clone();
        let render = self.settings.render.clone();
        let mut smalls = Vec::with_capacity(4);

        for (i, band) in QUICKLOOK_BANDS.iter().enumerate() {
            let b = band.suffix();
            let fit = scratch(&format!("-{}.fit", b));
            let conf = scratch(&format!("-{}-conf.fit", b));
            let jpg = scratch(&format!("-{}.jpg", b));
            let small = scratch(&format!("-{}-small.jpg", b));
            produced.extend([fit.clone(), conf.clone(), jpg.clone(), small.clone()]);

            self.execute(
                ToolCommand::new(&tools.mosaic)
                    .arg(&inputs.images[i])
                    .arg(&inputs.confs[i])
                    .arg(&fit)
                    .arg(&conf)
                    .arg("--skyflag=0"),
            )?;

            fits_header::fix_equinox(&fit)?;

            self.execute(
                ToolCommand::new(&tools.mjpeg)
                    .arg("-gray")
                    .arg(&fit)
                    .arg(&render.low)
                    .arg(&render.high)
                    .arg(&render.stretch)
                    .arg("-out")
                    .arg(&jpg),
            )?;

            let command = self.small_command(&jpg, &small);
            self.execute(command)?;
            smalls.push(small);
        }

        let col = scratch("-col.jpg");
        let col_small = scratch("-col-small.jpg");
        produced.extend([col.clone(), col_small.clone()]);

        let mut combine = ToolCommand::new(&tools.convert);
        for b in ["r", "g", "u"] {
            let mut channel = scratch(&format!("-{}.jpg", b)).into_os_string();
            channel.push(format!("[{}]", render.crop));
            combine = combine.arg(channel);
        }
        let combine = combine
            .arg("-set")
            .arg("colorspace")
            .arg("RGB")
            .arg("-combine")
            .arg("-set")
            .arg("colorspace")
            .arg("sRGB")
            .arg(&col);
        self.execute(combine)?;

        let command = self.small_command(&col, &col_small);
        self.execute(command)?;
        smalls.insert(0, col_small);

        Ok(smalls)
    }

    /// Produces the quicklook JPEGs of one field into `outdir`.
    ///
    /// On failure every file produced for the field is removed.
    pub fn run_job(&mut self, job: &QuicklookJob, outdir: &Path) -> QuicklookResult<QuicklookOutput> {
        log::info!(
            "Creating quicklook for {} ({},{},{})",
            job.field,
            job.run_u,
            job.run_g,
            job.run_r
        );

        // Step 1: Resolve inputs before touching the filesystem
        let inputs = self.resolve_inputs(job)?;
        let root = self.settings.workdir.join(job.root_name()?);

        // Step 2: Scratch and output directories
        for dir in [self.settings.workdir.as_path(), outdir] {
            std::fs::create_dir_all(dir).map_err(|e| QuicklookError::io(dir, e))?;
        }

        // Step 3: Render, then move the small JPEGs out of the scratch directory
        let mut produced = Vec::new();
        let result = self
            .render(&inputs, &root, &mut produced)
            .and_then(|smalls| move_files(&smalls, outdir, &mut produced));

        // Step 4: Clean up
        match result {
            Ok(files) => {
                remove_files(produced.iter().filter(|p| !files.contains(*p)));
                Ok(QuicklookOutput {
                    field: job.field,
                    files,
                })
            }
            Err(e) => {
                remove_files(produced.iter());
                Err(e)
            }
        }
    }

    /// Runs every job, logging failures without stopping.
    pub fn run_batch(&mut self, jobs: &[QuicklookJob], outdir: &Path) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for job in jobs {
            match self.run_job(job, outdir) {
                Ok(_) => summary.succeeded.push(job.field),
                Err(e) => {
                    log::error!("Quicklook for {} ({}) aborted: {}", job.field, job.run_r, e);
                    summary.failed.push((job.field, e.to_string()));
                }
            }
        }

        log::info!(
            "Quicklooks: {} succeeded, {} failed",
            summary.succeeded.len(),
            summary.failed.len()
        );
        summary
    }

    /// Runs the quicklooks of one data directory into `<outdir>/<dir>`.
    pub fn run_directory(
        &mut self,
        aggregates: &[FieldAggregate],
        dir: &str,
        outdir: &Path,
    ) -> BatchSummary {
        let jobs = select_jobs(aggregates, dir);
        log::info!("{} fields with U, g and r in {}", jobs.len(), dir);
        self.run_batch(&jobs, &outdir.join(dir))
    }
}

fn move_files(
    files: &[PathBuf],
    outdir: &Path,
    produced: &mut Vec<PathBuf>,
) -> QuicklookResult<Vec<PathBuf>> {
    let mut moved = Vec::with_capacity(files.len());
    for file in files {
        let name = file
            .file_name()
            .ok_or_else(|| QuicklookError::MissingFile(file.clone()))?;
        let target = outdir.join(name);
        produced.push(target.clone());

        if std::fs::rename(file, &target).is_err() {
            // Scratch and output may live on different filesystems.
            std::fs::copy(file, &target).map_err(|e| QuicklookError::io(file.as_path(), e))?;
            std::fs::remove_file(file).map_err(|e| QuicklookError::io(file.as_path(), e))?;
        }
        moved.push(target);
    }
    Ok(moved)
}

fn remove_files<'p>(files: impl Iterator<Item = &'p PathBuf>) {
    for file in files {
        if file.exists() {
            if let Err(e) = std::fs::remove_file(file) {
                log::warn!("Could not remove {}: {}", file.display(), e);
            }
        }
    }
}
