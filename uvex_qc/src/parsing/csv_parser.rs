use anyhow::{Context, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

use super::fixed_width::{parse_opt_f64, parse_opt_u32};
use super::int_log_parser::{IntLog, NightLog};
use crate::core::domain::{
    Band, BandMetrics, ExposureRecord, FieldAggregate, FieldCoordinates, FieldId, RunNumber,
};

/// Columns of the exposure table, in file order.
pub const EXPOSURE_COLUMNS: [&str; 18] = [
    "run", "name", "filter", "time", "night", "dir", "ra_hms", "dec_dms", "airmass", "posang",
    "exptime", "seeing", "sky", "noise", "ellipt", "apcor", "sources", "comments",
];

/// Per-band metric prefixes of the field table; each is followed by `_<band>`.
pub const BAND_METRIC_PREFIXES: [&str; 9] = [
    "runno", "time", "exptime", "seeing", "ellipt", "sky", "noise", "airmass", "sources",
];

/// Read a CSV file with every column kept as text.
///
/// Numbers are converted by the table readers so that empty cells survive as
/// missing values regardless of what the schema inference would guess.
pub fn read_csv_as_text(csv_path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(csv_path.into()))?
        .finish()
        .with_context(|| format!("Failed to parse CSV: {}", csv_path.display()))?;
    Ok(df)
}

/// Write a DataFrame as CSV with a header row, creating parent directories.
pub fn write_csv(df: &mut DataFrame, csv_path: &Path) -> Result<()> {
    if let Some(parent) = csv_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let mut file = File::create(csv_path)
        .with_context(|| format!("Failed to create CSV: {}", csv_path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .with_context(|| format!("Failed to write CSV: {}", csv_path.display()))?;

    log::info!("Wrote {} rows to {}", df.height(), csv_path.display());
    Ok(())
}

fn text_column<'a>(df: &'a DataFrame, name: &str) -> Option<&'a StringChunked> {
    df.column(name).ok().and_then(|c| c.str().ok())
}

fn required_text_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a StringChunked> {
    df.column(name)
        .with_context(|| format!("Missing column '{}'", name))?
        .str()
        .with_context(|| format!("Column '{}' is not text", name))
}

fn cell(column: Option<&StringChunked>, row: usize) -> Option<&str> {
    column
        .and_then(|c| c.get(row))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn text_cell(column: Option<&StringChunked>, row: usize) -> Option<String> {
    cell(column, row).map(str::to_string)
}

fn float_cell(column: Option<&StringChunked>, row: usize, name: &str) -> Result<Option<f64>> {
    parse_opt_f64(cell(column, row).unwrap_or_default())
        .map_err(|e| anyhow::anyhow!("Row {}, column '{}': {}", row, name, e))
}

fn count_cell(column: Option<&StringChunked>, row: usize, name: &str) -> Result<Option<u32>> {
    parse_opt_u32(cell(column, row).unwrap_or_default())
        .map_err(|e| anyhow::anyhow!("Row {}, column '{}': {}", row, name, e))
}

fn run_cell(column: Option<&StringChunked>, row: usize, name: &str) -> Result<Option<RunNumber>> {
    cell(column, row)
        .map(|s| s.parse::<RunNumber>())
        .transpose()
        .map_err(|e| anyhow::anyhow!("Row {}, column '{}': {}", row, name, e))
}

/// Convert exposure records to a DataFrame
pub fn exposures_to_dataframe(records: &[ExposureRecord]) -> Result<DataFrame> {
    let text = |f: fn(&ExposureRecord) -> Option<String>| -> Vec<Option<String>> {
        records.iter().map(f).collect()
    };
    let float = |f: fn(&ExposureRecord) -> Option<f64>| -> Vec<Option<f64>> {
        records.iter().map(f).collect()
    };

    let df = df!(
        "run" => records.iter().map(|r| r.run.0).collect::<Vec<u32>>(),
        "name" => records.iter().map(|r| r.name.clone()).collect::<Vec<String>>(),
        "filter" => records.iter().map(|r| r.filter.clone()).collect::<Vec<String>>(),
        "time" => text(|r| r.time.clone()),
        "night" => text(|r| r.night.clone()),
        "dir" => text(|r| r.dir.clone()),
        "ra_hms" => text(|r| r.ra_hms.clone()),
        "dec_dms" => text(|r| r.dec_dms.clone()),
        "airmass" => float(|r| r.airmass),
        "posang" => float(|r| r.posang),
        "exptime" => float(|r| r.exptime),
        "seeing" => float(|r| r.seeing),
        "sky" => float(|r| r.sky),
        "noise" => float(|r| r.noise),
        "ellipt" => float(|r| r.ellipticity),
        "apcor" => float(|r| r.apcor),
        "sources" => records.iter().map(|r| r.sources).collect::<Vec<Option<u32>>>(),
        "comments" => text(|r| r.comments.clone()),
    )?;

    Ok(df)
}

/// Convert a DataFrame with exposure columns back to records.
///
/// Only `run` and `name` are required; any other column may be absent.
pub fn dataframe_to_exposures(df: &DataFrame) -> Result<Vec<ExposureRecord>> {
    let runs = required_text_column(df, "run")?;
    let names = required_text_column(df, "name")?;
    let col = |name: &str| text_column(df, name);

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let run = run_cell(Some(runs), i, "run")?
            .with_context(|| format!("Missing run at row {}", i))?;
        let name = cell(Some(names), i)
            .with_context(|| format!("Missing name at row {}", i))?;

        records.push(ExposureRecord {
            run,
            name: name.to_string(),
            filter: text_cell(col("filter"), i).unwrap_or_default(),
            time: text_cell(col("time"), i),
            night: text_cell(col("night"), i),
            dir: text_cell(col("dir"), i),
            ra_hms: text_cell(col("ra_hms"), i),
            dec_dms: text_cell(col("dec_dms"), i),
            airmass: float_cell(col("airmass"), i, "airmass")?,
            posang: float_cell(col("posang"), i, "posang")?,
            exptime: float_cell(col("exptime"), i, "exptime")?,
            seeing: float_cell(col("seeing"), i, "seeing")?,
            sky: float_cell(col("sky"), i, "sky")?,
            noise: float_cell(col("noise"), i, "noise")?,
            ellipticity: float_cell(col("ellipt"), i, "ellipt")?,
            apcor: float_cell(col("apcor"), i, "apcor")?,
            sources: count_cell(col("sources"), i, "sources")?,
            comments: text_cell(col("comments"), i),
        });
    }

    Ok(records)
}

pub fn write_exposures_csv(records: &[ExposureRecord], csv_path: &Path) -> Result<()> {
    let mut df = exposures_to_dataframe(records)?;
    write_csv(&mut df, csv_path)
}

pub fn read_exposures_csv(csv_path: &Path) -> Result<Vec<ExposureRecord>> {
    let df = read_csv_as_text(csv_path)?;
    dataframe_to_exposures(&df)
        .with_context(|| format!("Invalid exposure table: {}", csv_path.display()))
}

fn band_float_columns(
    aggregates: &[FieldAggregate],
    prefix: &str,
    metric: fn(&BandMetrics) -> Option<f64>,
) -> Vec<Column> {
    Band::ALL
        .iter()
        .map(|band| {
            let values: Vec<Option<f64>> = aggregates
                .iter()
                .map(|a| a.band(*band).and_then(metric))
                .collect();
            Column::new(format!("{}_{}", prefix, band.suffix()).into(), values)
        })
        .collect()
}

/// Convert field aggregates to a DataFrame.
///
/// Every band column is always present; a band without a sub-record is
/// written as empty cells.
pub fn aggregates_to_dataframe(aggregates: &[FieldAggregate]) -> Result<DataFrame> {
    let text = |f: fn(&FieldAggregate) -> Option<String>| -> Vec<Option<String>> {
        aggregates.iter().map(f).collect()
    };
    let float = |f: fn(&FieldAggregate) -> Option<f64>| -> Vec<Option<f64>> {
        aggregates.iter().map(f).collect()
    };

    let mut columns = vec![
        Column::new(
            "field".into(),
            aggregates
                .iter()
                .map(|a| a.field.to_string())
                .collect::<Vec<String>>(),
        ),
        Column::new("dir".into(), text(|a| a.dir.clone())),
        Column::new("night".into(), text(|a| a.night.clone())),
        Column::new("comments".into(), text(|a| a.comments.clone())),
        Column::new("ra".into(), float(|a| a.ra)),
        Column::new("dec".into(), float(|a| a.dec)),
        Column::new("l".into(), float(|a| a.l)),
        Column::new("b".into(), float(|a| a.b)),
    ];

    for band in Band::ALL {
        let runs: Vec<Option<u32>> = aggregates
            .iter()
            .map(|a| a.band(band).map(|m| m.run.0))
            .collect();
        columns.push(Column::new(format!("runno_{}", band.suffix()).into(), runs));
    }
    for band in Band::ALL {
        let times: Vec<Option<String>> = aggregates
            .iter()
            .map(|a| a.band(band).and_then(|m| m.time.clone()))
            .collect();
        columns.push(Column::new(format!("time_{}", band.suffix()).into(), times));
    }
    columns.extend(band_float_columns(aggregates, "exptime", |m| m.exptime));
    columns.extend(band_float_columns(aggregates, "seeing", |m| m.seeing));
    columns.extend(band_float_columns(aggregates, "ellipt", |m| m.ellipticity));
    columns.extend(band_float_columns(aggregates, "sky", |m| m.sky));
    columns.extend(band_float_columns(aggregates, "noise", |m| m.noise));
    columns.extend(band_float_columns(aggregates, "airmass", |m| m.airmass));
    for band in Band::ALL {
        let sources: Vec<Option<u32>> = aggregates
            .iter()
            .map(|a| a.band(band).and_then(|m| m.sources))
            .collect();
        columns.push(Column::new(format!("sources_{}", band.suffix()).into(), sources));
    }

    let df = DataFrame::new(columns).context("Failed to build field table")?;
    Ok(df)
}

/// Convert a field table back to aggregates.
///
/// A band is present exactly when its `runno_<band>` cell is non-empty.
pub fn dataframe_to_aggregates(df: &DataFrame) -> Result<Vec<FieldAggregate>> {
    let fields = required_text_column(df, "field")?;
    let col = |name: &str| text_column(df, name);

    let mut aggregates = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let field: FieldId = cell(Some(fields), i)
            .with_context(|| format!("Missing field at row {}", i))?
            .parse()
            .map_err(|e: String| anyhow::anyhow!("Row {}: {}", i, e))?;

        let mut aggregate = FieldAggregate::new(field);
        aggregate.dir = text_cell(col("dir"), i);
        aggregate.night = text_cell(col("night"), i);
        aggregate.comments = text_cell(col("comments"), i);
        aggregate.ra = float_cell(col("ra"), i, "ra")?;
        aggregate.dec = float_cell(col("dec"), i, "dec")?;
        aggregate.l = float_cell(col("l"), i, "l")?;
        aggregate.b = float_cell(col("b"), i, "b")?;

        for band in Band::ALL {
            let name = |prefix: &str| format!("{}_{}", prefix, band.suffix());
            let band_col = |prefix: &str| col(&name(prefix));

            let Some(run) = run_cell(band_col("runno"), i, &name("runno"))? else {
                continue;
            };

            aggregate.set_band(
                band,
                BandMetrics {
                    run,
                    time: text_cell(band_col("time"), i),
                    exptime: float_cell(band_col("exptime"), i, &name("exptime"))?,
                    seeing: float_cell(band_col("seeing"), i, &name("seeing"))?,
                    ellipticity: float_cell(band_col("ellipt"), i, &name("ellipt"))?,
                    sky: float_cell(band_col("sky"), i, &name("sky"))?,
                    noise: float_cell(band_col("noise"), i, &name("noise"))?,
                    airmass: float_cell(band_col("airmass"), i, &name("airmass"))?,
                    sources: count_cell(band_col("sources"), i, &name("sources"))?,
                },
            );
        }

        aggregates.push(aggregate);
    }

    Ok(aggregates)
}

pub fn write_aggregates_csv(aggregates: &[FieldAggregate], csv_path: &Path) -> Result<()> {
    let mut df = aggregates_to_dataframe(aggregates)?;
    write_csv(&mut df, csv_path)
}

pub fn read_aggregates_csv(csv_path: &Path) -> Result<Vec<FieldAggregate>> {
    let df = read_csv_as_text(csv_path)?;
    dataframe_to_aggregates(&df)
        .with_context(|| format!("Invalid field table: {}", csv_path.display()))
}

pub fn coordinates_to_dataframe(rows: &[FieldCoordinates]) -> Result<DataFrame> {
    let df = df!(
        "field" => rows.iter().map(|r| r.field.to_string()).collect::<Vec<String>>(),
        "ra" => rows.iter().map(|r| r.ra).collect::<Vec<f64>>(),
        "dec" => rows.iter().map(|r| r.dec).collect::<Vec<f64>>(),
        "l" => rows.iter().map(|r| r.l).collect::<Vec<f64>>(),
        "b" => rows.iter().map(|r| r.b).collect::<Vec<f64>>(),
    )?;
    Ok(df)
}

pub fn dataframe_to_coordinates(df: &DataFrame) -> Result<Vec<FieldCoordinates>> {
    let fields = required_text_column(df, "field")?;
    let mut rows = Vec::with_capacity(df.height());

    for i in 0..df.height() {
        let field: FieldId = cell(Some(fields), i)
            .with_context(|| format!("Missing field at row {}", i))?
            .parse()
            .map_err(|e: String| anyhow::anyhow!("Row {}: {}", i, e))?;

        let value = |name: &str| -> Result<f64> {
            float_cell(Some(required_text_column(df, name)?), i, name)?
                .with_context(|| format!("Missing {} at row {}", name, i))
        };

        rows.push(FieldCoordinates {
            field,
            ra: value("ra")?,
            dec: value("dec")?,
            l: value("l")?,
            b: value("b")?,
        });
    }

    Ok(rows)
}

pub fn write_coordinates_csv(rows: &[FieldCoordinates], csv_path: &Path) -> Result<()> {
    let mut df = coordinates_to_dataframe(rows)?;
    write_csv(&mut df, csv_path)
}

pub fn read_coordinates_csv(csv_path: &Path) -> Result<Vec<FieldCoordinates>> {
    let df = read_csv_as_text(csv_path)?;
    dataframe_to_coordinates(&df)
        .with_context(|| format!("Invalid coordinate table: {}", csv_path.display()))
}

/// One row per observing night.
pub fn nights_to_dataframe(logs: &[IntLog]) -> Result<DataFrame> {
    let text = |f: fn(&IntLog) -> Option<String>| -> Vec<Option<String>> {
        logs.iter().map(f).collect()
    };

    let df = df!(
        "night" => text(|l| l.night.night.clone()),
        "observer" => text(|l| l.night.observer.clone()),
        "temp_avg" => logs.iter().map(|l| l.night.temp_avg).collect::<Vec<Option<f64>>>(),
        "hum_avg" => logs.iter().map(|l| l.night.hum_avg).collect::<Vec<Option<f64>>>(),
        "lost_weather" => text(|l| l.night.lost_weather.clone()),
        "lost_technical" => text(|l| l.night.lost_technical.clone()),
        "lost_other" => text(|l| l.night.lost_other.clone()),
        "comments_weather" => text(|l| l.night.comments_weather.clone()),
        "comments_night" => text(|l| l.night.comments_night.clone()),
    )?;
    Ok(df)
}

/// One row per WFC exposure, repeating the conditions of its night.
pub fn int_runs_to_dataframe(logs: &[IntLog]) -> Result<DataFrame> {
    let rows: Vec<_> = logs
        .iter()
        .flat_map(|log| log.runs.iter().map(move |run| (&log.night, run)))
        .collect();

    let night_text = |f: fn(&NightLog) -> Option<String>| {
        rows.iter().map(|(n, _)| f(n)).collect::<Vec<Option<String>>>()
    };

    let df = df!(
        "run" => rows.iter().map(|(_, r)| r.run.0).collect::<Vec<u32>>(),
        "name" => rows.iter().map(|(_, r)| r.name.clone()).collect::<Vec<String>>(),
        "filter" => rows.iter().map(|(_, r)| r.filter.clone()).collect::<Vec<String>>(),
        "ra_hms" => rows.iter().map(|(_, r)| r.ra_hms.clone()).collect::<Vec<Option<String>>>(),
        "dec_dms" => rows.iter().map(|(_, r)| r.dec_dms.clone()).collect::<Vec<Option<String>>>(),
        "exptime" => rows.iter().map(|(_, r)| r.exptime).collect::<Vec<Option<f64>>>(),
        "night" => night_text(|n| n.night.clone()),
        "observer" => night_text(|n| n.observer.clone()),
        "temp_avg" => rows.iter().map(|(n, _)| n.temp_avg).collect::<Vec<Option<f64>>>(),
        "hum_avg" => rows.iter().map(|(n, _)| n.hum_avg).collect::<Vec<Option<f64>>>(),
        "lost_weather" => night_text(|n| n.lost_weather.clone()),
        "lost_technical" => night_text(|n| n.lost_technical.clone()),
        "lost_other" => night_text(|n| n.lost_other.clone()),
        "comments_weather" => night_text(|n| n.comments_weather.clone()),
        "comments_night" => night_text(|n| n.comments_night.clone()),
        "comments_exposure" => rows
            .iter()
            .map(|(_, r)| r.comments.clone())
            .collect::<Vec<Option<String>>>(),
    )?;
    Ok(df)
}

/// Write the by-night and by-run tables of a set of observing logs.
pub fn write_int_log_tables(logs: &[IntLog], by_night: &Path, by_run: &Path) -> Result<()> {
    let mut nights = nights_to_dataframe(logs)?;
    write_csv(&mut nights, by_night)?;
    let mut runs = int_runs_to_dataframe(logs)?;
    write_csv(&mut runs, by_run)
}
