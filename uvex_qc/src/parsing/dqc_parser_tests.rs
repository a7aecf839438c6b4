#[cfg(test)]
mod tests {
    use crate::core::domain::{Band, FieldId, RunNumber};
    use crate::parsing::dqc_parser::{
        parse_dqc_file, parse_dqc_line, parse_dqc_str, repair_legacy_line, DQC_COLUMNS,
        LEGACY_LINE_LENGTH,
    };
    use std::io::Write;
    use tempfile::NamedTempFile;

    const WIDTH: usize = 172;

    /// Lays out values at their column start offsets.
    fn padded_line(values: &[(&str, &str)]) -> String {
        let mut buf = vec![b' '; WIDTH];
        for (name, value) in values {
            let spec = DQC_COLUMNS.iter().find(|c| c.name == *name).unwrap();
            assert!(value.len() <= spec.last - spec.first + 1, "{} too wide", name);
            buf[spec.first..spec.first + value.len()].copy_from_slice(value.as_bytes());
        }
        String::from_utf8(buf).unwrap()
    }

    fn sample_values() -> Vec<(&'static str, &'static str)> {
        vec![
            ("dir", "/uvex/jul2013"),
            ("run", "r583191"),
            ("name", "uvex_0009o Jul13"),
            ("ra_hms", "18:12:31.8"),
            ("dec_dms", "-18:29:59.1"),
            ("airmass", "1.35"),
            ("posang", "0.0"),
            ("time", "2013-07-14 23:41:58"),
            ("exptime", "30.0"),
            ("filter", "r"),
            ("seeing", "1.24"),
            ("sky", "2431.5"),
            ("noise", "12.3"),
            ("ellipt", "0.08"),
            ("apcor", "0.12"),
            ("comments", "ok"),
        ]
    }

    fn sample_line() -> String {
        padded_line(&sample_values()).trim_end().to_string()
    }

    #[test]
    fn test_parse_standard_line() {
        let record = parse_dqc_line(&sample_line()).unwrap();

        assert_eq!(record.run, RunNumber(583191));
        assert_eq!(record.field_id(), Some(FieldId::offset(9)));
        assert_eq!(record.band(), Some(Band::R));
        assert_eq!(record.dir.as_deref(), Some("/uvex/jul2013"));
        assert_eq!(record.time.as_deref(), Some("2013-07-14 23:41:58"));
        assert_eq!(record.airmass, Some(1.35));
        assert_eq!(record.seeing, Some(1.24));
        assert_eq!(record.sky, Some(2431.5));
        assert_eq!(record.ellipticity, Some(0.08));
        assert_eq!(record.comments.as_deref(), Some("ok"));
        assert_eq!(record.sources, None);
    }

    #[test]
    fn test_legacy_line_is_repaired() {
        let standard = padded_line(&sample_values());
        let mut legacy = standard.clone();
        legacy.insert_str(127, "##");
        assert_eq!(legacy.len(), LEGACY_LINE_LENGTH);

        assert_eq!(repair_legacy_line(&legacy), standard);

        let record = parse_dqc_line(&legacy).unwrap();
        assert_eq!(record.seeing, Some(1.24));
        assert_eq!(record.comments.as_deref(), Some("ok"));
    }

    #[test]
    fn test_other_lengths_untouched() {
        let line = sample_line();
        assert_eq!(repair_legacy_line(&line), line);
    }

    #[test]
    fn test_missing_metrics_are_none() {
        let mut values = sample_values();
        values.retain(|(name, _)| *name != "seeing" && *name != "noise");
        let record = parse_dqc_line(padded_line(&values).trim_end()).unwrap();

        assert_eq!(record.seeing, None);
        assert_eq!(record.noise, None);
        assert_eq!(record.sky, Some(2431.5));
    }

    #[test]
    fn test_invalid_lines_rejected() {
        let mut values = sample_values();
        values.retain(|(name, _)| *name != "run");
        assert!(parse_dqc_line(&padded_line(&values)).is_err());

        let mut values = sample_values();
        for v in values.iter_mut() {
            if v.0 == "sky" {
                v.1 = "bad";
            }
        }
        let err = parse_dqc_line(&padded_line(&values)).unwrap_err();
        assert!(err.contains("sky"), "unexpected error: {}", err);
    }

    #[test]
    fn test_parse_str_skips_header_and_bad_lines() {
        let content = format!(
            "DIR RUN NAME ...\n{}\n\n   garbage line\n{}\n",
            sample_line(),
            sample_line().replace("r583191", "r583192")
        );

        let outcome = parse_dqc_str(&content);
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.report.parsed, 2);
        assert_eq!(outcome.report.skipped, 1);
        assert_eq!(outcome.report.skipped_lines[0].line_number, 4);
        assert_eq!(outcome.rows[1].run, RunNumber(583192));
    }

    #[test]
    fn test_parse_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "header").unwrap();
        writeln!(temp_file, "{}", sample_line()).unwrap();

        let outcome = parse_dqc_file(temp_file.path()).unwrap();
        assert_eq!(outcome.rows.len(), 1);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = parse_dqc_file(std::path::Path::new("/nonexistent/dqc.txt"));
        assert!(result.is_err());
    }
}
