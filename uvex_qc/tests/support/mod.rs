//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;

use uvex_qc::parsing::dqc_parser::DQC_COLUMNS;
use uvex_qc::quicklook::{QuicklookError, QuicklookResult, ToolCommand, ToolRunner};

/// One exposure line of a DQC report.
pub struct DqcRow<'a> {
    pub dir: &'a str,
    pub run: u32,
    pub name: &'a str,
    pub filter: &'a str,
    pub time: &'a str,
    pub seeing: f64,
    pub ellipticity: f64,
    pub airmass: f64,
}

impl DqcRow<'_> {
    pub fn to_line(&self) -> String {
        let run = format!("r{}", self.run);
        let airmass = format!("{:.2}", self.airmass);
        let seeing = format!("{:.2}", self.seeing);
        let ellipt = format!("{:.2}", self.ellipticity);
        let values = [
            ("dir", self.dir),
            ("run", run.as_str()),
            ("name", self.name),
            ("airmass", airmass.as_str()),
            ("time", self.time),
            ("exptime", "30.0"),
            ("filter", self.filter),
            ("seeing", seeing.as_str()),
            ("sky", "2000.0"),
            ("ellipt", ellipt.as_str()),
        ];

        let mut buf = vec![b' '; 172];
        for (name, value) in values {
            let spec = DQC_COLUMNS
                .iter()
                .find(|c| c.name == name)
                .expect("known column");
            buf[spec.first..spec.first + value.len()].copy_from_slice(value.as_bytes());
        }
        String::from_utf8(buf).expect("ascii").trim_end().to_string()
    }
}

/// A primary header as written by the mosaicking tool.
pub fn mosaic_fits() -> Vec<u8> {
    let mut data = Vec::new();
    for card in [
        "SIMPLE  =                    T",
        "BITPIX  =                    8",
        "NAXIS   =                    0",
        "EQUINOX = 'J2000.0 '",
        "END",
    ] {
        data.extend(format!("{:<80}", card).into_bytes());
    }
    data.resize(2880, b' ');
    data
}

/// Records tool calls and creates the files each tool would write.
#[derive(Default)]
pub struct FakeTools {
    pub calls: Vec<ToolCommand>,
    /// Fail with stderr output when the tool name and an argument fragment match.
    pub fail_when: Option<(String, String)>,
}

impl FakeTools {
    pub fn failing(tool: &str, arg_fragment: &str) -> Self {
        Self {
            calls: Vec::new(),
            fail_when: Some((tool.to_string(), arg_fragment.to_string())),
        }
    }

    pub fn calls_to(&self, tool: &str) -> usize {
        self.calls.iter().filter(|c| c.name() == tool).count()
    }

    fn write(path: impl AsRef<Path>, content: &[u8]) {
        std::fs::write(path.as_ref(), content).expect("write fake output");
    }
}

impl ToolRunner for FakeTools {
    fn run(&mut self, command: &ToolCommand) -> QuicklookResult<String> {
        self.calls.push(command.clone());

        if let Some((tool, fragment)) = &self.fail_when {
            let matches = command.name() == *tool
                && command
                    .args
                    .iter()
                    .any(|a| a.to_string_lossy().contains(fragment.as_str()));
            if matches {
                return Err(QuicklookError::ToolStderr {
                    command: command.display(),
                    stderr: "ERROR: cannot open input".to_string(),
                    stdout: String::new(),
                });
            }
        }

        let args = &command.args;
        match command.name().as_str() {
            "mosaic" => {
                Self::write(&args[2], &mosaic_fits());
                Self::write(&args[3], b"conf");
            }
            "mJPEG" => {
                let out = args
                    .iter()
                    .position(|a| a == "-out")
                    .map(|i| &args[i + 1])
                    .expect("-out argument");
                Self::write(out, b"jpeg");
            }
            _ => {
                if let Some(last) = args.last() {
                    Self::write(last, b"jpeg");
                }
            }
        }
        Ok(String::new())
    }
}
