//! Quicklook JPEGs for visual inspection of fields.
//!
//! For each field with U, g and r exposures the driver mosaics the three
//! frames with their confidence maps, renders grey-scale JPEGs, combines
//! them into a colour image and keeps downscaled copies:
//!
//! ```text
//! mosaic <image> <conf> <root>-u.fit <root>-u-conf.fit --skyflag=0
//! mJPEG -gray <root>-u.fit 25% 99.9% log -out <root>-u.jpg
//! convert <root>-u.jpg -resize 600 -quality 70 <root>-u-small.jpg
//! ...
//! convert <root>-r.jpg[..] <root>-g.jpg[..] <root>-u.jpg[..] -combine <root>-col.jpg
//! ```
//!
//! Tool paths, rendering parameters and the scratch directory come from
//! [`QuicklookSettings`].

pub mod command;
pub mod driver;
pub mod error;
pub mod fits_header;
pub mod lookup;

pub use command::{ProcessRunner, ToolCommand, ToolRunner};
pub use driver::{
    data_directories, select_jobs, BatchSummary, QuicklookDriver, QuicklookJob, QuicklookOutput,
    QuicklookSettings, RenderParams, ToolPaths,
};
pub use error::{QuicklookError, QuicklookResult};
pub use lookup::{check_index, ConfMapIndex, IndexCheck, RunPathIndex};
