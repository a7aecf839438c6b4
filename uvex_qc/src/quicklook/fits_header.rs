//! In-place edits of FITS primary-header keywords.

use std::ffi::CString;
use std::path::Path;

use fitsio::errors::check_status;
use fitsio::FitsFile;

use crate::quicklook::error::{QuicklookError, QuicklookResult};

/// cfitsio status of a lookup for a keyword the header does not have.
const KEY_NO_EXIST: i32 = 202;

/// Sets a string keyword in the primary header of a FITS file.
///
/// An existing card is modified in place and keeps its comment; a missing
/// card is appended to the header.
pub fn set_string_keyword(path: &Path, keyword: &str, value: &str) -> QuicklookResult<()> {
    let fits_error = |source: fitsio::errors::Error| QuicklookError::Fits {
        path: path.to_path_buf(),
        source,
    };
    let invalid = || QuicklookError::InvalidKeyword {
        keyword: keyword.to_string(),
        value: value.to_string(),
    };
    let keyword_c = CString::new(keyword).map_err(|_| invalid())?;
    let value_c = CString::new(value).map_err(|_| invalid())?;

    let mut fits = FitsFile::edit(path).map_err(fits_error)?;
    fits.hdu(0).map_err(fits_error)?;

    // hdu.write_key appends a second card instead of replacing the first
    let mut status = 0;
    unsafe {
        fitsio_sys::ffmkys(
            fits.as_raw(),
            keyword_c.as_ptr(),
            value_c.as_ptr(),
            c"&".as_ptr(),
            &mut status,
        );
    }
    if status == KEY_NO_EXIST {
        status = 0;
        unsafe {
            fitsio_sys::ffpkys(
                fits.as_raw(),
                keyword_c.as_ptr(),
                value_c.as_ptr(),
                c"".as_ptr(),
                &mut status,
            );
        }
    }
    check_status(status).map_err(fits_error)
}

/// Rewrites `EQUINOX = '2000.0'` into a FITS file. The JPEG renderer rejects
/// the `J2000.0` value the mosaicking tool writes.
pub fn fix_equinox(path: &Path) -> QuicklookResult<()> {
    set_string_keyword(path, "EQUINOX", "2000.0")?;
    log::debug!("Set EQUINOX = '2000.0' in {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create(dir: &TempDir, name: &str, equinox: Option<&str>) -> PathBuf {
        let path = dir.path().join(name);
        let mut fits = FitsFile::create(&path).open().unwrap();
        let hdu = fits.primary_hdu().unwrap();
        hdu.write_key(&mut fits, "OBJECT", "uvex_0009o").unwrap();
        if let Some(value) = equinox {
            hdu.write_key(&mut fits, "EQUINOX", value).unwrap();
        }
        path
    }

    fn read_key(path: &Path, keyword: &str) -> String {
        let mut fits = FitsFile::open(path).unwrap();
        let hdu = fits.primary_hdu().unwrap();
        hdu.read_key::<String>(&mut fits, keyword).unwrap()
    }

    fn card_count(path: &Path, keyword: &str) -> usize {
        let data = std::fs::read(path).unwrap();
        let prefix = format!("{:<8}=", keyword);
        data.chunks_exact(80)
            .filter(|card| card.starts_with(prefix.as_bytes()))
            .count()
    }

    #[test]
    fn test_fix_equinox_replaces_existing_card() {
        let dir = TempDir::new().unwrap();
        let path = create(&dir, "r583191.fit", Some("J2000.0"));

        fix_equinox(&path).unwrap();

        assert_eq!(read_key(&path, "EQUINOX"), "2000.0");
        assert_eq!(read_key(&path, "OBJECT"), "uvex_0009o");
        assert_eq!(card_count(&path, "EQUINOX"), 1);
    }

    #[test]
    fn test_missing_keyword_is_added() {
        let dir = TempDir::new().unwrap();
        let path = create(&dir, "r583192.fit", None);

        set_string_keyword(&path, "EQUINOX", "2000.0").unwrap();

        assert_eq!(read_key(&path, "EQUINOX"), "2000.0");
        assert_eq!(card_count(&path, "EQUINOX"), 1);
    }

    #[test]
    fn test_rejects_non_fits() {
        let dir = TempDir::new().unwrap();
        let text = dir.path().join("notes.fit");
        std::fs::write(&text, "not a FITS file").unwrap();

        let err = fix_equinox(&text).unwrap_err();
        assert!(matches!(err, QuicklookError::Fits { .. }));

        let missing = fix_equinox(&dir.path().join("nope.fit")).unwrap_err();
        assert!(matches!(missing, QuicklookError::Fits { .. }));
    }

    #[test]
    fn test_rejects_nul_in_value() {
        let dir = TempDir::new().unwrap();
        let path = create(&dir, "r583193.fit", None);

        let err = set_string_keyword(&path, "EQUINOX", "2000\0").unwrap_err();
        assert!(matches!(err, QuicklookError::InvalidKeyword { .. }));
    }
}
