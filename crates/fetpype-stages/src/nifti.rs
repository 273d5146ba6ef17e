//! Minimal NIfTI header reader.
//!
//! Only the voxel sizes are needed (for `<input_tp>`), so only the fixed
//! header is decoded. Both NIfTI-1 (348 byte) and NIfTI-2 (540 byte)
//! headers are accepted, in either byte order, plain or gzip-compressed.

use fetpype_core::{FetpypeError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

const NIFTI1_HEADER_SIZE: i32 = 348;
const NIFTI2_HEADER_SIZE: i32 = 540;
const NIFTI1_PIXDIM_OFFSET: usize = 76;
const NIFTI2_PIXDIM_OFFSET: usize = 104;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("cannot read header: {0}")]
    Io(#[from] io::Error),

    #[error("not a NIfTI file (sizeof_hdr = {0})")]
    NotNifti(i32),

    #[error("invalid slice thickness {0}")]
    InvalidThickness(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

/// The header fields the stages care about.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    /// 1 or 2
    pub version: u8,
    /// `pixdim[0..8]`; `pixdim[1..4]` are the voxel sizes
    pub pixdim: [f64; 8],
}

impl NiftiHeader {
    /// Voxel size along each spatial axis.
    pub fn zooms(&self) -> [f64; 3] {
        [self.pixdim[1], self.pixdim[2], self.pixdim[3]]
    }

    /// Voxel size along the third axis.
    pub fn slice_thickness(&self) -> f64 {
        self.pixdim[3]
    }
}

pub fn read_header(path: &Path) -> std::result::Result<NiftiHeader, MetadataError> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let compressed = file.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC;
    file.seek(SeekFrom::Start(0))?;

    if compressed {
        parse_header(GzDecoder::new(BufReader::new(file)))
    } else {
        parse_header(BufReader::new(file))
    }
}

fn parse_header<R: Read>(mut reader: R) -> std::result::Result<NiftiHeader, MetadataError> {
    let mut size = [0u8; 4];
    reader.read_exact(&mut size)?;

    let (version, order) = match (i32::from_le_bytes(size), i32::from_be_bytes(size)) {
        (NIFTI1_HEADER_SIZE, _) => (1, ByteOrder::Little),
        (_, NIFTI1_HEADER_SIZE) => (1, ByteOrder::Big),
        (NIFTI2_HEADER_SIZE, _) => (2, ByteOrder::Little),
        (_, NIFTI2_HEADER_SIZE) => (2, ByteOrder::Big),
        (other, _) => return Err(MetadataError::NotNifti(other)),
    };

    let header_size = if version == 1 { NIFTI1_HEADER_SIZE } else { NIFTI2_HEADER_SIZE };
    let mut header = vec![0u8; header_size as usize];
    header[..4].copy_from_slice(&size);
    reader.read_exact(&mut header[4..])?;

    let mut pixdim = [0f64; 8];
    for (i, value) in pixdim.iter_mut().enumerate() {
        *value = if version == 1 {
            let at = NIFTI1_PIXDIM_OFFSET + i * 4;
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&header[at..at + 4]);
            f64::from(match order {
                ByteOrder::Little => f32::from_le_bytes(raw),
                ByteOrder::Big => f32::from_be_bytes(raw),
            })
        } else {
            let at = NIFTI2_PIXDIM_OFFSET + i * 8;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&header[at..at + 8]);
            match order {
                ByteOrder::Little => f64::from_le_bytes(raw),
                ByteOrder::Big => f64::from_be_bytes(raw),
            }
        };
    }

    Ok(NiftiHeader { version, pixdim })
}

/// Mean third-axis voxel size over `paths`, rounded to one decimal.
pub fn mean_slice_thickness<'a, I>(paths: I) -> Result<f64>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut total = 0.0;
    let mut count = 0usize;
    for path in paths {
        let thickness = read_header(path)
            .and_then(|header| {
                let t = header.slice_thickness();
                if t.is_finite() && t > 0.0 {
                    Ok(t)
                } else {
                    Err(MetadataError::InvalidThickness(t))
                }
            })
            .map_err(|e| FetpypeError::MetadataReadError {
                path: path.to_path_buf(),
                source: Box::new(e),
            })?;
        total += thickness;
        count += 1;
    }
    if count == 0 {
        return Err(FetpypeError::EmptyPathList);
    }
    Ok(round_one_decimal(total / count as f64))
}

/// Ties go to the even neighbour: 3.25 → 3.2.
fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// `<input_tp>` text: always one decimal, e.g. `3.0`.
pub fn format_thickness(value: f64) -> String {
    format!("{:.1}", value)
}

/// Test fixtures: write minimal NIfTI headers.
#[cfg(test)]
pub(crate) mod fixtures {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::path::Path;

    pub fn nifti1_header(zooms: [f32; 3], big_endian: bool) -> Vec<u8> {
        let mut header = vec![0u8; 348];
        let put_i32 = |v: i32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        let put_f32 = |v: f32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        header[0..4].copy_from_slice(&put_i32(348));
        let pixdim = [1.0f32, zooms[0], zooms[1], zooms[2], 0.0, 0.0, 0.0, 0.0];
        for (i, v) in pixdim.iter().enumerate() {
            let at = 76 + i * 4;
            header[at..at + 4].copy_from_slice(&put_f32(*v));
        }
        header[344..348].copy_from_slice(b"n+1\0");
        header
    }

    pub fn write_gz(path: &Path, bytes: &[u8]) {
        let file = std::fs::File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use std::fs;

    #[test]
    fn test_read_plain_nifti1() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.nii");
        fs::write(&path, nifti1_header([0.8, 0.8, 3.0], false)).unwrap();

        let header = read_header(&path).unwrap();
        assert_eq!(header.version, 1);
        assert!((header.zooms()[0] - 0.8).abs() < 1e-6);
        assert_eq!(header.slice_thickness(), 3.0);
    }

    #[test]
    fn test_read_gzipped_big_endian() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.nii.gz");
        write_gz(&path, &nifti1_header([1.0, 1.0, 4.5], true));

        let header = read_header(&path).unwrap();
        assert_eq!(header.slice_thickness(), 4.5);
    }

    #[test]
    fn test_read_nifti2() {
        let mut header = vec![0u8; 540];
        header[0..4].copy_from_slice(&540i32.to_le_bytes());
        header[104 + 3 * 8..104 + 4 * 8].copy_from_slice(&2.5f64.to_le_bytes());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.nii");
        fs::write(&path, header).unwrap();

        let header = read_header(&path).unwrap();
        assert_eq!(header.version, 2);
        assert_eq!(header.slice_thickness(), 2.5);
    }

    #[test]
    fn test_not_nifti() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.nii");
        fs::write(&path, vec![7u8; 400]).unwrap();
        assert!(matches!(read_header(&path), Err(MetadataError::NotNifti(_))));

        let short = dir.path().join("short.nii");
        fs::write(&short, 348i32.to_le_bytes()).unwrap();
        assert!(matches!(read_header(&short), Err(MetadataError::Io(_))));
    }

    #[test]
    fn test_mean_slice_thickness() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.nii.gz");
        let b = dir.path().join("b.nii.gz");
        write_gz(&a, &nifti1_header([0.8, 0.8, 3.0], false));
        write_gz(&b, &nifti1_header([0.8, 0.8, 4.4], false));

        let mean = mean_slice_thickness([a.as_path(), b.as_path()]).unwrap();
        assert_eq!(mean, 3.7);
        assert_eq!(format_thickness(mean), "3.7");
        assert_eq!(format_thickness(3.0), "3.0");
    }

    #[test]
    fn test_mean_slice_thickness_ties_round_to_even() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.nii.gz");
        let b = dir.path().join("b.nii.gz");
        write_gz(&a, &nifti1_header([1.0, 1.0, 3.0], false));
        write_gz(&b, &nifti1_header([1.0, 1.0, 3.5], false));

        let mean = mean_slice_thickness([a.as_path(), b.as_path()]).unwrap();
        assert_eq!(format_thickness(mean), "3.2");
        assert_eq!(round_one_decimal(0.25), 0.2);
        assert_eq!(round_one_decimal(0.75), 0.8);
    }

    #[test]
    fn test_mean_slice_thickness_names_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.nii.gz");
        let err = mean_slice_thickness([missing.as_path()]).unwrap_err();
        match err {
            FetpypeError::MetadataReadError { path, .. } => {
                assert!(path.ends_with("missing.nii.gz"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
