//! Minimal FITS primary-HDU reader and writer.
//!
//! The harness only ever consumes one 2-D floating-point image per file,
//! so this module deliberately supports just that subset of the FITS
//! standard: 2880-byte blocks, 80-character header cards, big-endian data,
//! BITPIX -32 or -64, optional BZERO/BSCALE linear scaling. The writer
//! exists so tests can fabricate golden and produced rasters.

use crate::error::FitsError;
use crate::raster::Raster;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;
const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// Parsed primary header, reduced to the keywords the harness needs.
#[derive(Debug, Clone)]
pub struct FitsHeader {
  pub bitpix: i64,
  pub naxis: i64,
  /// Axis lengths, NAXIS1 first (FITS order: NAXIS1 varies fastest).
  pub axes: Vec<usize>,
  pub bzero: f64,
  pub bscale: f64,
}

impl FitsHeader {
  fn data_bytes(&self) -> usize {
    let samples: usize = self.axes.iter().product();
    samples * (self.bitpix.unsigned_abs() as usize / 8)
  }
}

/// Reads the primary header of a FITS file.
pub fn read_header(path: &Path) -> Result<FitsHeader, FitsError> {
  let file = File::open(path)?;
  let mut reader = BufReader::new(file);
  parse_header(&mut reader)
}

/// Reads the single 2-D image raster from the primary HDU.
///
/// Samples are returned as `f32` with BZERO/BSCALE applied; BITPIX -64
/// data is narrowed. Any other BITPIX is rejected.
pub fn read_raster(path: &Path) -> Result<Raster, FitsError> {
  let file = File::open(path)?;
  let mut reader = BufReader::new(file);
  let header = parse_header(&mut reader)?;

  if header.naxis != 2 {
    return Err(FitsError::NotTwoDimensional {
      naxis: header.naxis,
    });
  }
  let width = header.axes[0];
  let height = header.axes[1];

  let expected = header.data_bytes();
  let mut data = vec![0u8; expected];
  let found = read_fully(&mut reader, &mut data)?;
  if found < expected {
    return Err(FitsError::TruncatedData { expected, found });
  }

  let mut samples = Vec::with_capacity(width * height);
  match header.bitpix {
    -32 => {
      for chunk in data.chunks_exact(4) {
        let raw = f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        samples.push(scale(raw as f64, &header));
      }
    }
    -64 => {
      for chunk in data.chunks_exact(8) {
        let raw = f64::from_be_bytes([
          chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
        ]);
        samples.push(scale(raw, &header));
      }
    }
    other => return Err(FitsError::UnsupportedBitpix { bitpix: other }),
  }

  Ok(Raster::from_samples(width, height, samples))
}

fn scale(raw: f64, header: &FitsHeader) -> f32 {
  (header.bzero + header.bscale * raw) as f32
}

/// Writes a raster as a BITPIX -32 primary HDU.
pub fn write_raster(path: &Path, raster: &Raster) -> Result<(), FitsError> {
  let file = File::create(path)?;
  let mut writer = BufWriter::new(file);

  let mut cards = 0usize;
  write_card(&mut writer, "SIMPLE", "T", &mut cards)?;
  write_card(&mut writer, "BITPIX", "-32", &mut cards)?;
  write_card(&mut writer, "NAXIS", "2", &mut cards)?;
  write_card(&mut writer, "NAXIS1", &raster.width().to_string(), &mut cards)?;
  write_card(&mut writer, "NAXIS2", &raster.height().to_string(), &mut cards)?;
  writer.write_all(format!("{:<80}", "END").as_bytes())?;
  cards += 1;

  // Pad the header to a block boundary with spaces.
  let header_pad = (CARDS_PER_BLOCK - cards % CARDS_PER_BLOCK) % CARDS_PER_BLOCK;
  for _ in 0..header_pad {
    writer.write_all(&[b' '; CARD_SIZE])?;
  }

  let mut written = 0usize;
  for sample in raster.samples() {
    writer.write_all(&sample.to_be_bytes())?;
    written += 4;
  }

  // Pad the data unit to a block boundary with zeros.
  let data_pad = (BLOCK_SIZE - written % BLOCK_SIZE) % BLOCK_SIZE;
  writer.write_all(&vec![0u8; data_pad])?;
  writer.flush()?;
  Ok(())
}

fn write_card<W: Write>(
  writer: &mut W,
  keyword: &str,
  value: &str,
  cards: &mut usize,
) -> Result<(), FitsError> {
  let card = format!("{:<8}= {:>20}{:<50}", keyword, value, "");
  debug_assert_eq!(card.len(), CARD_SIZE);
  writer.write_all(card.as_bytes())?;
  *cards += 1;
  Ok(())
}

fn parse_header<R: Read>(reader: &mut R) -> Result<FitsHeader, FitsError> {
  let mut bitpix: Option<i64> = None;
  let mut naxis: Option<i64> = None;
  let mut axis_lengths: Vec<(u32, usize)> = Vec::new();
  let mut bzero = 0.0f64;
  let mut bscale = 1.0f64;
  let mut simple_seen = false;
  let mut end_seen = false;
  let mut first_card = true;

  'blocks: loop {
    let mut block = [0u8; BLOCK_SIZE];
    let read = read_fully(reader, &mut block)?;
    if read == 0 {
      break;
    }
    if read < BLOCK_SIZE {
      return Err(FitsError::UnterminatedHeader);
    }

    for card in block.chunks_exact(CARD_SIZE) {
      let keyword = String::from_utf8_lossy(&card[..8]).trim_end().to_string();

      if first_card {
        first_card = false;
        if keyword != "SIMPLE" {
          return Err(FitsError::NotFits);
        }
        simple_seen = true;
        continue;
      }

      match keyword.as_str() {
        "END" => {
          end_seen = true;
          break 'blocks;
        }
        "BITPIX" => bitpix = Some(parse_int_value(card)?),
        "NAXIS" => naxis = Some(parse_int_value(card)?),
        "BZERO" => bzero = parse_float_value(card)?,
        "BSCALE" => bscale = parse_float_value(card)?,
        key if key.starts_with("NAXIS") => {
          if let Ok(index) = key["NAXIS".len()..].parse::<u32>() {
            axis_lengths.push((index, parse_int_value(card)? as usize));
          }
        }
        _ => {}
      }
    }
  }

  if !simple_seen {
    return Err(FitsError::NotFits);
  }
  if !end_seen {
    return Err(FitsError::UnterminatedHeader);
  }
  let bitpix = bitpix.ok_or(FitsError::MissingKeyword { keyword: "BITPIX" })?;
  let naxis = naxis.ok_or(FitsError::MissingKeyword { keyword: "NAXIS" })?;

  axis_lengths.sort_by_key(|(index, _)| *index);
  let axes: Vec<usize> = axis_lengths.into_iter().map(|(_, len)| len).collect();
  if (axes.len() as i64) < naxis {
    return Err(FitsError::MissingKeyword { keyword: "NAXISn" });
  }

  Ok(FitsHeader {
    bitpix,
    naxis,
    axes,
    bzero,
    bscale,
  })
}

fn card_value(card: &[u8]) -> Result<&str, FitsError> {
  if card.len() < 10 || &card[8..10] != b"= " {
    return Err(FitsError::MalformedCard {
      card: String::from_utf8_lossy(card).trim_end().to_string(),
    });
  }
  let rest = std::str::from_utf8(&card[10..]).map_err(|_| FitsError::MalformedCard {
    card: String::from_utf8_lossy(card).trim_end().to_string(),
  })?;
  // Strip an inline comment, if any.
  let value = rest.split('/').next().unwrap_or(rest).trim();
  Ok(value)
}

fn parse_int_value(card: &[u8]) -> Result<i64, FitsError> {
  let value = card_value(card)?;
  value.parse::<i64>().map_err(|_| FitsError::MalformedCard {
    card: String::from_utf8_lossy(card).trim_end().to_string(),
  })
}

fn parse_float_value(card: &[u8]) -> Result<f64, FitsError> {
  let value = card_value(card)?;
  value.parse::<f64>().map_err(|_| FitsError::MalformedCard {
    card: String::from_utf8_lossy(card).trim_end().to_string(),
  })
}

fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
  let mut total = 0;
  while total < buf.len() {
    let n = reader.read(&mut buf[total..])?;
    if n == 0 {
      break;
    }
    total += n;
  }
  Ok(total)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn write_then_read_preserves_samples_and_shape() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("roundtrip.fits");

    let mut raster = Raster::filled(5, 3, 1.5);
    raster.set(2, 4, -7.25);
    raster.set(0, 1, f32::NAN);

    write_raster(&path, &raster).expect("write");
    let loaded = read_raster(&path).expect("read");

    assert_eq!(loaded.width(), 5);
    assert_eq!(loaded.height(), 3);
    assert_eq!(loaded.get(2, 4), -7.25);
    assert_eq!(loaded.get(1, 3), 1.5);
    assert!(loaded.get(0, 1).is_nan());
  }

  #[test]
  fn header_reports_shape_without_reading_data() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("header.fits");

    write_raster(&path, &Raster::filled(7, 2, 0.0)).expect("write");
    let header = read_header(&path).expect("read header");

    assert_eq!(header.bitpix, -32);
    assert_eq!(header.naxis, 2);
    assert_eq!(header.axes, vec![7, 2]);
  }

  #[test]
  fn rejects_non_fits_input() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("not.fits");
    std::fs::write(&path, vec![b'x'; BLOCK_SIZE]).expect("write junk");

    match read_raster(&path) {
      Err(FitsError::NotFits) => {}
      other => panic!("expected NotFits, got {other:?}"),
    }
  }

  #[test]
  fn rejects_truncated_data_unit() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("truncated.fits");

    write_raster(&path, &Raster::filled(64, 64, 1.0)).expect("write");
    let full = std::fs::read(&path).expect("read back");
    // Keep the header block and one partial data block.
    std::fs::write(&path, &full[..BLOCK_SIZE + 16]).expect("truncate");

    match read_raster(&path) {
      Err(FitsError::TruncatedData { .. }) => {}
      other => panic!("expected TruncatedData, got {other:?}"),
    }
  }
}
