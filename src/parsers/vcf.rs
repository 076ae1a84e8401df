use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{MalformedRecordError, Result};
use crate::types::*;

/// Minimum number of columns in a variant line (CHROM through INFO).
pub const MIN_COLUMNS: usize = 8;

/// Parse one tab-separated variant line.
///
/// `.` in ID, QUAL and FILTER becomes `None`. FORMAT and sample columns are kept
/// when present.
pub fn parse_record(line: &str) -> std::result::Result<VariantRecord, MalformedRecordError> {
    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() < MIN_COLUMNS {
        return Err(MalformedRecordError::TooFewColumns {
            expected: MIN_COLUMNS,
            found: parts.len(),
        });
    }

    let position: u64 = parts[1]
        .parse()
        .map_err(|_| MalformedRecordError::InvalidPosition(parts[1].to_string()))?;

    let key = VariantKey::new(parts[0], position, parts[3], parts[4]);
    let mut record = VariantRecord::new(key);
    record.id = missing_as_none(parts[2]);
    record.qual = missing_as_none(parts[5]);
    record.filter = missing_as_none(parts[6]);
    record.info = InfoField::parse(parts[7]);

    if parts.len() > MIN_COLUMNS {
        record.format = Some(FormatColumns::parse(parts[8], &parts[9..]));
    }

    Ok(record)
}

fn missing_as_none(value: &str) -> Option<String> {
    if value == "." || value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

enum VcfSink<W: Write> {
    Plain(BufWriter<W>),
    Gzip(GzEncoder<BufWriter<W>>),
}

/// Writes header lines and records, gzip-compressing when the path ends in `.gz`.
///
/// [`finish`](VcfWriter::finish) must be called to flush output and terminate the gzip
/// stream; errors at that point are only reported there.
pub struct VcfWriter<W: Write = File> {
    inner: VcfSink<W>,
    records_written: usize,
}

impl VcfWriter<File> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        if path.to_string_lossy().ends_with(".gz") {
            Ok(Self::gzip(file))
        } else {
            Ok(Self::plain(file))
        }
    }
}

impl<W: Write> VcfWriter<W> {
    pub fn plain(writer: W) -> Self {
        Self {
            inner: VcfSink::Plain(BufWriter::new(writer)),
            records_written: 0,
        }
    }

    pub fn gzip(writer: W) -> Self {
        Self {
            inner: VcfSink::Gzip(GzEncoder::new(BufWriter::new(writer), Compression::default())),
            records_written: 0,
        }
    }

    fn out(&mut self) -> &mut dyn Write {
        match &mut self.inner {
            VcfSink::Plain(w) => w,
            VcfSink::Gzip(w) => w,
        }
    }

    pub fn write_headers<S: AsRef<str>>(&mut self, headers: &[S]) -> Result<()> {
        let out = self.out();
        for header in headers {
            writeln!(out, "{}", header.as_ref())?;
        }
        Ok(())
    }

    pub fn write_record(&mut self, record: &VariantRecord) -> Result<()> {
        writeln!(self.out(), "{}", record.to_line())?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Write the gzip trailer if any, flush, and return the number of records written.
    pub fn finish(self) -> Result<usize> {
        match self.inner {
            VcfSink::Plain(mut w) => w.flush()?,
            VcfSink::Gzip(encoder) => encoder.finish()?.flush()?,
        }
        Ok(self.records_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "chrI\t1234\trs1\tA\tT\t60.5\tPASS\tDP=20;MQ=60;ANN=T|missense_variant|MODERATE|TFC3|YAL001C|transcript|YAL001C_mRNA|protein_coding|1/1|c.10A>T|p.Lys4Ter|10/100|10/100|4/33||\tGT:DP:AD\t0/1:20:10,10";

    #[test]
    fn test_parse_full_record() {
        let record = parse_record(LINE).unwrap();
        assert_eq!(record.chrom(), "chrI");
        assert_eq!(record.pos(), 1234);
        assert_eq!(record.reference(), "A");
        assert_eq!(record.alt(), "T");
        assert_eq!(record.id.as_deref(), Some("rs1"));
        assert_eq!(record.qual.as_deref(), Some("60.5"));
        assert_eq!(record.filter.as_deref(), Some("PASS"));
        assert_eq!(record.info.value("MQ"), Some("60"));
        let format = record.format.as_ref().unwrap();
        assert_eq!(format.first_sample("AD"), Some("10,10"));
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let record = parse_record(LINE).unwrap();
        assert_eq!(record.to_line(), LINE);

        let sites_only = "chrII\t5\t.\tG\tC,A\t.\t.\t.";
        assert_eq!(parse_record(sites_only).unwrap().to_line(), sites_only);
    }

    #[test]
    fn test_identity_key_stable_under_reparse() {
        let first = parse_record(LINE).unwrap();
        let second = parse_record(&first.to_line()).unwrap();
        assert_eq!(first.key(), second.key());
        assert_eq!(first.key().to_string(), "chrI:1234:A:T");
    }

    #[test]
    fn test_too_few_columns() {
        let err = parse_record("chrI\t100\t.\tA\tT\t.\tPASS").unwrap_err();
        assert_eq!(
            err,
            MalformedRecordError::TooFewColumns {
                expected: 8,
                found: 7
            }
        );
    }

    #[test]
    fn test_invalid_position() {
        let err = parse_record("chrI\tx\t.\tA\tT\t.\tPASS\t.").unwrap_err();
        assert_eq!(err, MalformedRecordError::InvalidPosition("x".to_string()));
    }

    /// Accepts nothing, like a full disk.
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_finish_reports_failed_gzip_trailer() {
        let record = parse_record(LINE).unwrap();
        let mut writer = VcfWriter::gzip(FullDisk);
        writer.write_headers(&["##fileformat=VCFv4.2"]).unwrap();
        writer.write_record(&record).unwrap();
        assert_eq!(writer.records_written(), 1);
        assert!(writer.finish().is_err());
    }

    #[test]
    fn test_finish_reports_failed_plain_flush() {
        let record = parse_record(LINE).unwrap();
        let mut writer = VcfWriter::plain(FullDisk);
        writer.write_record(&record).unwrap();
        assert!(writer.finish().is_err());
    }

    #[test]
    fn test_missing_filter_is_none() {
        let record = parse_record("chrI\t1\t.\tA\tT\t.\t.\t.").unwrap();
        assert_eq!(record.filter, None);
        assert!(record.format.is_none());
        assert!(record.annotations().is_empty());
    }
}
