use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};
use xz2::read::XzDecoder;

use crate::error::{MalformedRecordError, Result, TriageError};
use crate::types::VariantRecord;

pub mod ann;
pub mod tables;
pub mod vcf;

pub use ann::decode_annotations;
pub use vcf::parse_record;

const READ_BUFFER: usize = 256 * 1024;

/// Open a text source, decompressing `.gz`/`.bgz`, `.bz2` and `.xz` by extension.
pub fn open_file(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|source| TriageError::UnreadableSource {
        path: path.to_path_buf(),
        source,
    })?;

    let name = path.to_string_lossy().to_lowercase();
    let reader: Box<dyn BufRead> = if name.ends_with(".gz") || name.ends_with(".bgz") {
        Box::new(BufReader::with_capacity(READ_BUFFER, MultiGzDecoder::new(file)))
    } else if name.ends_with(".bz2") {
        Box::new(BufReader::with_capacity(READ_BUFFER, BzDecoder::new(file)))
    } else if name.ends_with(".xz") {
        Box::new(BufReader::with_capacity(READ_BUFFER, XzDecoder::new(file)))
    } else {
        Box::new(BufReader::with_capacity(READ_BUFFER, file))
    };

    debug!("Opened {}", path.display());
    Ok(reader)
}

/// Read the next raw line, terminator included, into `buf`.
/// Returns `Ok(false)` at end of input.
pub(crate) fn read_raw_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    Ok(reader.read_until(b'\n', buf)? > 0)
}

/// Decode a raw line as UTF-8 and strip its `\n` or `\r\n` terminator.
pub(crate) fn decode_line(bytes: &[u8]) -> std::result::Result<&str, MalformedRecordError> {
    std::str::from_utf8(bytes)
        .map(|line| line.trim_end_matches(&['\n', '\r'][..]))
        .map_err(|e| MalformedRecordError::InvalidEncoding(e.valid_up_to()))
}

/// What to do with a line that fails to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ParseMode {
    /// Abort the pass on the first malformed line.
    #[default]
    FailFast,
    /// Log the line number and continue with the next line.
    SkipAndLog,
}

/// A line from a variant file: either a header line, passed through as-is, or a record.
#[derive(Debug, Clone, PartialEq)]
pub enum VcfLine {
    Header(String),
    Record(VariantRecord),
}

/// Streaming reader yielding [`VcfLine`]s in input order.
pub struct RecordReader<R: BufRead> {
    reader: R,
    mode: ParseMode,
    line_no: usize,
    skipped: usize,
    buf: Vec<u8>,
}

impl RecordReader<Box<dyn BufRead>> {
    pub fn from_path(path: &Path, mode: ParseMode) -> Result<Self> {
        Ok(Self::new(open_file(path)?, mode))
    }
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R, mode: ParseMode) -> Self {
        Self {
            reader,
            mode,
            line_no: 0,
            skipped: 0,
            buf: Vec::new(),
        }
    }

    /// Number of malformed lines skipped so far (always 0 in fail-fast mode).
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Fail with the current line number, or log and count the line as skipped.
    fn reject(&mut self, source: MalformedRecordError) -> Option<TriageError> {
        match self.mode {
            ParseMode::FailFast => Some(TriageError::MalformedRecord {
                line: self.line_no,
                source,
            }),
            ParseMode::SkipAndLog => {
                warn!("Skipping malformed record at line {}: {}", self.line_no, source);
                self.skipped += 1;
                None
            }
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<VcfLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match read_raw_line(&mut self.reader, &mut self.buf) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => return Some(Err(TriageError::Io(e))),
            }
            self.line_no += 1;

            let line = match decode_line(&self.buf) {
                Ok(line) => line,
                Err(source) => match self.reject(source) {
                    Some(err) => return Some(Err(err)),
                    None => continue,
                },
            };
            if line.is_empty() {
                continue;
            }
            if line.starts_with('#') {
                return Some(Ok(VcfLine::Header(line.to_string())));
            }

            match parse_record(line) {
                Ok(record) => return Some(Ok(VcfLine::Record(record))),
                Err(source) => {
                    if let Some(err) = self.reject(source) {
                        return Some(Err(err));
                    }
                }
            }
        }
    }
}

/// A fully loaded variant file.
#[derive(Debug, Clone, Default)]
pub struct VcfContents {
    pub headers: Vec<String>,
    pub records: Vec<VariantRecord>,
    pub skipped: usize,
}

impl VcfContents {
    pub fn from_reader<R: BufRead>(reader: R, mode: ParseMode) -> Result<Self> {
        let mut lines = RecordReader::new(reader, mode);
        let mut contents = VcfContents::default();

        for line in lines.by_ref() {
            match line? {
                VcfLine::Header(h) => contents.headers.push(h),
                VcfLine::Record(r) => contents.records.push(r),
            }
        }

        contents.skipped = lines.skipped();
        Ok(contents)
    }

    pub fn from_path(path: &Path, mode: ParseMode) -> Result<Self> {
        let contents = Self::from_reader(open_file(path)?, mode)?;
        debug!(
            "Loaded {} records ({} header lines, {} skipped) from {}",
            contents.records.len(),
            contents.headers.len(),
            contents.skipped,
            path.display()
        );
        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const INPUT: &str = "##fileformat=VCFv4.2\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chrI\t100\t.\tA\tT\t50\tPASS\tDP=20\n\
chrI\tbroken\n\
\n\
chrI\t200\t.\tG\tC\t.\t.\t.\n";

    #[test]
    fn test_skip_and_log_mode_skips_bad_lines() {
        let contents =
            VcfContents::from_reader(Cursor::new(INPUT), ParseMode::SkipAndLog).unwrap();
        assert_eq!(contents.headers.len(), 2);
        assert_eq!(contents.records.len(), 2);
        assert_eq!(contents.skipped, 1);
        assert_eq!(contents.records[1].pos(), 200);
    }

    #[test]
    fn test_fail_fast_mode_reports_line_number() {
        let err = VcfContents::from_reader(Cursor::new(INPUT), ParseMode::FailFast).unwrap_err();
        match err {
            TriageError::MalformedRecord { line, source } => {
                assert_eq!(line, 4);
                assert_eq!(
                    source,
                    crate::error::MalformedRecordError::TooFewColumns {
                        expected: 8,
                        found: 2
                    }
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reader_handles_crlf() {
        let input = "chrI\t5\t.\tA\tG\t.\tPASS\tDP=3\r\n";
        let mut reader = RecordReader::new(Cursor::new(input), ParseMode::FailFast);
        match reader.next().unwrap().unwrap() {
            VcfLine::Record(r) => assert_eq!(r.info.value("DP"), Some("3")),
            other => panic!("expected record, got {other:?}"),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_invalid_utf8_line_follows_parse_mode() {
        let mut input = b"chrI\t100\t.\tA\tT\t50\tPASS\tDP=20\n".to_vec();
        input.extend_from_slice(b"chrI\t150\t.\tA\tT\t.\tPASS\tGENE=\xff\xfe\n");
        input.extend_from_slice(b"chrI\t200\t.\tG\tC\t.\t.\t.\n");

        let contents =
            VcfContents::from_reader(Cursor::new(input.clone()), ParseMode::SkipAndLog).unwrap();
        assert_eq!(contents.records.len(), 2);
        assert_eq!(contents.skipped, 1);
        assert_eq!(contents.records[1].pos(), 200);

        let err = VcfContents::from_reader(Cursor::new(input), ParseMode::FailFast).unwrap_err();
        match err {
            TriageError::MalformedRecord { line, source } => {
                assert_eq!(line, 2);
                assert!(matches!(
                    source,
                    crate::error::MalformedRecordError::InvalidEncoding(_)
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_open_file_missing_is_unreadable() {
        let err = open_file(Path::new("/nonexistent/ref.vcf.gz")).err().unwrap();
        assert!(matches!(err, TriageError::UnreadableSource { .. }));
    }
}
