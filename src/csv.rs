use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::AnalyzerError;
use crate::record::{JournalRecord, RecordEmitter};

/// CSV sink for the record stream. Columns come from the field order of
/// [`JournalRecord`]; fields are quoted only when they contain a comma,
/// quote or line break, contained quotes are doubled, rows end with `\n`.
pub struct CsvEmitter<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvEmitter<File> {
    pub fn create<P: AsRef<Path>>(path: P, include_header: bool) -> Result<Self, AnalyzerError> {
        let file = File::create(path)?;
        Ok(Self::from_writer(file, include_header))
    }
}

impl<W: Write> CsvEmitter<W> {
    pub fn from_writer(writer: W, include_header: bool) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(include_header)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        CsvEmitter { writer }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer.into_inner().expect("csv flush")
    }
}

impl<W: Write> RecordEmitter for CsvEmitter<W> {
    fn emit(&mut self, record: &JournalRecord) -> Result<(), AnalyzerError> {
        self.writer.serialize(record)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), AnalyzerError> {
        self.writer.flush()?;
        Ok(())
    }
}
