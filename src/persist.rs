use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::record::Record;
use crate::{Result, OUTPUT_DELIMITER};

/// Writes a partition's records: backup chunks while the run goes on, everything
/// to the output file at the end. Both files are only ever appended to.
#[derive(Debug)]
pub struct Persister {
    output: PathBuf,
    backup: PathBuf,
    save_every: usize,
    flushes: usize,
}

impl Persister {
    pub fn new(output: impl Into<PathBuf>, backup: impl Into<PathBuf>, save_every: usize) -> Self {
        Self {
            output: output.into(),
            backup: backup.into(),
            save_every,
            flushes: 0,
        }
    }

    /// Appends the last `save_every` records to the backup file if the buffer
    /// has just reached a multiple of `save_every`. Returns whether it did.
    pub fn flush_check(&mut self, buffer: &[Record]) -> Result<bool> {
        if self.save_every == 0 || buffer.is_empty() || buffer.len() % self.save_every != 0 {
            return Ok(false);
        }

        let chunk = &buffer[buffer.len() - self.save_every..];
        append_records(&self.backup, chunk)?;
        self.flushes += 1;
        info!(
            "Saved {} agents into backup file {}",
            chunk.len(),
            self.backup.display()
        );
        Ok(true)
    }

    /// Appends the whole buffer to the output file.
    pub fn write_final(&self, buffer: &[Record]) -> Result<()> {
        if buffer.is_empty() {
            info!("No agents collected, leaving {} untouched", self.output.display());
            return Ok(());
        }
        append_records(&self.output, buffer)
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

/// Appends `records` to `path`, writing the header row only if the file doesn't exist yet.
pub fn append_records(path: &Path, records: &[Record]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_exists = path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(OUTPUT_DELIMITER)
        .has_headers(!file_exists)
        .from_writer(file);

    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(range: std::ops::RangeInclusive<u64>) -> Vec<Record> {
        range.map(|i| Record::blank(1, i, "Ohio")).collect()
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        append_records(&path, &records(1..=2)).unwrap();
        append_records(&path, &records(3..=3)).unwrap();

        let lines = lines(&path);
        assert_eq!(
            lines[0],
            "Page*Agent_index*Name*Years of Service*Badges*Phone*Email*Website*Languages*State"
        );
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "1*agent_3********Ohio");
    }

    #[test]
    fn separator_inside_a_field_is_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut record = Record::blank(1, 1, "Ohio");
        record.name = "A*B".into();
        append_records(&path, &[record]).unwrap();
        assert!(lines(&path)[1].contains("\"A*B\""));
    }

    #[test]
    fn backup_flushes_only_on_multiples() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("nested").join("backup.csv");
        let mut persister = Persister::new(dir.path().join("out.csv"), &backup, 2);

        let buffer = records(1..=5);
        let flushed: Vec<bool> = (1..=buffer.len())
            .map(|n| persister.flush_check(&buffer[..n]).unwrap())
            .collect();
        assert_eq!(flushed, vec![false, true, false, true, false]);
        assert_eq!(persister.flushes(), 2);

        let lines = lines(&backup);
        assert_eq!(lines.len(), 5);
        assert!(lines[1].contains("agent_1*"));
        assert!(lines[4].contains("agent_4*"));
    }

    #[test]
    fn empty_final_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let persister = Persister::new(&output, dir.path().join("b.csv"), 100);
        persister.write_final(&[]).unwrap();
        assert!(!output.exists());
    }
}
