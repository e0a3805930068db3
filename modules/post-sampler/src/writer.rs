//! Per-month JSON array output.
//!
//! Records are streamed into a temp file next to the target as they are
//! accepted. The array is closed and the file moved into place only when the
//! month finishes, so an interrupted run never leaves a truncated array at the
//! final path. A run that stops on an error keeps what it had as a closed
//! array at `{prefix}_{YYYY-MM}.partial.json`.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::window::YearMonth;

pub struct ResultWriter {
    out_dir: PathBuf,
    prefix: String,
}

impl ResultWriter {
    /// Create the output directory if needed.
    pub fn new(out_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> io::Result<Self> {
        let out_dir = out_dir.into();
        fs::create_dir_all(&out_dir)?;
        Ok(Self {
            out_dir,
            prefix: prefix.into(),
        })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// `{out_dir}/{prefix}_{YYYY-MM}.json`
    pub fn path_for(&self, month: YearMonth) -> PathBuf {
        self.out_dir.join(format!("{}_{}.json", self.prefix, month))
    }

    /// `{out_dir}/{prefix}_{YYYY-MM}.partial.json`
    pub fn partial_path_for(&self, month: YearMonth) -> PathBuf {
        self.out_dir.join(format!("{}_{}.partial.json", self.prefix, month))
    }

    /// Start a month's array. The target path is not touched until `finish`.
    pub fn open_month(&self, month: YearMonth) -> io::Result<MonthlyOutput> {
        let target = self.path_for(month);
        let partial = self.partial_path_for(month);
        let tmp = tempfile::Builder::new()
            .prefix(&format!(".{}_{}.", self.prefix, month))
            .suffix(".partial")
            .tempfile_in(&self.out_dir)?;

        let mut file = BufWriter::new(tmp);
        file.write_all(b"[\n")?;
        debug!(path = %target.display(), "Opened monthly output");

        Ok(MonthlyOutput {
            file,
            target,
            partial,
            count: 0,
        })
    }
}

/// An open, append-only JSON array for one month.
pub struct MonthlyOutput {
    file: BufWriter<NamedTempFile>,
    target: PathBuf,
    partial: PathBuf,
    count: usize,
}

impl MonthlyOutput {
    /// Stream one record, comma-separated from the previous one, and flush.
    pub fn append(&mut self, post: &Value) -> io::Result<()> {
        if self.count > 0 {
            self.file.write_all(b",\n")?;
        }
        serde_json::to_writer(&mut self.file, post)?;
        self.file.flush()?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Close the array and atomically move the file to its final path.
    pub fn finish(self) -> io::Result<PathBuf> {
        let target = self.target.clone();
        self.close_into(&target)?;
        Ok(target)
    }

    /// Close the array of an interrupted month and keep it beside the final
    /// path. Nothing is kept when no record was written.
    pub fn keep_partial(self) -> io::Result<Option<PathBuf>> {
        if self.count == 0 {
            return Ok(None);
        }
        let partial = self.partial.clone();
        self.close_into(&partial)?;
        Ok(Some(partial))
    }

    fn close_into(mut self, path: &Path) -> io::Result<()> {
        self.file.write_all(b"\n]\n")?;
        let tmp = self.file.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const JAN: YearMonth = YearMonth {
        year: 2024,
        month: 1,
    };

    fn read_array(path: &Path) -> Vec<Value> {
        let text = fs::read_to_string(path).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn file_named_by_prefix_and_month() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), "bluesky").unwrap();
        assert_eq!(writer.path_for(JAN), dir.path().join("bluesky_2024-01.json"));
    }

    #[test]
    fn appended_records_form_a_valid_array() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), "bluesky").unwrap();

        let mut out = writer.open_month(JAN).unwrap();
        out.append(&json!({ "uri": "at://1", "text": "héllo" })).unwrap();
        out.append(&json!({ "uri": "at://2" })).unwrap();
        out.append(&json!({ "uri": "at://3" })).unwrap();
        assert_eq!(out.count(), 3);
        let path = out.finish().unwrap();

        let posts = read_array(&path);
        let uris: Vec<&str> = posts.iter().map(|p| p["uri"].as_str().unwrap()).collect();
        assert_eq!(uris, vec!["at://1", "at://2", "at://3"]);
        assert_eq!(posts[0]["text"], "héllo");
    }

    #[test]
    fn empty_month_is_an_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), "bluesky").unwrap();
        let path = writer.open_month(JAN).unwrap().finish().unwrap();
        assert!(read_array(&path).is_empty());
    }

    #[test]
    fn unfinished_month_never_reaches_target_path() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), "bluesky").unwrap();

        let mut out = writer.open_month(JAN).unwrap();
        out.append(&json!({ "uri": "at://1" })).unwrap();
        let target = out.target().to_path_buf();
        drop(out);

        assert!(!target.exists());
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn interrupted_month_keeps_a_closed_partial_array() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), "bluesky").unwrap();

        let mut out = writer.open_month(JAN).unwrap();
        out.append(&json!({ "uri": "at://1" })).unwrap();
        out.append(&json!({ "uri": "at://2" })).unwrap();
        let target = out.target().to_path_buf();
        let kept = out.keep_partial().unwrap().unwrap();

        assert_eq!(kept, dir.path().join("bluesky_2024-01.partial.json"));
        assert!(!target.exists());
        assert_eq!(read_array(&kept).len(), 2);
    }

    #[test]
    fn interrupted_empty_month_keeps_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), "bluesky").unwrap();

        let kept = writer.open_month(JAN).unwrap().keep_partial().unwrap();

        assert!(kept.is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn creates_nested_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("bluesky").join("dataset");
        let writer = ResultWriter::new(&nested, "bluesky").unwrap();
        assert!(writer.out_dir().is_dir());
    }
}
