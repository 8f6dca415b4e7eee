//! Training log inspection
//!
//! The launched job tees its combined output into a single log file that
//! grows while the job runs. [`LogQuery`] is the `grep` of the classroom
//! notebooks: each call re-opens the file, so repeated queries observe
//! whatever the job appended in between.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use strum::{Display, EnumString};

/// Status markers the walkthroughs grep for by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Marker {
    /// Per-iteration progress lines.
    Iteration,
    /// Startup line confirming the assembled world size.
    WorldSize,
    /// Python runtime failure, e.g. CUDA out of memory.
    RuntimeError,
    /// NCCL channel setup lines, used to verify inter-node traffic.
    Nccl,
}

impl Marker {
    /// Substring actually searched for in the log.
    pub fn pattern(&self) -> &'static str {
        match self {
            Marker::Iteration => "iteration",
            Marker::WorldSize => "using world size",
            Marker::RuntimeError => "RuntimeError",
            Marker::Nccl => "Channel",
        }
    }
}

/// Marker search over one log file.
#[derive(Debug, Clone)]
pub struct LogQuery {
    path: PathBuf,
}

impl LogQuery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lazily yield lines containing `marker`, in file order. Unreadable
    /// lines (partial writes, invalid UTF-8) end the iteration quietly, the
    /// same way a pipe through `grep` would.
    pub fn matching(&self, marker: &str) -> io::Result<impl Iterator<Item = String>> {
        let file = File::open(&self.path)?;
        let marker = marker.to_string();
        Ok(BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter(move |line| line.contains(&marker)))
    }

    /// Like [`matching`](Self::matching) for a preset marker.
    pub fn matching_marker(&self, marker: Marker) -> io::Result<impl Iterator<Item = String>> {
        self.matching(marker.pattern())
    }

    /// Whether a runtime error has shown up in the log so far. The operator
    /// decides what to do about it; nothing here retries.
    pub fn has_runtime_error(&self) -> io::Result<bool> {
        Ok(self.matching_marker(Marker::RuntimeError)?.next().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;

    fn log_with(lines: &[&str]) -> (tempfile::TempDir, LogQuery) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log_2GPU.txt");
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        (dir, LogQuery::new(path))
    }

    #[test]
    fn test_matching_returns_exactly_the_marked_lines() {
        let (_dir, query) = log_with(&["[iteration 10] loss=4.2", "done"]);
        let lines: Vec<_> = query.matching("iteration").unwrap().collect();
        assert_eq!(lines, vec!["[iteration 10] loss=4.2".to_string()]);
    }

    #[test]
    fn test_query_is_restartable_and_sees_appended_lines() {
        let (_dir, query) = log_with(&["[iteration 10] loss=4.2"]);
        assert_eq!(query.matching("iteration").unwrap().count(), 1);

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(query.path())
            .unwrap();
        writeln!(file, "[iteration 20] loss=3.9").unwrap();

        assert_eq!(query.matching("iteration").unwrap().count(), 2);
    }

    #[test]
    fn test_world_size_marker() {
        let (_dir, query) = log_with(&["using world size: 4", "[iteration 10]"]);
        let lines: Vec<_> = query.matching_marker(Marker::WorldSize).unwrap().collect();
        assert_eq!(lines, vec!["using world size: 4".to_string()]);
    }

    #[test]
    fn test_runtime_error_detection() {
        let (_dir, query) = log_with(&["[iteration 10]"]);
        assert!(!query.has_runtime_error().unwrap());

        let (_dir, query) = log_with(&["RuntimeError: CUDA out of memory"]);
        assert!(query.has_runtime_error().unwrap());
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let query = LogQuery::new("/nonexistent/log.txt");
        assert!(query.matching("iteration").is_err());
    }

    #[test]
    fn test_marker_names_parse_from_kebab_case() {
        assert_eq!(Marker::from_str("world-size").unwrap(), Marker::WorldSize);
        assert_eq!(Marker::from_str("runtime-error").unwrap(), Marker::RuntimeError);
        assert!(Marker::from_str("unknown").is_err());
    }
}
