//! Per-day CSV artifact store.
//!
//! Layout: `{root}/{protocol}/swaps_{YYYY-MM-DD}.csv`
//!
//! A file's existence is the only record that a day was fetched, so writes
//! are atomic (write to `.csv.tmp`, rename into place): an interrupted write
//! never leaves something that looks like a finished day.

use super::provider::DataError;
use super::table::SwapTable;
use super::window::TimeWindow;
use chrono::NaiveDate;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "swaps_";
const FILE_EXTENSION: &str = "csv";

pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(root: impl AsRef<Path>, protocol: &str) -> Self {
        Self {
            dir: root.as_ref().join(protocol),
        }
    }

    /// Directory holding this protocol's artifacts.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the artifact directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<(), DataError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            DataError::StoreError(format!("failed to create {}: {e}", self.dir.display()))
        })
    }

    pub fn file_name(date: NaiveDate) -> String {
        format!("{FILE_PREFIX}{date}.{FILE_EXTENSION}")
    }

    pub fn path_for(&self, window: &TimeWindow) -> PathBuf {
        self.dir.join(Self::file_name(window.date()))
    }

    pub fn exists(&self, window: &TimeWindow) -> bool {
        self.path_for(window).is_file()
    }

    /// Write `table` as the artifact for `window`, replacing nothing on failure.
    pub fn write(&self, window: &TimeWindow, table: &SwapTable) -> Result<PathBuf, DataError> {
        self.ensure_dir()?;
        let path = self.path_for(window);
        let tmp_path = path.with_extension("csv.tmp");

        if let Err(e) = write_table(&tmp_path, table) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::StoreError(format!("atomic rename failed: {e}"))
        })?;

        Ok(path)
    }

    /// Dates that already have an artifact, ascending.
    pub fn fetched_dates(&self) -> Result<Vec<NaiveDate>, DataError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir)
            .map_err(|e| DataError::StoreError(format!("read dir: {e}")))?;

        let mut dates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::StoreError(format!("dir entry: {e}")))?;
            let name = entry.file_name();
            if let Some(date) = name.to_str().and_then(parse_file_name) {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    /// Windows from `windows` that have no artifact yet.
    pub fn missing<'w>(&self, windows: &'w [TimeWindow]) -> Vec<&'w TimeWindow> {
        windows.iter().filter(|w| !self.exists(w)).collect()
    }
}

fn write_table(path: &Path, table: &SwapTable) -> Result<(), DataError> {
    let file = fs::File::create(path)
        .map_err(|e| DataError::StoreError(format!("create {}: {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    table.write_csv(&mut writer)?;
    writer
        .flush()
        .map_err(|e| DataError::StoreError(format!("flush {}: {e}", path.display())))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| DataError::StoreError(format!("sync {}: {e}", path.display())))
}

fn parse_file_name(name: &str) -> Option<NaiveDate> {
    let stem = name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_EXTENSION)?
        .strip_suffix('.')?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::window::daily_windows;

    fn sample_table() -> SwapTable {
        let mut t = SwapTable::new(vec!["protocol".into(), "swaps_amountUSD".into()]);
        t.push_row(vec!["uniswap_v3".into(), "10.5".into()]).unwrap();
        t
    }

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn path_layout_is_protocol_then_dated_file() {
        let store = CsvStore::new("data", "uniswap_v3");
        let w = TimeWindow::for_day(jan(1)).unwrap();
        assert_eq!(
            store.path_for(&w),
            PathBuf::from("data/uniswap_v3/swaps_2024-01-01.csv")
        );
    }

    #[test]
    fn write_creates_file_and_leaves_no_tmp() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CsvStore::new(tmp.path(), "uniswap_v3");
        let w = TimeWindow::for_day(jan(2)).unwrap();

        assert!(!store.exists(&w));
        let path = store.write(&w, &sample_table()).unwrap();
        assert!(store.exists(&w));
        assert!(!path.with_extension("csv.tmp").exists());

        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content, "protocol,swaps_amountUSD\nuniswap_v3,10.5\n");
    }

    #[test]
    fn failed_write_leaves_no_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CsvStore::new(tmp.path(), "uniswap_v3");
        let w = TimeWindow::for_day(jan(4)).unwrap();

        // A non-empty directory squatting on the target makes the rename fail.
        let path = store.path_for(&w);
        fs::create_dir_all(path.join("blocker")).unwrap();

        let err = store.write(&w, &sample_table()).unwrap_err();
        assert!(matches!(err, DataError::StoreError(_)));
        assert!(!store.exists(&w));
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn fetched_dates_ignores_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CsvStore::new(tmp.path(), "uniswap_v3");
        for day in [3, 1] {
            let w = TimeWindow::for_day(jan(day)).unwrap();
            store.write(&w, &sample_table()).unwrap();
        }
        fs::write(store.dir().join("swaps_2024-01-05.csv.tmp"), "partial").unwrap();
        fs::write(store.dir().join("notes.txt"), "x").unwrap();

        assert_eq!(store.fetched_dates().unwrap(), vec![jan(1), jan(3)]);
    }

    #[test]
    fn missing_lists_unfetched_windows() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CsvStore::new(tmp.path(), "uniswap_v3");
        let windows = daily_windows(jan(1), 3).unwrap();
        store.write(&windows[1], &sample_table()).unwrap();

        let missing: Vec<NaiveDate> = store.missing(&windows).iter().map(|w| w.date()).collect();
        assert_eq!(missing, vec![jan(1), jan(3)]);
    }

    #[test]
    fn fetched_dates_on_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CsvStore::new(tmp.path().join("nope"), "uniswap_v3");
        assert!(store.fetched_dates().unwrap().is_empty());
    }
}
