//! CSV export files

use oi_history::{ExportRow, HistoryError, write_csv};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};
use tracing::info;

/// Write `rows` to `dir/file_name`, creating `dir` if needed, and return the file path
pub fn write_export(dir: &Path, file_name: &str, rows: &[ExportRow]) -> Result<PathBuf, HistoryError> {
    fs::create_dir_all(dir)?;

    let path = dir.join(file_name);
    let file = File::create(&path)?;
    write_csv(BufWriter::new(file), rows)?;

    info!(path = %path.display(), rows = rows.len(), "exported OI history");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oi_history::export::EXPORT_HEADERS;

    #[test]
    fn test_write_export_creates_directory() {
        let dir = std::env::temp_dir()
            .join(format!("oi-dashboard-export-{}", std::process::id()))
            .join("nested");

        let path = write_export(&dir, "oi_history_2024-01-15.csv", &[]).unwrap();

        assert_eq!(path, dir.join("oi_history_2024-01-15.csv"));
        assert_eq!(
            fs::read_to_string(&path).unwrap().trim_end(),
            EXPORT_HEADERS.join(",")
        );

        fs::remove_dir_all(dir.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_write_export_reports_io_error() {
        // A regular file cannot act as the export directory
        let blocker = std::env::temp_dir().join(format!("oi-dashboard-blocker-{}", std::process::id()));
        fs::write(&blocker, b"").unwrap();

        let result = write_export(&blocker, "out.csv", &[]);

        assert!(matches!(result, Err(HistoryError::Io(_))));
        fs::remove_file(&blocker).unwrap();
    }
}
