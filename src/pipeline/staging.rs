//! Request-scoped upload staging. Uploads are streamed into a file in the
//! system temp directory and the pipeline reads them from there. The file is
//! removed when the `StagedUpload` is dropped, on success and error paths
//! alike.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

pub struct StagedUpload {
    file: NamedTempFile,
    original_name: Option<String>,
    size: usize,
}

impl StagedUpload {
    /// Create an empty staged file. `suffix` keeps the extension (`.pdf`,
    /// `.img`) for anyone inspecting the temp directory.
    pub fn create(original_name: Option<&str>, suffix: &str) -> std::io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("lucidcare-")
            .suffix(suffix)
            .tempfile()?;
        Ok(Self {
            file,
            original_name: original_name.map(sanitize_filename),
            size: 0,
        })
    }

    /// Append one received chunk.
    pub fn append(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.file.write_all(chunk)?;
        self.size += chunk.len();
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Load the staged contents for analysis.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.file.path())
    }
}

/// Keep only the final path component of a client-supplied name.
pub fn sanitize_filename(name: &str) -> String {
    name.rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(name)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_upload(bytes: &[u8], name: Option<&str>, suffix: &str) -> StagedUpload {
        let mut staged = StagedUpload::create(name, suffix).unwrap();
        staged.append(bytes).unwrap();
        staged
    }

    #[test]
    fn chunks_are_appended_in_order() {
        let mut staged = StagedUpload::create(Some("film.png"), ".img").unwrap();
        assert!(staged.is_empty());
        staged.append(b"%PDF-").unwrap();
        staged.append(b"1.5 body").unwrap();
        assert_eq!(staged.size(), 13);
        assert_eq!(staged.read().unwrap(), b"%PDF-1.5 body");
    }

    #[test]
    fn staged_bytes_read_back() {
        let staged = stage_upload(b"%PDF-1.5 body", Some("report.pdf"), ".pdf");
        assert_eq!(staged.read().unwrap(), b"%PDF-1.5 body");
        assert_eq!(staged.size(), 13);
        assert_eq!(staged.original_name(), Some("report.pdf"));
        assert!(staged.path().to_string_lossy().ends_with(".pdf"));
    }

    #[test]
    fn file_removed_on_drop() {
        let staged = stage_upload(b"bytes", None, ".png");
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn file_removed_when_caller_errors() {
        fn failing_stage(path_out: &mut Option<std::path::PathBuf>) -> Result<(), String> {
            let mut staged = StagedUpload::create(None, ".png").map_err(|e| e.to_string())?;
            staged.append(b"bytes").map_err(|e| e.to_string())?;
            *path_out = Some(staged.path().to_path_buf());
            Err("downstream failure".into())
        }
        let mut path = None;
        assert!(failing_stage(&mut path).is_err());
        assert!(!path.unwrap().exists());
    }

    #[test]
    fn client_paths_are_stripped() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\scans\\film.jpg"), "film.jpg");
        assert_eq!(sanitize_filename("plain.pdf"), "plain.pdf");
    }
}
