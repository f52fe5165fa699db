use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{
    error::{LabError, LabResult},
    models::UploadedDocument,
};

const PREFIX: &str = "lab-report-";

/// An upload written to disk for a collaborator that needs a path.
///
/// The file is removed by `release` or, on any other exit path, when the
/// value is dropped.
#[derive(Debug)]
pub struct StagedFile {
    file: NamedTempFile,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn release(self) -> LabResult<()> {
        let path = self.file.path().to_path_buf();
        self.file
            .close()
            .map_err(|e| LabError::Storage(format!("failed to remove {}: {e}", path.display())))?;
        debug!(path = %path.display(), "staged upload released");
        Ok(())
    }
}

/// Writes the upload to a uniquely named file, keeping its extension.
pub fn stage(doc: &UploadedDocument, dir: Option<&Path>) -> LabResult<StagedFile> {
    let suffix = format!(".{}", extension_for(doc));
    let mut builder = tempfile::Builder::new();
    builder.prefix(PREFIX).suffix(&suffix);

    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| LabError::Storage(format!("failed to create staging file: {e}")))?;

    if let Err(e) = file.write_all(&doc.bytes).and_then(|_| file.flush()) {
        warn!(filename = %doc.filename, "failed to write staged upload: {}", e);
        return Err(LabError::Storage(format!("failed to write {}: {e}", doc.filename)));
    }

    debug!(path = %file.path().display(), size = doc.size(), "upload staged");
    Ok(StagedFile { file })
}

fn extension_for(doc: &UploadedDocument) -> String {
    PathBuf::from(&doc.filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| doc.media_type.extension().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::accept_upload;

    fn residual_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    async fn consume(path: &Path, fail: bool) -> anyhow::Result<usize> {
        let bytes = tokio::fs::read(path).await?;
        if fail {
            anyhow::bail!("remote call failed");
        }
        Ok(bytes.len())
    }

    #[tokio::test]
    async fn release_after_success_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let doc = accept_upload("CBC Panel.JPEG", Some("image/jpeg"), vec![7; 64]).unwrap();

        let staged = stage(&doc, Some(dir.path())).unwrap();
        let name = staged.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(PREFIX));
        assert!(name.ends_with(".jpeg"));

        assert_eq!(consume(staged.path(), false).await.unwrap(), 64);
        staged.release().unwrap();
        assert!(residual_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn failing_consumer_still_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let doc = accept_upload("report.png", Some("image/png"), vec![1; 16]).unwrap();

        let outcome: LabResult<usize> = async {
            let staged = stage(&doc, Some(dir.path()))?;
            let n = consume(staged.path(), true)
                .await
                .map_err(|e| LabError::AnalysisFailed(e.to_string()))?;
            staged.release()?;
            Ok(n)
        }
        .await;

        assert!(matches!(outcome, Err(LabError::AnalysisFailed(_))));
        assert!(residual_files(dir.path()).is_empty());
    }

    #[test]
    fn panicking_consumer_still_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let doc = accept_upload("report.png", Some("image/png"), vec![1; 16]).unwrap();
        let path = dir.path().to_path_buf();

        let result = std::panic::catch_unwind(|| {
            let _staged = stage(&doc, Some(&path)).unwrap();
            panic!("consumer exploded");
        });

        assert!(result.is_err());
        assert!(residual_files(dir.path()).is_empty());
    }

    #[test]
    fn missing_extension_uses_media_type() {
        let doc = accept_upload("labs", Some("application/pdf"), b"%PDF".to_vec()).unwrap();
        assert_eq!(extension_for(&doc), "pdf");
    }

    #[test]
    fn missing_directory_is_storage_error() {
        let doc = accept_upload("labs.png", Some("image/png"), vec![1]).unwrap();
        let err = stage(&doc, Some(Path::new("/definitely/not/here"))).unwrap_err();
        assert!(matches!(err, LabError::Storage(_)));
    }
}
