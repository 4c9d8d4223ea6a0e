use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::SelectResult;

/// Writes streamed bytes to a local scratch file.
///
/// Opening truncates any previous content so a retried attempt starts from an
/// empty file.
pub struct LocalSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl LocalSink {
    pub async fn create<P: AsRef<Path>>(path: P) -> SelectResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = File::create(&path).await?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> SelectResult<()> {
        self.writer.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush buffered bytes and return the total written
    pub async fn finish(mut self) -> SelectResult<u64> {
        self.writer.flush().await?;
        self.writer.get_mut().sync_all().await?;
        Ok(self.written)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_truncates_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");

        let mut sink = LocalSink::create(&path).await.unwrap();
        sink.write(b"first attempt, longer").await.unwrap();
        sink.finish().await.unwrap();

        let mut sink = LocalSink::create(&path).await.unwrap();
        sink.write(b"a,b\n").await.unwrap();
        sink.write(b"1,2\n").await.unwrap();
        assert_eq!(sink.written(), 8);
        assert_eq!(sink.path(), path.as_path());
        assert_eq!(sink.finish().await.unwrap(), 8);

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"a,b\n1,2\n");
    }
}
