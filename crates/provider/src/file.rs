//! Local file byte source.

use crate::ByteSource;
use async_trait::async_trait;
use exposure_core::error::{ExposureError, ExposureResult};
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

pub struct FileSource {
    path: PathBuf,
    display: String,
    size: u64,
}

impl FileSource {
    pub async fn open(path: impl Into<PathBuf>) -> ExposureResult<Self> {
        let path = path.into();
        let display = path.display().to_string();
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ExposureError::Provider(format!("cannot open {display}: {e}")))?;
        if !meta.is_file() {
            return Err(ExposureError::Provider(format!("{display} is not a file")));
        }
        Ok(Self {
            path,
            display,
            size: meta.len(),
        })
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, offset: u64, len: usize) -> ExposureResult<Vec<u8>> {
        let io_err = |e: std::io::Error| ExposureError::Provider(format!("{}: {e}", self.display));

        let mut file = tokio::fs::File::open(&self.path).await.map_err(io_err)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(io_err)?;

        let want = len.min(self.size.saturating_sub(offset) as usize);
        let mut buf = vec![0u8; want];
        file.read_exact(&mut buf).await.map_err(io_err)?;
        Ok(buf)
    }

    fn describe(&self) -> &str {
        &self.display
    }
}
