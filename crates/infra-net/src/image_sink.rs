// Atomic image storage: write to `<name>.part`, rename over the target on commit
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Streaming writer for the well-known image file
///
/// Readers of the final path only ever see a complete image: either the
/// previous cycle's or this one's after `commit`.
pub struct ImageSink {
    final_path: PathBuf,
    part_path: PathBuf,
    file: File,
    written: u64,
}

impl ImageSink {
    /// Open (truncate) the staging file next to `path`
    pub async fn create(path: &Path) -> io::Result<Self> {
        let part_path = part_path_for(path)?;
        let file = File::create(&part_path).await?;

        Ok(Self {
            final_path: path.to_path_buf(),
            part_path,
            file,
            written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush, sync and move the staged bytes into place
    ///
    /// On failure the staging file is removed and the previous image stays.
    pub async fn commit(self) -> io::Result<u64> {
        let Self {
            final_path,
            part_path,
            mut file,
            written,
        } = self;

        let mut result = file.flush().await;
        if result.is_ok() {
            result = file.sync_all().await;
        }
        drop(file);
        if result.is_ok() {
            result = fs::rename(&part_path, &final_path).await;
        }
        if let Err(e) = result {
            remove_part(&part_path).await;
            return Err(e);
        }

        debug!(
            path = %final_path.display(),
            bytes = %written,
            "Image committed"
        );
        Ok(written)
    }

    /// Drop the staged bytes; the previous image stays in place
    pub async fn discard(self) {
        drop(self.file);
        remove_part(&self.part_path).await;
    }
}

async fn remove_part(part_path: &Path) {
    if let Err(e) = fs::remove_file(part_path).await {
        debug!(path = %part_path.display(), error = %e, "Could not remove partial image");
    }
}

fn part_path_for(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("image path has no file name: {}", path.display()),
        )
    })?;
    let mut part_name = name.to_os_string();
    part_name.push(".part");
    Ok(path.with_file_name(part_name))
}
