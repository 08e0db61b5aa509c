// Assignment wire protocol
//
// Server sends an address token, then the image bytes, then closes its side.
// There is no length prefix and no acknowledgement.
use serde::Deserialize;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::debug;

use pixagent_core::application::constants::{ADDRESS_READ_BUFFER_SIZE, IMAGE_CHUNK_SIZE};
use pixagent_core::domain::{Assignment, TargetAddress};
use pixagent_core::port::ReceiveError;

use crate::image_sink::ImageSink;

/// How the address token is delimited on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressFraming {
    /// One read of up to 1024 bytes is the whole token. A token split over
    /// two reads, or image bytes coalesced into the first read, are not
    /// detected.
    #[default]
    SingleRead,
    /// Token ends at `\n` (a trailing `\r` is stripped), at most 1024 bytes.
    /// Requires a server that terminates the token.
    Line,
}

/// Receive one assignment from `reader` and store its image at `image_path`
///
/// Reads until EOF. On error the previous image file is left untouched.
pub async fn receive_assignment<R>(
    reader: &mut R,
    framing: AddressFraming,
    image_path: &Path,
) -> Result<Assignment, ReceiveError>
where
    R: AsyncRead + Unpin,
{
    let (target, image_bytes) = match framing {
        AddressFraming::SingleRead => {
            let target = read_single(reader).await?;
            (target, store_image(reader, image_path).await?)
        }
        AddressFraming::Line => {
            let mut buffered = BufReader::with_capacity(IMAGE_CHUNK_SIZE, reader);
            let target = read_line(&mut buffered).await?;
            (target, store_image(&mut buffered, image_path).await?)
        }
    };

    debug!(
        target_address = %target,
        image_bytes = %image_bytes,
        framing = ?framing,
        "Assignment read complete"
    );
    Ok(Assignment::new(target, image_path, image_bytes))
}

async fn read_single<R>(reader: &mut R) -> Result<TargetAddress, ReceiveError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; ADDRESS_READ_BUFFER_SIZE];
    let n = reader.read(&mut buf).await.map_err(ReceiveError::Transport)?;
    if n == 0 {
        return Err(ReceiveError::ClosedBeforeAddress);
    }

    let token = String::from_utf8(buf[..n].to_vec())?;
    Ok(TargetAddress::new(token))
}

async fn read_line<R>(reader: &mut BufReader<R>) -> Result<TargetAddress, ReceiveError>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let n = (&mut *reader)
        .take(ADDRESS_READ_BUFFER_SIZE as u64)
        .read_until(b'\n', &mut line)
        .await
        .map_err(ReceiveError::Transport)?;
    if n == 0 {
        return Err(ReceiveError::ClosedBeforeAddress);
    }
    if line.last() != Some(&b'\n') {
        return Err(ReceiveError::Unterminated {
            limit: ADDRESS_READ_BUFFER_SIZE,
        });
    }

    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(TargetAddress::new(String::from_utf8(line)?))
}

async fn store_image<R>(reader: &mut R, image_path: &Path) -> Result<u64, ReceiveError>
where
    R: AsyncRead + Unpin,
{
    let mut sink = ImageSink::create(image_path)
        .await
        .map_err(ReceiveError::Storage)?;
    let mut chunk = vec![0u8; IMAGE_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                sink.discard().await;
                return Err(ReceiveError::Transport(e));
            }
        };
        if let Err(e) = sink.write_chunk(&chunk[..n]).await {
            sink.discard().await;
            return Err(ReceiveError::Storage(e));
        }
    }

    sink.commit().await.map_err(ReceiveError::Storage)
}
