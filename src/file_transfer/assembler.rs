use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{Packet, PacketKind};
use crate::utils;

/// Receiver-side bookkeeping for one file transfer on one connection
#[derive(Debug, Clone)]
pub struct TransferState {
    pub file_name: String,
    pub max_part: u32,
    /// Parts persisted so far, kept in numeric order
    pub parts_seen: BTreeSet<u32>,
}

/// Path of the temporary artifact holding one received part.
///
/// Keyed only by file name and part, so two concurrent transfers of the same name
/// into one download directory overwrite each other's parts.
pub fn part_path(download_dir: &Path, file_name: &str, part: u32) -> PathBuf {
    download_dir.join(format!("{file_name}_part({part}).tmp"))
}

fn staging_path(download_dir: &Path, file_name: &str) -> PathBuf {
    download_dir.join(format!("{file_name}.partial"))
}

/// Rebuilds a file from the packets of one transfer.
///
/// Each part is persisted to its own artifact as it arrives. `finish` concatenates
/// the artifacts in numeric part order into a staging file, removes them and
/// renames the staging file over the final path.
///
/// Known hazard: assemblers sharing a download directory are not coordinated, and
/// concurrent transfers with the same file name race on the same part artifacts.
pub struct FileAssembler {
    download_dir: PathBuf,
    state: Option<TransferState>,
}

impl FileAssembler {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            state: None,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn state(&self) -> Option<&TransferState> {
        self.state.as_ref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.file_name.as_str())
    }

    /// True once every part `1..=max_part` has been persisted
    pub fn is_complete(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.parts_seen.len() == s.max_part as usize)
    }

    /// Record the header or persist a data part
    pub async fn accept(&mut self, packet: &Packet) -> Result<()> {
        if packet.kind != PacketKind::File {
            return Err(Error::protocol(format!(
                "expected a file packet, got {:?}",
                packet.kind
            )));
        }

        if packet.part == 0 {
            return self.accept_header(packet);
        }

        let state = self.state.as_mut().ok_or_else(|| {
            Error::protocol(format!("part {} arrived before the file name", packet.part))
        })?;
        if packet.max_part != state.max_part {
            return Err(Error::protocol(format!(
                "max part changed from {} to {} mid-transfer",
                state.max_part, packet.max_part
            )));
        }

        // Repeated parts overwrite the earlier artifact
        let path = part_path(&self.download_dir, &state.file_name, packet.part);
        let mut file = File::create(&path).await?;
        file.write_all(&packet.payload).await?;
        file.flush().await?;

        state.parts_seen.insert(packet.part);
        debug!(
            "Stored part {}/{} of {} ({} bytes)",
            packet.part,
            state.max_part,
            state.file_name,
            packet.payload.len()
        );
        Ok(())
    }

    fn accept_header(&mut self, packet: &Packet) -> Result<()> {
        if let Some(state) = &self.state {
            return Err(Error::protocol(format!(
                "second file header while receiving {}",
                state.file_name
            )));
        }

        let file_name = sanitize_file_name(&packet.payload)?;
        debug!("Receiving {} in {} parts", file_name, packet.max_part);
        self.state = Some(TransferState {
            file_name,
            max_part: packet.max_part,
            parts_seen: BTreeSet::new(),
        });
        Ok(())
    }

    /// Concatenate all parts into the final file and return its path.
    ///
    /// A gap in `1..=max_part` fails the transfer with `MissingPart` and removes
    /// the artifacts that were written.
    pub async fn finish(&mut self) -> Result<PathBuf> {
        let state = self
            .state
            .clone()
            .ok_or_else(|| Error::protocol("transfer ended before the file name arrived"))?;

        if let Some(missing) = (1..=state.max_part).find(|p| !state.parts_seen.contains(p)) {
            self.discard().await;
            return Err(Error::MissingPart {
                file_name: state.file_name,
                part: missing,
                max_part: state.max_part,
            });
        }

        let staging = staging_path(&self.download_dir, &state.file_name);
        if let Err(e) = self.concatenate(&state, &staging).await {
            remove_staging(&staging).await;
            self.discard().await;
            return Err(e);
        }

        let target = self.download_dir.join(&state.file_name);
        // Parts are already gone once concatenation succeeded
        self.state = None;
        if let Err(e) = fs::rename(&staging, &target).await {
            remove_staging(&staging).await;
            return Err(e.into());
        }
        Ok(target)
    }

    async fn concatenate(&self, state: &TransferState, staging: &Path) -> Result<()> {
        let mut out = File::create(staging).await?;
        // BTreeSet iteration is numeric: 1, 2, ..., 10, 11
        for &part in &state.parts_seen {
            let path = part_path(&self.download_dir, &state.file_name, part);
            let bytes = fs::read(&path).await?;
            out.write_all(&bytes).await?;
            fs::remove_file(&path).await?;
        }
        out.flush().await?;
        out.sync_all().await?;
        Ok(())
    }

    /// Remove every part artifact written for the current transfer
    pub async fn discard(&mut self) {
        let Some(state) = self.state.take() else { return };
        for part in state.parts_seen {
            let path = part_path(&self.download_dir, &state.file_name, part);
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

async fn remove_staging(staging: &Path) {
    if let Err(e) = fs::remove_file(staging).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", staging.display(), e);
        }
    }
}

/// Reduce a peer-supplied name to a bare file name inside the download directory
fn sanitize_file_name(raw: &[u8]) -> Result<String> {
    let text = String::from_utf8_lossy(raw);
    let name = utils::file_name_of(Path::new(text.as_ref()))
        .ok_or_else(|| Error::protocol(format!("unusable file name {text:?}")))?;
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::protocol(format!("unusable file name {text:?}")));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_file_name(b"report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_file_name(b"../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name(b"/tmp/x/notes.txt").unwrap(), "notes.txt");
        assert!(sanitize_file_name(b"").is_err());
        assert!(sanitize_file_name(b"..").is_err());
    }

    #[test]
    fn test_part_path_format() {
        let path = part_path(Path::new("/downloads"), "movie.mkv", 11);
        assert_eq!(path, PathBuf::from("/downloads/movie.mkv_part(11).tmp"));
    }

    #[tokio::test]
    async fn test_part_before_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut assembler = FileAssembler::new(dir.path());
        let result = assembler
            .accept(&Packet::new(PacketKind::File, 1, 2, b"x".to_vec()))
            .await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_changed_max_part_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut assembler = FileAssembler::new(dir.path());
        assembler
            .accept(&Packet::file_header("a.txt", 2))
            .await
            .unwrap();
        let result = assembler
            .accept(&Packet::new(PacketKind::File, 1, 3, b"x".to_vec()))
            .await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_repeated_part_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut assembler = FileAssembler::new(dir.path());
        assembler.accept(&Packet::file_header("a.txt", 1)).await.unwrap();
        assembler
            .accept(&Packet::new(PacketKind::File, 1, 1, b"first".to_vec()))
            .await
            .unwrap();
        assembler
            .accept(&Packet::new(PacketKind::File, 1, 1, b"second".to_vec()))
            .await
            .unwrap();

        let path = assembler.finish().await.unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_failed_rename_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory in the way makes the final rename fail
        let blocker = dir.path().join("blocked.txt");
        fs::create_dir(&blocker).await.unwrap();
        fs::write(blocker.join("keep"), b"x").await.unwrap();

        let mut assembler = FileAssembler::new(dir.path());
        assembler
            .accept(&Packet::file_header("blocked.txt", 1))
            .await
            .unwrap();
        assembler
            .accept(&Packet::new(PacketKind::File, 1, 1, b"data".to_vec()))
            .await
            .unwrap();

        assert!(matches!(assembler.finish().await, Err(Error::Io(_))));
        assert!(assembler.state().is_none());
        assert!(!staging_path(dir.path(), "blocked.txt").exists());
        assert!(!part_path(dir.path(), "blocked.txt", 1).exists());
        assert!(blocker.join("keep").exists());
    }
}
