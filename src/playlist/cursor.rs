// SPDX-License-Identifier: MIT
//! Playlist cursor: a file-backed integer recording which playlist entry is
//! currently shown.
//!
//! Persisted independently of the config document so it survives scheduler
//! restarts. Reads always clamp to the current playlist length; a stale value
//! (entries were removed underneath it) is treated as 0, never as an error.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::warn;

/// File-backed cursor under `{data_dir}/run/playlist.cursor`.
pub struct Cursor {
    path: PathBuf,
}

impl Cursor {
    pub fn new(data_dir: &Path) -> std::io::Result<Self> {
        let run_dir = data_dir.join("run");
        std::fs::create_dir_all(&run_dir)?;
        Ok(Self {
            path: run_dir.join("playlist.cursor"),
        })
    }

    /// Raw stored value, 0 when missing or unparsable.
    pub fn read_raw(&self) -> usize {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Stored value clamped to `[0, playlist_len)`. A playlist that shrank
    /// below the stored index yields 0.
    pub fn read(&self, playlist_len: usize) -> usize {
        let raw = self.read_raw();
        if playlist_len == 0 || raw >= playlist_len {
            0
        } else {
            raw
        }
    }

    /// Persist a new cursor value via write-then-rename, matching the config
    /// store's discipline so a crashed writer never leaves a torn file.
    pub fn write(&self, value: usize) -> std::io::Result<()> {
        let tmp = self.path.with_extension("cursor.tmp");
        {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(value.to_string().as_bytes())?;
            f.flush()?;
        }
        std::fs::rename(&tmp, &self.path)
    }

    /// Advance to the next entry modulo `playlist_len` and persist. Returns
    /// the new value.
    pub fn advance(&self, playlist_len: usize) -> usize {
        if playlist_len == 0 {
            return 0;
        }
        let next = (self.read(playlist_len) + 1) % playlist_len;
        if let Err(e) = self.write(next) {
            warn!(err = %e, "failed to persist playlist cursor");
        }
        next
    }

    /// Reset to 0 (playlist enable) or remove entirely (playlist disable).
    pub fn reset(&self) {
        if let Err(e) = self.write(0) {
            warn!(err = %e, "failed to reset playlist cursor");
        }
    }

    pub fn clear(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
