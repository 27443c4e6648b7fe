//! Per-identity sliding-window rate limiting.
//!
//! Each caller identity gets its own counter file holding the timestamps of
//! its recent requests. Concurrent requests from the same identity must not
//! race the read-check-append-write sequence, so the file is held under an
//! exclusive advisory lock for the whole sequence. Every failure mode (the
//! directory cannot be created, the lock cannot be acquired, the file does
//! not parse) fails open and allows the request.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

pub struct RateLimiter {
    dir: PathBuf,
    window_sec: u64,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(dir: PathBuf, window_sec: u64, max_requests: u32) -> Self {
        Self {
            dir,
            window_sec,
            max_requests,
        }
    }

    /// Returns `true` when the request may proceed
    pub fn check(&self, identity: &str) -> bool {
        if self.max_requests == 0 {
            return true; // disabled
        }
        match self.check_locked(identity) {
            Ok(allowed) => allowed,
            Err(e) => {
                debug!(error = %e, identity, "Rate limit check failed open");
                true
            }
        }
    }

    fn check_locked(&self, identity: &str) -> std::io::Result<bool> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("rate_{}.json", sanitize(identity)));
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        lock_exclusive(&file)?;
        let result = self.read_check_append(&mut file, identity);
        unlock(&file);
        result
    }

    fn read_check_append(
        &self,
        file: &mut std::fs::File,
        identity: &str,
    ) -> std::io::Result<bool> {
        let mut raw = String::new();
        file.read_to_string(&mut raw)?;

        let now = chrono::Utc::now().timestamp();
        let cutoff = now - self.window_sec as i64;
        let mut stamps: Vec<i64> = serde_json::from_str(&raw).unwrap_or_default();
        stamps.retain(|t| *t > cutoff);

        if stamps.len() >= self.max_requests as usize {
            warn!(
                identity,
                count = stamps.len(),
                window_sec = self.window_sec,
                "Rate limited"
            );
            return Ok(false);
        }

        stamps.push(now);
        let serialized = serde_json::to_string(&stamps).unwrap_or_else(|_| "[]".to_string());
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        Ok(true)
    }
}

fn sanitize(identity: &str) -> String {
    identity
        .chars()
        .take(64)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == ':' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(unix)]
fn lock_exclusive(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(unix)]
fn unlock(file: &std::fs::File) {
    use std::os::unix::io::AsRawFd;

    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &std::fs::File) {}
