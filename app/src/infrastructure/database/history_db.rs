use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use domain::{HistoryRepository, JobRecord, JobUpdate};
use tokio::sync::RwLock;

/// Insertion-ordered job history persisted as one JSON file per store.
///
/// Writer exclusion is system-wide, not just in-process: every commit
/// holds an exclusive `flock` on a sidecar lock file, re-reads the db
/// file under that lock, mutates the fresh copy, persists it via
/// temp-file + rename, and only then publishes to memory. Concurrent
/// processes on the same file therefore serialize instead of erasing
/// each other's whole-file saves. The lock lives on a separate path
/// because the db file itself is replaced by the rename.
pub struct HistoryDb {
    path: PathBuf,
    lock_path: PathBuf,
    records: RwLock<Vec<JobRecord>>,
}

/// Advisory `flock` held for the lifetime of the value; the fd close on
/// drop releases it.
struct FileLock(#[allow(dead_code)] File);

impl FileLock {
    fn acquire(path: &Path, exclusive: bool) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)?;
        let operation = match exclusive {
            true => libc::LOCK_EX,
            false => libc::LOCK_SH,
        };
        match unsafe { libc::flock(file.as_raw_fd(), operation) } {
            0 => Ok(Self(file)),
            _ => Err(io::Error::last_os_error()),
        }
    }
}

impl HistoryDb {
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let lock_path = path.with_extension("lock");
        let records = {
            let _lock = FileLock::acquire(&lock_path, false)?;
            Self::load(&path).await?
        };
        Ok(Self {
            path,
            lock_path,
            records: RwLock::new(records),
        })
    }

    async fn load(path: &Path) -> anyhow::Result<Vec<JobRecord>> {
        match path.exists() && path.is_file() {
            true => Ok(serde_json::from_slice(&tokio::fs::read(path).await?)?),
            false => Ok(vec![]),
        }
    }

    async fn persist(path: &Path, records: &[JobRecord]) -> anyhow::Result<()> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(records)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn commit<F>(&self, mutate: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Vec<JobRecord>),
    {
        let mut guard = self.records.write().await;
        let _lock = FileLock::acquire(&self.lock_path, true)?;
        // the file may have moved on since our last read; it is the
        // source of truth, the guard only caches it
        let mut working = Self::load(&self.path).await?;
        mutate(&mut working);
        Self::persist(&self.path, &working).await?;
        *guard = working;
        Ok(())
    }
}

#[async_trait::async_trait]
impl HistoryRepository for HistoryDb {
    async fn put_many(&self, records: Vec<JobRecord>) -> anyhow::Result<()> {
        self.commit(|all| {
            for record in records {
                match all.iter_mut().find(|r| r.id == record.id) {
                    Some(existing) => *existing = record,
                    None => all.push(record),
                }
            }
        })
        .await
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<JobRecord>> {
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn merge(&self, id: &str, update: JobUpdate) -> anyhow::Result<bool> {
        let mut found = false;
        self.commit(|all| {
            if let Some(record) = all.iter_mut().find(|r| r.id == id) {
                record.apply(&update);
                found = true;
            }
        })
        .await?;
        Ok(found)
    }

    async fn merge_many(&self, updates: Vec<(String, JobUpdate)>) -> anyhow::Result<()> {
        self.commit(|all| {
            for (id, update) in updates {
                if let Some(record) = all.iter_mut().find(|r| r.id == id) {
                    record.apply(&update);
                }
            }
        })
        .await
    }

    async fn delete(&self, ids: &[String]) -> anyhow::Result<()> {
        self.commit(|all| all.retain(|r| !ids.contains(&r.id))).await
    }

    async fn size(&self) -> anyhow::Result<usize> {
        Ok(self.records.read().await.len())
    }

    async fn ids_reverse_chronological(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.records.read().await.iter().rev().map(|r| r.id.clone()).collect())
    }
}
