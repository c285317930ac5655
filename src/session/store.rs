//! 会话文件存储：每个会话一个 `<id>.json`
//!
//! 写入先落临时文件并 fsync，再 rename 覆盖，崩溃时磁盘上只会有旧版本或新版本。
//! 每次写入使用独立的临时文件名，写入、fsync 与 rename 在同一个阻塞任务内完成。

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::core::AgentError;
use crate::session::TaskSession;

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// 调用方放弃等待时阻塞任务仍会完成，不会留下写了一半的文件
    pub async fn save(&self, session: &TaskSession) -> Result<(), AgentError> {
        let bytes = serde_json::to_vec_pretty(session)?;
        let dir = self.dir.clone();
        let path = self.path_for(&session.id);
        let tmp = self
            .dir
            .join(format!(".{}.{}.json.tmp", session.id, Uuid::new_v4().simple()));
        tokio::task::spawn_blocking(move || write_atomically(&dir, &tmp, &path, &bytes))
            .await
            .map_err(|e| AgentError::Persistence(format!("write task failed: {e}")))??;
        Ok(())
    }

    /// 不存在时返回 Ok(None)
    pub async fn load(&self, id: &str) -> Result<Option<TaskSession>, AgentError> {
        if id.is_empty() || id.contains(['/', '\\', '.']) {
            return Ok(None);
        }
        match fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 读取全部会话；无法解析的文件跳过并告警
    pub async fn list(&self) -> Result<Vec<TaskSession>, AgentError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_json = path.extension().is_some_and(|ext| ext == "json");
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if !is_json || hidden {
                continue;
            }
            match fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<TaskSession>(&bytes) {
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session file")
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session file")
                }
            }
        }
        Ok(sessions)
    }
}

fn write_atomically(dir: &Path, tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let written = std::fs::File::create(tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    match written.and_then(|()| std::fs::rename(tmp, path)) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(tmp);
            Err(e)
        }
    }
}
