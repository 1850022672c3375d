use std::path::{Path, PathBuf};

/// If `path` already exceeds `max_bytes`, shifts `path.N` -> `path.N+1`
/// (highest suffix first, so nothing is overwritten) then renames `path`
/// itself to `path.1`, leaving a fresh empty file to be created by the
/// caller's next write.
pub async fn rotate_if_needed(path: &Path, max_bytes: u64) -> std::io::Result<()> {
    let size = match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };

    if size < max_bytes {
        return Ok(());
    }

    let mut suffix = 1u32;
    while tokio::fs::metadata(suffixed(path, suffix)).await.is_ok() {
        suffix += 1;
    }
    for n in (1..suffix).rev() {
        tokio::fs::rename(suffixed(path, n), suffixed(path, n + 1)).await?;
    }
    tokio::fs::rename(path, suffixed(path, 1)).await?;
    Ok(())
}

fn suffixed(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Lists rotated files (`path.N`, ..., `path.1`) oldest-first, i.e.
/// highest numeric suffix first, so callers can read a full history in
/// append order by concatenating these with the live file appended last.
pub async fn rotated_files_oldest_first(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut suffix = 1u32;
    let mut found = Vec::new();
    while tokio::fs::metadata(suffixed(path, suffix)).await.is_ok() {
        found.push(suffixed(path, suffix));
        suffix += 1;
    }
    found.reverse();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn rotates_into_incrementing_suffixes_without_data_loss() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.jsonl");

        tokio::fs::write(&path, b"first\n").await.unwrap();
        rotate_if_needed(&path, 1).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(suffixed(&path, 1)).await.unwrap(), "first\n");
        assert!(tokio::fs::metadata(&path).await.is_err());

        let mut file = tokio::fs::File::create(&path).await.unwrap();
        file.write_all(b"second\n").await.unwrap();
        drop(file);
        rotate_if_needed(&path, 1).await.unwrap();

        assert_eq!(tokio::fs::read_to_string(suffixed(&path, 2)).await.unwrap(), "first\n");
        assert_eq!(tokio::fs::read_to_string(suffixed(&path, 1)).await.unwrap(), "second\n");

        let files = rotated_files_oldest_first(&path).await.unwrap();
        assert_eq!(files, vec![suffixed(&path, 2), suffixed(&path, 1)]);
    }
}
