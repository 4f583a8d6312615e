use std::path::{Path, PathBuf};

use clap::Args;

use common::sharing::SharingError;

use crate::session::{Session, SessionError};

/// Download, decrypt and verify a file shared with you
#[derive(Args, Debug, Clone)]
pub struct Fetch {
    /// Id of the shared file, as listed by `vault inbox`
    pub file_id: String,

    /// Destination file (default: the downloads directory)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Save the file even if its signature does not verify
    #[arg(long)]
    pub keep_tampered: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Sharing(#[from] SharingError),
    #[error("{0} failed verification and was not saved (use --keep-tampered to save it anyway)")]
    Tampered(String),
    #[error("failed to save {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `dir/name`, or `dir/stem (n).ext` for the first n that is free
pub(crate) fn free_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1;
    loop {
        let candidate = dir.join(format!("{} ({}){}", stem, n, extension));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[async_trait::async_trait]
impl crate::op::Op for Fetch {
    type Error = FetchError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = Session::open(ctx.config_path.clone()).await?;
        let record = session.coordinator.find_incoming(&self.file_id).await?;
        let file = session.coordinator.receive(&record).await?;

        if !file.is_authentic() && !self.keep_tampered {
            return Err(FetchError::Tampered(record.name));
        }

        let dest = match &self.out {
            Some(out) => out.clone(),
            None => {
                let dir = session.state.downloads_dir();
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|source| FetchError::Write {
                        path: dir.clone(),
                        source,
                    })?;
                free_path(&dir, &record.safe_file_name())
            }
        };

        tokio::fs::write(&dest, &file.plaintext)
            .await
            .map_err(|source| FetchError::Write {
                path: dest.clone(),
                source,
            })?;

        let mut output = format!(
            "Saved {} from {} to {}",
            record.name,
            record.author_name,
            dest.display()
        );
        if !file.is_authentic() {
            output.push_str("\nWARNING: signature did not verify, the content may have been altered");
        }
        Ok(output)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_free_path() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(free_path(dir.path(), "a.csv"), dir.path().join("a.csv"));

        std::fs::write(dir.path().join("a.csv"), b"x").unwrap();
        assert_eq!(free_path(dir.path(), "a.csv"), dir.path().join("a (1).csv"));

        std::fs::write(dir.path().join("a (1).csv"), b"x").unwrap();
        assert_eq!(free_path(dir.path(), "a.csv"), dir.path().join("a (2).csv"));

        std::fs::write(dir.path().join("notes"), b"x").unwrap();
        assert_eq!(free_path(dir.path(), "notes"), dir.path().join("notes (1)"));
    }
}
