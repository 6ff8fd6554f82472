//! Store of trained model artifacts.
use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

/// A flat directory of model artifacts, addressed by algorithm name and
/// timestamp.
///
/// Artifacts are directories named `<name><timestamp>`, where the
/// timestamp is the fixed-width (13-digit, zero-padded) number of
/// milliseconds since the Unix epoch. The fixed width makes lexicographic
/// order over artifact stems equal to creation order, which is what
/// [`ArtifactStore::latest`] relies on.
///
/// Writes are append-only and the store is single-writer, so no locking
/// is needed.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens the store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a fresh artifact directory for the given algorithm name,
    /// stamped with the current wall-clock time.
    pub fn create(&self, name: &str) -> Result<PathBuf> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis();
        self.create_at(name, millis)
    }

    fn create_at(&self, name: &str, millis: u128) -> Result<PathBuf> {
        let path = self.root.join(format!("{}{:013}", name, millis));
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create artifact directory {:?}", path))?;
        Ok(path)
    }

    /// Returns the most recent artifact for the given algorithm name:
    /// the lexicographically greatest stem with the name as prefix and a
    /// purely numeric suffix.
    pub fn latest(&self, name: &str) -> Result<PathBuf> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read the artifact store at {:?}", self.root))?;

        let mut best: Option<String> = None;
        for entry in entries {
            let entry = entry?;
            let stem = match entry.file_name().into_string() {
                Ok(stem) => stem,
                Err(_) => continue,
            };
            match stem.strip_prefix(name) {
                Some(suffix)
                    if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) =>
                {
                    if best.as_ref().map_or(true, |b| stem > *b) {
                        best = Some(stem);
                    }
                }
                _ => continue,
            }
        }

        match best {
            Some(stem) => Ok(self.root.join(stem)),
            None => bail!("No saved model for {:?} in {:?}", name, self.root),
        }
    }

    /// Returns the checkpoint directory of the given algorithm name.
    pub fn checkpoint_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn latest_picks_the_greatest_stem() -> Result<()> {
        let dir = TempDir::new("artifacts")?;
        let store = ArtifactStore::new(dir.path());

        store.create_at("ppo", 100)?;
        store.create_at("ppo", 200)?;
        store.create_at("sac", 300)?;

        let latest = store.latest("ppo")?;
        assert_eq!(latest.file_name().unwrap(), "ppo0000000000200");
        Ok(())
    }

    #[test]
    fn new_artifacts_sort_after_older_ones() -> Result<()> {
        let dir = TempDir::new("artifacts")?;
        let store = ArtifactStore::new(dir.path());

        let old = store.create_at("td3", 999)?;
        let new = store.create("td3")?;
        assert!(
            new.file_name().unwrap().to_str().unwrap() > old.file_name().unwrap().to_str().unwrap()
        );
        assert_eq!(store.latest("td3")?, new);
        Ok(())
    }

    #[test]
    fn prefixes_do_not_cross_algorithms() -> Result<()> {
        let dir = TempDir::new("artifacts")?;
        let store = ArtifactStore::new(dir.path());

        store.create_at("ddpg", 500)?;
        assert!(store.latest("dqn").is_err());
        assert!(store.latest("ddpg").is_ok());
        Ok(())
    }

    #[test]
    fn checkpoint_directories_are_ignored() -> Result<()> {
        let dir = TempDir::new("artifacts")?;
        let store = ArtifactStore::new(dir.path());

        // The checkpoint subdirectory shares the algorithm name but has
        // no timestamp suffix.
        std::fs::create_dir_all(store.checkpoint_dir("ddpg"))?;
        assert!(store.latest("ddpg").is_err());

        store.create_at("ddpg", 42)?;
        assert_eq!(
            store.latest("ddpg")?.file_name().unwrap(),
            "ddpg0000000000042"
        );
        Ok(())
    }

    #[test]
    fn empty_store_yields_an_error() {
        let dir = TempDir::new("artifacts").unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(store.latest("dqn").is_err());
    }
}
