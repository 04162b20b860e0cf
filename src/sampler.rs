//! Uniform random choice of an unlabeled image.
//!
//! The image root is listed fresh on every call; nothing is cached, since
//! images leave the listing as soon as they are moved into `marked/`. Two
//! clients can be handed the same image if both ask before either submits.

use std::sync::Arc;

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::models::ImageName;
use crate::paths::ResolvedPaths;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SampleError {
    /// The directory is empty, fully marked, or could not be read.
    #[error("no unlabeled images available")]
    NoSamples,
}

#[derive(Debug, Clone)]
pub struct RandomSampler {
    paths: Arc<ResolvedPaths>,
}

impl RandomSampler {
    pub fn new(paths: Arc<ResolvedPaths>) -> Self {
        Self { paths }
    }

    /// Regular files directly under the image root, sorted by name. The
    /// sample log is left out when it lives in the root.
    pub fn list_unlabeled(&self) -> std::io::Result<Vec<ImageName>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.paths.image_root)? {
            let entry = entry?;
            if entry.path() == self.paths.output_file {
                continue;
            }
            // follows symlinks; a dangling link is skipped
            let is_file = std::fs::metadata(entry.path())
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }

            let file_name = entry.file_name();
            let Some(raw) = file_name.to_str() else {
                debug!(entry = ?file_name, "skipping non-UTF-8 file name");
                continue;
            };
            match ImageName::parse(raw) {
                Ok(name) => names.push(name),
                Err(e) => debug!(entry = raw, error = %e, "skipping file that cannot be labeled"),
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn pick_random(&self) -> Result<ImageName, SampleError> {
        self.pick_random_with(&mut rand::rng())
    }

    pub fn pick_random_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ImageName, SampleError> {
        let names = match self.list_unlabeled() {
            Ok(names) => names,
            Err(e) => {
                warn!(
                    root = %self.paths.image_root.display(),
                    error = %e,
                    "failed to list image directory"
                );
                return Err(SampleError::NoSamples);
            }
        };
        names.choose(rng).cloned().ok_or(SampleError::NoSamples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn setup(files: &[&str]) -> (TempDir, RandomSampler, Arc<ResolvedPaths>) {
        let tmp = TempDir::new().unwrap();
        for f in files {
            std::fs::write(tmp.path().join(f), b"img").unwrap();
        }
        let paths =
            Arc::new(ResolvedPaths::prepare(tmp.path(), &tmp.path().join("samples.txt")).unwrap());
        (tmp, RandomSampler::new(paths.clone()), paths)
    }

    #[test]
    fn test_empty_directory_has_no_samples() {
        let (_tmp, sampler, _paths) = setup(&[]);
        assert_eq!(sampler.pick_random(), Err(SampleError::NoSamples));
    }

    #[test]
    fn test_vanished_directory_has_no_samples() {
        let (tmp, sampler, paths) = setup(&["a.png"]);
        std::fs::remove_dir_all(&paths.image_root).unwrap();
        assert_eq!(sampler.pick_random(), Err(SampleError::NoSamples));
        drop(tmp);
    }

    #[test]
    fn test_listing_skips_marked_and_subdirectories() {
        let (tmp, sampler, paths) = setup(&["a.png", "b.jpg"]);
        std::fs::create_dir_all(tmp.path().join("other")).unwrap();
        std::fs::write(paths.marked_dir.join("done.png"), b"img").unwrap();

        std::fs::write(&paths.output_file, "marked/done.png 0\n").unwrap();

        let names: Vec<String> = sampler
            .list_unlabeled()
            .unwrap()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "b.jpg"]);
    }

    #[test]
    fn test_listing_skips_unrecordable_names() {
        let (_tmp, sampler, _paths) = setup(&["ok.png", "has space.png"]);
        let names = sampler.list_unlabeled().unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].as_str(), "ok.png");
    }

    #[test]
    fn test_fully_marked_directory_has_no_samples() {
        let (_tmp, sampler, paths) = setup(&["a.png"]);
        std::fs::rename(
            paths.image_root.join("a.png"),
            paths.marked_dir.join("a.png"),
        )
        .unwrap();
        assert_eq!(sampler.pick_random(), Err(SampleError::NoSamples));
    }

    #[test]
    fn test_pick_covers_every_image() {
        let (_tmp, sampler, _paths) = setup(&["a.png", "b.png", "c.png", "d.png"]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..400 {
            let name = sampler.pick_random_with(&mut rng).unwrap();
            *counts.entry(name.to_string()).or_default() += 1;
        }
        assert_eq!(counts.len(), 4);
        for (name, count) in counts {
            assert!(count > 50, "{} picked only {} times", name, count);
        }
    }

    #[test]
    fn test_pick_sees_directory_changes() {
        let (tmp, sampler, _paths) = setup(&["a.png"]);
        assert_eq!(sampler.pick_random().unwrap().as_str(), "a.png");

        std::fs::remove_file(tmp.path().join("a.png")).unwrap();
        std::fs::write(tmp.path().join("b.png"), b"img").unwrap();
        assert_eq!(sampler.pick_random().unwrap().as_str(), "b.png");
    }
}
