//! File discovery and extension classification.

use anyhow::Result;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::IndexerConfig;
use crate::db::AssetKind;

/// Classify a path by extension. Non-media extensions return `None` and
/// are invisible to the catalog.
pub fn classify(path: &Path, config: &IndexerConfig) -> Option<AssetKind> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    if config
        .image_extensions
        .iter()
        .any(|e| e.eq_ignore_ascii_case(&ext))
    {
        return Some(AssetKind::Image);
    }
    if config
        .video_extensions
        .iter()
        .any(|e| e.eq_ignore_ascii_case(&ext))
    {
        return Some(AssetKind::Video);
    }
    None
}

/// Hidden check over root-relative components: dotfiles and anything
/// under a dot-directory are skipped.
pub fn is_hidden(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Recursively collect qualifying media files under a root, dotfiles
/// excluded, sorted by path for consistent ordering.
pub fn collect_media(root: &Path, config: &IndexerConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && classify(path, config).is_some() {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_classify() {
        let config = IndexerConfig::default();
        assert_eq!(
            classify(Path::new("a/b.PNG"), &config),
            Some(AssetKind::Image)
        );
        assert_eq!(
            classify(Path::new("clip.mp4"), &config),
            Some(AssetKind::Video)
        );
        assert_eq!(classify(Path::new("notes.txt"), &config), None);
        assert_eq!(classify(Path::new("noext"), &config), None);
    }

    #[test]
    fn test_collect_media_skips_non_media_and_hidden() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("one.jpg")).unwrap();
        File::create(dir.path().join("two.png")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        File::create(dir.path().join(".hidden.png")).unwrap();
        fs::create_dir(dir.path().join(".cache")).unwrap();
        File::create(dir.path().join(".cache/cached.png")).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("sub/three.mp4")).unwrap();

        let config = IndexerConfig::default();
        let files = collect_media(&dir.path().to_path_buf(), &config).unwrap();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(Path::new(".DS_Store")));
        assert!(is_hidden(Path::new(".cache/a.png")));
        assert!(!is_hidden(Path::new("shots/a.png")));
    }
}
