//! Known-identity gallery: directory scan, embedding index, and ranking.

use crate::types::{Embedding, MatchRow, Region};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory not found: {0}")]
    NotFound(PathBuf),
    #[error("gallery path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// One reference face from the gallery.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub identity: String,
    /// Face region inside the gallery image.
    pub region: Region,
    pub embedding: Embedding,
}

/// In-memory embedding index over one gallery directory.
#[derive(Debug, Default)]
pub struct GalleryIndex {
    entries: Vec<GalleryEntry>,
}

impl GalleryIndex {
    /// Embed every image under `dir`.
    ///
    /// `embed` returns the reference face of one image, or `None` when the
    /// image yields no usable face. Images that fail to embed are skipped.
    pub fn build<F, E>(dir: &Path, mut embed: F) -> Result<Self, GalleryError>
    where
        F: FnMut(&Path) -> Result<Option<(Region, Embedding)>, E>,
        E: Display,
    {
        let paths = scan(dir)?;
        let mut entries = Vec::with_capacity(paths.len());

        for path in &paths {
            match embed(path) {
                Ok(Some((region, embedding))) => entries.push(GalleryEntry {
                    identity: path.display().to_string(),
                    region,
                    embedding,
                }),
                Ok(None) => {
                    tracing::warn!(path = %path.display(), "gallery image has no usable face; skipping")
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to embed gallery image; skipping")
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            images = paths.len(),
            identities = entries.len(),
            "gallery indexed"
        );

        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank gallery entries against a query embedding, keeping rows with
    /// `distance <= threshold`, closest first.
    pub fn rank(&self, query: &Embedding, source: &Region, threshold: f32) -> Vec<MatchRow> {
        let mut rows: Vec<MatchRow> = self
            .entries
            .iter()
            .map(|entry| (entry, query.cosine_distance(&entry.embedding)))
            .filter(|&(_, distance)| distance <= threshold)
            .map(|(entry, distance)| MatchRow {
                identity: entry.identity.clone(),
                target_x: entry.region.x,
                target_y: entry.region.y,
                target_w: entry.region.w,
                target_h: entry.region.h,
                source_x: source.x,
                source_y: source.y,
                source_w: source.w,
                source_h: source.h,
                threshold,
                distance,
            })
            .collect();

        rows.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows
    }
}

/// Recursively list gallery images under `dir`, sorted by path.
///
/// Symlinks are followed; loops and unreadable entries are logged and
/// skipped. Only a missing or non-directory root is an error.
pub fn scan(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    if !dir.exists() {
        return Err(GalleryError::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(GalleryError::NotADirectory(dir.to_path_buf()));
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable gallery entry; skipping");
                continue;
            }
        };
        if entry.file_type().is_file() && is_image(entry.path()) {
            found.push(entry.into_path());
        }
    }

    found.sort();
    Ok(found)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}
