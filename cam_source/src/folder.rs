//! Replay of still images from a directory.
//!
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;
use simple_error::simple_error;

use crate::FrameSource;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Frame source yielding the images of a directory in lexical order.
pub struct ImageFolder {
    files: Vec<PathBuf>,
    position: usize,
    looping: bool,
}

impl ImageFolder {
    /// List the images in `dir`.
    ///
    /// With `looping`, the source starts over after the last image instead of ending.
    pub fn open(dir: impl AsRef<Path>, looping: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to read image directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(simple_error!("No images found in {}", dir.display()).into());
        }
        log::info!("Replaying {} images from {}", files.len(), dir.display());

        Ok(Self {
            files,
            position: 0,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageFolder {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.position == self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.position = 0;
        }

        let path = &self.files[self.position];
        self.position += 1;
        log::debug!("Reading {}", path.display());

        let frame = image::open(path)
            .with_context(|| format!("failed to read {}", path.display()))?
            .to_rgb8();
        Ok(Some(frame))
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
