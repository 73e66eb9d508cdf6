//! Transient on-disk copy of an uploaded screenshot.
//!
//! The copy is removed when the `ScratchImage` is dropped, whichever way the
//! generation that needed it ends.

use std::{
    io::{self, Write},
    path::Path,
};

use tempfile::NamedTempFile;

use crate::{config::SCRATCH_PREFIX, preferences::UploadedImage, request::ImageAttachment};

pub struct ScratchImage {
    file: NamedTempFile,
    mime: &'static str,
}

impl ScratchImage {
    /// Write the image under a unique name, in `dir` or the system temp directory.
    pub fn stage(image: &UploadedImage, dir: Option<&Path>) -> io::Result<Self> {
        let suffix = format!(".{}", image.format().extension());
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX).suffix(&suffix);
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(image.bytes())?;
        file.flush()?;
        log::debug!(
            "Staged {} ({} bytes) at {}",
            image.file_name(),
            image.bytes().len(),
            file.path().display()
        );
        Ok(Self {
            file,
            mime: image.format().mime(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn attachment(&self) -> ImageAttachment {
        ImageAttachment {
            path: self.path().to_path_buf(),
            mime: self.mime,
        }
    }
}
