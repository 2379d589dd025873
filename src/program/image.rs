//! LC-3 object image format.
//!
//! An image is a flat stream of big-endian 16-bit words:
//! - The first word is the origin (load address)
//! - Every following word is placed at consecutive addresses from it

use crate::cpu::memory::{Memory, MemoryError, MEMORY_SIZE};
use crate::program::disasm::hex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// A loaded object image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Address of the first word.
    pub origin: u16,
    /// The program words.
    pub words: Vec<u16>,
}

impl Image {
    pub fn new(origin: u16, words: Vec<u16>) -> Self {
        Self { origin, words }
    }

    /// Parse an image from raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < 2 {
            return Err(ImageError::MissingOrigin);
        }
        if bytes.len() % 2 != 0 {
            return Err(ImageError::OddLength(bytes.len()));
        }

        let mut words = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        // Length checked above, so the origin is there.
        let origin = words.next().unwrap_or_default();
        let words: Vec<u16> = words.collect();

        let available = MEMORY_SIZE - origin as usize;
        if words.len() > available {
            return Err(ImageError::TooLarge {
                origin,
                size: words.len(),
                available,
            });
        }

        Ok(Self { origin, words })
    }

    /// Serialize back to the on-disk format.
    pub fn to_bytes(&self) -> Vec<u8> {
        std::iter::once(self.origin)
            .chain(self.words.iter().copied())
            .flat_map(u16::to_be_bytes)
            .collect()
    }

    /// Number of program words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if the image carries no words past its origin.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Copy the image into memory at its origin.
    pub fn load_into(&self, mem: &mut Memory) -> Result<(), MemoryError> {
        mem.load(self.origin, &self.words)
    }
}

/// Load an image file from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Image, ImageError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let image = Image::parse(&bytes)?;
    debug!(
        path = %path.display(),
        origin = %hex(image.origin),
        words = image.len(),
        "loaded image"
    );
    Ok(image)
}

/// Errors that can occur while reading an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image is too short to hold an origin word")]
    MissingOrigin,

    #[error("image has an odd number of bytes ({0})")]
    OddLength(usize),

    #[error("image of {size} words at x{origin:04X} exceeds available space {available}")]
    TooLarge { origin: u16, size: usize, available: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_big_endian() {
        let image = Image::parse(&[0x30, 0x00, 0xF0, 0x25, 0x12, 0x34]).unwrap();
        assert_eq!(image.origin, 0x3000);
        assert_eq!(image.words, vec![0xF025, 0x1234]);
        assert_eq!(image.len(), 2);
    }

    #[test]
    fn test_origin_only_is_empty() {
        let image = Image::parse(&[0x40, 0x00]).unwrap();
        assert_eq!(image.origin, 0x4000);
        assert!(image.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Image::parse(&[]), Err(ImageError::MissingOrigin)));
        assert!(matches!(Image::parse(&[0x30]), Err(ImageError::MissingOrigin)));
        assert!(matches!(Image::parse(&[0x30, 0x00, 0x01]), Err(ImageError::OddLength(3))));
        assert!(matches!(
            Image::parse(&[0xFF, 0xFF, 0x00, 0x01, 0x00, 0x02]),
            Err(ImageError::TooLarge { origin: 0xFFFF, size: 2, available: 1 })
        ));
    }

    #[test]
    fn test_to_bytes_matches_file_layout() {
        let image = Image::new(0x3000, vec![0xE002, 0xF022]);
        assert_eq!(image.to_bytes(), vec![0x30, 0x00, 0xE0, 0x02, 0xF0, 0x22]);
    }

    #[test]
    fn test_load_into_memory() {
        let image = Image::new(0x3000, vec![1, 2]);
        let mut mem = Memory::new();
        image.load_into(&mut mem).unwrap();
        assert_eq!(mem.peek(0x3000), 1);
        assert_eq!(mem.peek(0x3001), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_image("/nonexistent/program.obj").unwrap_err();
        assert!(matches!(err, ImageError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/program.obj"));
    }
}
