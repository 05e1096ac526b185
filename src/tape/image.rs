//! `CTDT` tape images
//!
//! Layout: the magic `"CTDT"`, one byte holding `size >> 16`, a 27-byte
//! NUL-padded label, then `size` bytes of DFPWM data.

use crate::{Result, SoundError};
use std::path::Path;

/// File magic
pub const MAGIC: &[u8; 4] = b"CTDT";
/// Label field width in bytes
pub const LABEL_LEN: usize = 27;
/// Bytes before the tape data
pub const HEADER_LEN: usize = MAGIC.len() + 1 + LABEL_LEN;

/// Tape contents and label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeImage {
    label: [u8; LABEL_LEN],
    data: Vec<u8>,
}

impl TapeImage {
    /// Blank tape of `size` bytes with an empty label
    pub fn new(size: usize) -> Self {
        TapeImage {
            label: [0; LABEL_LEN],
            data: vec![0; size],
        }
    }

    /// Parse an image from its file contents
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
            return Err(SoundError::Format(
                "Specified file is not a valid tape image.".into(),
            ));
        }
        if bytes.len() < HEADER_LEN {
            return Err(SoundError::Format("Tape image header is truncated".into()));
        }

        let size = (bytes[MAGIC.len()] as usize) << 16;
        let body = &bytes[HEADER_LEN..];
        if body.len() < size {
            return Err(SoundError::Format(format!(
                "Tape image is truncated: expected {} bytes of data, found {}",
                size,
                body.len()
            )));
        }

        let mut label = [0; LABEL_LEN];
        label.copy_from_slice(&bytes[MAGIC.len() + 1..HEADER_LEN]);
        Ok(TapeImage {
            label,
            data: body[..size].to_vec(),
        })
    }

    /// Serialize to the on-disk layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.extend_from_slice(MAGIC);
        out.push((self.data.len() >> 16) as u8);
        out.extend_from_slice(&self.label);
        out.extend_from_slice(&self.data);
        out
    }

    /// Load an image file
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&std::fs::read(path)?)
    }

    /// Write the image to a file, replacing it
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Label up to its first NUL
    pub fn label(&self) -> String {
        let end = self
            .label
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(LABEL_LEN);
        String::from_utf8_lossy(&self.label[..end]).into_owned()
    }

    /// Replace the label, truncated to 27 bytes and NUL-padded
    pub fn set_label(&mut self, label: &str) {
        let bytes = label.as_bytes();
        let len = bytes.len().min(LABEL_LEN);
        self.label = [0; LABEL_LEN];
        self.label[..len].copy_from_slice(&bytes[..len]);
    }

    /// Tape size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tape holds no data
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Tape data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable tape data
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut image = TapeImage::new(0x20000);
        image.set_label("mix");
        image.data_mut()[0] = 0xAB;
        let bytes = image.to_bytes();
        assert_eq!(&bytes[..4], b"CTDT");
        assert_eq!(bytes[4], 0x02);
        assert_eq!(&bytes[5..8], b"mix");
        assert!(bytes[8..32].iter().all(|&b| b == 0));
        assert_eq!(bytes[32], 0xAB);
        assert_eq!(bytes.len(), 32 + 0x20000);
        assert_eq!(TapeImage::parse(&bytes).unwrap(), image);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = TapeImage::new(0x10000).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(TapeImage::parse(&bytes), Err(SoundError::Format(_))));
        assert!(matches!(TapeImage::parse(b"CT"), Err(SoundError::Format(_))));
    }

    #[test]
    fn test_truncated_body() {
        let bytes = TapeImage::new(0x10000).to_bytes();
        assert!(matches!(
            TapeImage::parse(&bytes[..bytes.len() - 1]),
            Err(SoundError::Format(_))
        ));
        assert!(matches!(
            TapeImage::parse(&bytes[..20]),
            Err(SoundError::Format(_))
        ));
    }

    #[test]
    fn test_label_truncates() {
        let mut image = TapeImage::new(0);
        image.set_label("a label that is much longer than the field");
        assert_eq!(image.label().len(), LABEL_LEN);
        assert_eq!(image.label(), "a label that is much longer");
        image.set_label("");
        assert_eq!(image.label(), "");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tape.ctdt");
        let mut image = TapeImage::new(0x10000);
        image.set_label("side A");
        image.write_to(&path).unwrap();
        assert_eq!(TapeImage::read_from(&path).unwrap(), image);
    }
}
