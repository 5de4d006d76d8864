//! GIF first-frame isolation.
//!
//! Animated GIFs are thumbnailed from their first frame only. Rather than
//! decoding every frame, the block structure is walked and the byte right
//! after the first image's data is overwritten with the trailer marker, so
//! any decoder stops there.
//!
//! Block layout (GIF89a):
//!
//! ```text
//! header(6) + logical screen descriptor(7)   flags at byte 10
//! [global color table: 3 * 2^(bits+1)]      present iff flags & 0x80
//! loop:
//!   0x21 label size data... sub-blocks... 0x00    extension
//!   0x2C descriptor(9) [local color table] lzw(1) sub-blocks... 0x00
//!   0x3B                                          trailer
//! ```
//!
//! Every failure is recoverable: the caller can still hand the untouched
//! stream to the engine.

use thiserror::Error;

const TRAILER: u8 = 0x3B;
const EXTENSION: u8 = 0x21;
const IMAGE: u8 = 0x2C;

const HEADER_LEN: usize = 13;
const IMAGE_DESCRIPTOR_LEN: usize = 9;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GifError {
    #[error("too short header")]
    ShortHeader,
    #[error("too short global color table")]
    ShortGlobalColorTable,
    #[error("missing block separator at offset {0}")]
    MissingSeparator(usize),
    #[error("missing extension block header at offset {0}")]
    MissingExtensionHeader(usize),
    #[error("too short extension block at offset {0}")]
    ShortExtensionBlock(usize),
    #[error("too short image descriptor at offset {0}")]
    ShortImageDescriptor(usize),
    #[error("too short local color table at offset {0}")]
    ShortLocalColorTable(usize),
    #[error("missing sub-block size field at offset {0}")]
    MissingSubBlockSize(usize),
    #[error("too short sub-block at offset {0}")]
    ShortSubBlock(usize),
    #[error("no room for trailer after first image (offset {0})")]
    NoRoomForTrailer(usize),
}

/// Size in bytes of a color table described by the low 3 bits of `flags`.
fn color_table_len(flags: u8) -> usize {
    3 * (1usize << ((flags & 0x07) + 1))
}

fn has_color_table(flags: u8) -> bool {
    flags & 0x80 != 0
}

/// Walk a run of data sub-blocks starting at `offset`, returning the offset
/// just past the zero-length terminator.
fn skip_sub_blocks(bytes: &[u8], mut offset: usize) -> Result<usize, GifError> {
    loop {
        let Some(&size) = bytes.get(offset) else {
            return Err(GifError::MissingSubBlockSize(offset));
        };
        offset += 1;
        if size == 0 {
            return Ok(offset);
        }
        offset += size as usize;
        if bytes.len() < offset {
            return Err(GifError::ShortSubBlock(offset));
        }
    }
}

/// Skip an extension block. `offset` points at the label byte.
///
/// The first block after the label is the fixed part (e.g. the 11-byte
/// `NETSCAPE2.0` identifier of an application extension); whatever follows
/// is a terminated sub-block run for every extension kind.
fn skip_extension(bytes: &[u8], offset: usize) -> Result<usize, GifError> {
    if bytes.len() < offset + 2 {
        return Err(GifError::MissingExtensionHeader(offset));
    }
    let first_block = bytes[offset + 1] as usize;
    let end = offset + 2 + first_block;
    if bytes.len() < end {
        return Err(GifError::ShortExtensionBlock(end));
    }
    skip_sub_blocks(bytes, end)
}

/// Skip an image block. `offset` points at the first descriptor byte.
fn skip_image(bytes: &[u8], mut offset: usize) -> Result<usize, GifError> {
    if bytes.len() < offset + IMAGE_DESCRIPTOR_LEN {
        return Err(GifError::ShortImageDescriptor(offset));
    }
    let flags = bytes[offset + 8];
    offset += IMAGE_DESCRIPTOR_LEN;
    if has_color_table(flags) {
        offset += color_table_len(flags);
        if bytes.len() < offset {
            return Err(GifError::ShortLocalColorTable(offset));
        }
    }
    offset += 1; // LZW minimum code size
    skip_sub_blocks(bytes, offset)
}

/// Truncate an (animated) GIF to its first frame, in place.
///
/// After the first image block the next byte is overwritten with the trailer
/// marker. Returns the length of the resulting single-frame stream; bytes
/// past it are dead and may be dropped by the caller.
pub fn extract_first_frame(bytes: &mut [u8]) -> Result<usize, GifError> {
    if bytes.len() < HEADER_LEN {
        return Err(GifError::ShortHeader);
    }

    let flags = bytes[10];
    let mut offset = HEADER_LEN;
    if has_color_table(flags) {
        offset += color_table_len(flags);
        if bytes.len() < offset {
            return Err(GifError::ShortGlobalColorTable);
        }
    }

    loop {
        let Some(&separator) = bytes.get(offset) else {
            return Err(GifError::MissingSeparator(offset));
        };
        offset += 1;

        match separator {
            TRAILER => return Ok(offset),
            EXTENSION => offset = skip_extension(bytes, offset)?,
            IMAGE => {
                offset = skip_image(bytes, offset)?;
                let Some(next) = bytes.get_mut(offset) else {
                    return Err(GifError::NoRoomForTrailer(offset));
                };
                *next = TRAILER;
            }
            // Stray bytes between blocks are tolerated
            _ => {}
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Header + logical screen descriptor with a 2-entry global color table.
    fn header() -> Vec<u8> {
        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&[0x02, 0x00, 0x02, 0x00]); // 2x2
        gif.extend_from_slice(&[0x80, 0x00, 0x00]); // GCT present, 2 entries
        gif.extend_from_slice(&[0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF]);
        gif
    }

    fn netscape_loop() -> Vec<u8> {
        let mut ext = vec![0x21, 0xFF, 0x0B];
        ext.extend_from_slice(b"NETSCAPE2.0");
        ext.extend_from_slice(&[0x03, 0x01, 0x00, 0x00, 0x00]);
        ext
    }

    fn graphic_control() -> Vec<u8> {
        vec![0x21, 0xF9, 0x04, 0x04, 0x0A, 0x00, 0x00, 0x00]
    }

    fn frame(pixel: u8) -> Vec<u8> {
        let mut img = vec![0x2C, 0, 0, 0, 0, 0x02, 0x00, 0x02, 0x00, 0x00];
        img.push(0x02); // LZW min code size
        img.extend_from_slice(&[0x03, 0x84, pixel, 0x05, 0x00]);
        img
    }

    /// A GIF with `frames` image blocks, each preceded by a graphic control extension.
    pub(crate) fn animated_gif(frames: usize) -> Vec<u8> {
        let mut gif = header();
        gif.extend(netscape_loop());
        for i in 0..frames {
            gif.extend(graphic_control());
            gif.extend(frame(i as u8));
        }
        gif.push(TRAILER);
        gif
    }

    #[test]
    fn single_frame_is_unchanged() {
        let original = animated_gif(1);
        let mut bytes = original.clone();
        let len = extract_first_frame(&mut bytes).unwrap();
        assert_eq!(len, original.len());
        assert_eq!(bytes, original);
    }

    #[test]
    fn animation_truncated_after_first_frame() {
        let single = animated_gif(1);
        let mut bytes = animated_gif(3);
        let len = extract_first_frame(&mut bytes).unwrap();
        assert_eq!(len, single.len());
        assert_eq!(&bytes[..len], &single[..]);
    }

    #[test]
    fn only_one_byte_changes() {
        let original = animated_gif(2);
        let mut bytes = original.clone();
        let len = extract_first_frame(&mut bytes).unwrap();
        let changed: Vec<usize> = (0..bytes.len())
            .filter(|&i| bytes[i] != original[i])
            .collect();
        assert_eq!(changed, vec![len - 1]);
        assert_eq!(bytes[len - 1], TRAILER);
    }

    #[test]
    fn no_global_color_table() {
        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&[0x02, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00]);
        gif.extend(frame(1));
        gif.push(TRAILER);
        let mut bytes = gif.clone();
        assert_eq!(extract_first_frame(&mut bytes), Ok(gif.len()));
    }

    #[test]
    fn local_color_table_is_skipped() {
        let mut gif = header();
        let mut img = vec![0x2C, 0, 0, 0, 0, 0x01, 0x00, 0x01, 0x00, 0x81];
        img.extend_from_slice(&[0u8; 12]); // 4 entries
        img.push(0x02);
        img.extend_from_slice(&[0x02, 0x44, 0x01, 0x00]);
        gif.extend(img);
        gif.push(TRAILER);
        let mut bytes = gif.clone();
        assert_eq!(extract_first_frame(&mut bytes), Ok(gif.len()));
    }

    #[test]
    fn comment_with_multiple_sub_blocks() {
        let mut gif = header();
        gif.extend_from_slice(&[0x21, 0xFE, 0x02, b'h', b'i', 0x01, b'!', 0x00]);
        gif.extend(frame(0));
        gif.push(TRAILER);
        let mut bytes = gif.clone();
        assert_eq!(extract_first_frame(&mut bytes), Ok(gif.len()));
    }

    #[test]
    fn too_short_header() {
        let mut bytes = b"GIF89a".to_vec();
        assert_eq!(extract_first_frame(&mut bytes), Err(GifError::ShortHeader));
    }

    #[test]
    fn truncated_global_color_table() {
        let mut bytes = header();
        bytes[10] = 0x87; // claims 256 entries
        assert_eq!(
            extract_first_frame(&mut bytes),
            Err(GifError::ShortGlobalColorTable)
        );
    }

    #[test]
    fn missing_separator() {
        let mut bytes = header();
        let len = bytes.len();
        assert_eq!(
            extract_first_frame(&mut bytes),
            Err(GifError::MissingSeparator(len))
        );
    }

    #[test]
    fn truncated_image_data() {
        let mut bytes = header();
        let mut img = frame(0);
        img.truncate(img.len() - 2);
        bytes.extend(img);
        assert!(matches!(
            extract_first_frame(&mut bytes),
            Err(GifError::ShortSubBlock(_)) | Err(GifError::MissingSubBlockSize(_))
        ));
    }

    #[test]
    fn no_room_for_trailer() {
        let mut bytes = header();
        bytes.extend(frame(0));
        let len = bytes.len();
        assert_eq!(
            extract_first_frame(&mut bytes),
            Err(GifError::NoRoomForTrailer(len))
        );
    }

    #[test]
    fn truncated_extension_header() {
        let mut bytes = header();
        bytes.extend_from_slice(&[0x21, 0xF9]);
        assert!(matches!(
            extract_first_frame(&mut bytes),
            Err(GifError::MissingExtensionHeader(_))
        ));
    }

    #[test]
    fn color_table_sizes() {
        assert_eq!(color_table_len(0x80), 6);
        assert_eq!(color_table_len(0x81), 12);
        assert_eq!(color_table_len(0x87), 768);
    }
}
