//! Minimal ISOBMFF/HEIF box-tree parser with in-place `ispe` patching.
//!
//! A resized HEIC re-encoded by some engines keeps the original `ispe`
//! (image spatial extents) property, so viewers report the pre-resize size.
//! This module finds the primary item's `ispe` boxes and rewrites their
//! width/height directly in the caller's buffer, without re-encoding.
//!
//! Box layout:
//!
//! ```text
//! [size: u32 BE][name: 4 ascii][payload...]     size < 8 => box runs to end of buffer
//! ```
//!
//! Only the boxes on the path to `ipma`/`ipco` are descended into:
//!
//! | Box | Header skipped before children |
//! |---|---|
//! | `meta` | 4 (version + flags) |
//! | `iinf` | 6 for version 0/1, 8 otherwise (version + flags + entry count) |
//! | `dinf`, `iprp`, `ipco` | 0 |
//!
//! The tree stores absolute offsets and payload ranges, never bytes, so it
//! can be built from a shared borrow and later used to patch the same buffer
//! through a short-lived mutable borrow.

use std::fmt;
use std::ops::Range;
use thiserror::Error;

const BOX_HEADER_LEN: usize = 8;
/// Offsets of the width and height fields from the start of an `ispe` box.
const ISPE_WIDTH_OFFSET: usize = 12;
const ISPE_HEIGHT_OFFSET: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeifError {
    #[error("truncated box header at offset {0}")]
    TruncatedHeader(usize),
    #[error("box at offset {offset} ends at {end}, past buffer length {len}")]
    BoxOverrun { offset: usize, end: usize, len: usize },
    #[error("container '{name}' at offset {offset} is shorter than its header")]
    ShortContainer { name: FourCc, offset: usize },
    #[error("no '{0}' box found")]
    MissingBox(FourCc),
    #[error("expected exactly one '{name}' box, found {count}")]
    DuplicateBox { name: FourCc, count: usize },
    #[error("'{0}' payload is truncated")]
    ShortPayload(FourCc),
    #[error("property index {index} out of range (ipco has {count} children)")]
    PropertyIndexOutOfRange { index: usize, count: usize },
}

/// A four-character box type code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const META: Self = Self(*b"meta");
    pub const DINF: Self = Self(*b"dinf");
    pub const IPRP: Self = Self(*b"iprp");
    pub const IPCO: Self = Self(*b"ipco");
    pub const IINF: Self = Self(*b"iinf");
    pub const PITM: Self = Self(*b"pitm");
    pub const IPMA: Self = Self(*b"ipma");
    pub const ISPE: Self = Self(*b"ispe");

    /// Bytes to skip after the box header before the first child, or `None`
    /// for leaf boxes.
    fn container_skip(self, version: Option<u8>) -> Option<usize> {
        match self {
            Self::META => Some(4),
            Self::DINF | Self::IPRP | Self::IPCO => Some(0),
            Self::IINF => match version {
                Some(v) if v <= 1 => Some(4 + 2),
                _ => Some(4 + 4),
            },
            _ => None,
        }
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoxContent {
    /// Raw payload, as an absolute byte range of the parsed buffer.
    Leaf(Range<usize>),
    Container(Vec<HeifBox>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeifBox {
    pub name: FourCc,
    /// Absolute offset of the box header in the parsed buffer.
    pub offset: usize,
    /// Total box size including the header.
    pub size: usize,
    pub content: BoxContent,
}

impl HeifBox {
    pub fn children(&self) -> &[HeifBox] {
        match &self.content {
            BoxContent::Container(children) => children,
            BoxContent::Leaf(_) => &[],
        }
    }

    /// Payload bytes of a leaf box; empty for containers.
    pub fn payload<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        match &self.content {
            BoxContent::Leaf(range) => &buf[range.clone()],
            BoxContent::Container(_) => &[],
        }
    }

    fn collect_by_name<'a>(&'a self, name: FourCc, found: &mut Vec<&'a HeifBox>) {
        if self.name == name {
            found.push(self);
        }
        for child in self.children() {
            child.collect_by_name(name, found);
        }
    }

    /// Pre-order search of this box and its descendants.
    pub fn boxes_by_name(&self, name: FourCc) -> Vec<&HeifBox> {
        let mut found = Vec::new();
        self.collect_by_name(name, &mut found);
        found
    }
}

/// Parsed top-level box list of a HEIF file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heif {
    pub boxes: Vec<HeifBox>,
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Parse the boxes laid out in `buf[start..end]`.
fn parse_boxes(buf: &[u8], start: usize, end: usize) -> Result<Vec<HeifBox>, HeifError> {
    let mut boxes = Vec::new();
    let mut offset = start;

    while offset < end {
        let remaining = end - offset;
        if remaining < BOX_HEADER_LEN {
            return Err(HeifError::TruncatedHeader(offset));
        }
        let declared = read_u32(buf, offset).ok_or(HeifError::TruncatedHeader(offset))? as usize;
        let size = if declared < BOX_HEADER_LEN {
            remaining
        } else {
            declared
        };
        let box_end = offset + size;
        if end < box_end {
            return Err(HeifError::BoxOverrun {
                offset,
                end: box_end,
                len: end,
            });
        }

        let name = FourCc([
            buf[offset + 4],
            buf[offset + 5],
            buf[offset + 6],
            buf[offset + 7],
        ]);
        let payload_start = offset + BOX_HEADER_LEN;
        let version = buf.get(payload_start).copied().filter(|_| payload_start < box_end);

        let content = match name.container_skip(version) {
            Some(skip) => {
                let children_start = payload_start + skip;
                if box_end < children_start {
                    return Err(HeifError::ShortContainer { name, offset });
                }
                BoxContent::Container(parse_boxes(buf, children_start, box_end)?)
            }
            None => BoxContent::Leaf(payload_start..box_end),
        };

        boxes.push(HeifBox {
            name,
            offset,
            size,
            content,
        });
        offset = box_end;
    }

    Ok(boxes)
}

impl Heif {
    /// Build the box tree for a complete HEIF buffer.
    pub fn parse(buf: &[u8]) -> Result<Self, HeifError> {
        Ok(Self {
            boxes: parse_boxes(buf, 0, buf.len())?,
        })
    }

    /// Every box named `name`, at any depth, in pre-order.
    pub fn boxes_by_name(&self, name: FourCc) -> Vec<&HeifBox> {
        let mut found = Vec::new();
        for b in &self.boxes {
            b.collect_by_name(name, &mut found);
        }
        found
    }

    fn single_box(&self, name: FourCc) -> Result<&HeifBox, HeifError> {
        match self.boxes_by_name(name).as_slice() {
            [] => Err(HeifError::MissingBox(name)),
            [single] => Ok(*single),
            many => Err(HeifError::DuplicateBox {
                name,
                count: many.len(),
            }),
        }
    }

    /// Item id of the primary image, from the single `pitm` box.
    pub fn primary_item_id(&self, buf: &[u8]) -> Result<u32, HeifError> {
        let pitm = self.single_box(FourCc::PITM)?;
        let payload = pitm.payload(buf);
        let short = HeifError::ShortPayload(FourCc::PITM);
        match payload.first() {
            Some(0) => read_u16(payload, 4).map(u32::from).ok_or(short),
            Some(_) => read_u32(payload, 4).ok_or(short),
            None => Err(short),
        }
    }

    /// `ispe` boxes associated with `item_id` through the `ipma` box.
    pub fn item_ispe_boxes(&self, buf: &[u8], item_id: u32) -> Result<Vec<&HeifBox>, HeifError> {
        let ipma = self.single_box(FourCc::IPMA)?;
        let ipco = self.single_box(FourCc::IPCO)?;
        let properties = ipco.children();
        let data = ipma.payload(buf);
        let short = || HeifError::ShortPayload(FourCc::IPMA);

        let version = *data.first().ok_or_else(short)?;
        let wide_index = data.get(3).ok_or_else(short)? & 1 == 1;
        let entry_count = read_u32(data, 4).ok_or_else(short)?;
        let mut offset = 8;
        let mut found = Vec::new();

        for _ in 0..entry_count {
            let id = if version < 1 {
                let id = read_u16(data, offset).ok_or_else(short)?;
                offset += 2;
                u32::from(id)
            } else {
                let id = read_u32(data, offset).ok_or_else(short)?;
                offset += 4;
                id
            };
            let association_count = *data.get(offset).ok_or_else(short)? as usize;
            offset += 1;
            let index_len = if wide_index { 2 } else { 1 };

            if id != item_id {
                offset += association_count * index_len;
                continue;
            }

            for _ in 0..association_count {
                // Top bit of the first byte is the "essential" flag
                let index = if wide_index {
                    let raw = read_u16(data, offset).ok_or_else(short)?;
                    (raw & 0x7FFF) as usize
                } else {
                    (*data.get(offset).ok_or_else(short)? & 0x7F) as usize
                };
                offset += index_len;

                // Index 0 means "no property"
                if index == 0 {
                    continue;
                }
                let property = properties.get(index - 1).ok_or(
                    HeifError::PropertyIndexOutOfRange {
                        index,
                        count: properties.len(),
                    },
                )?;
                if property.name == FourCc::ISPE {
                    found.push(property);
                }
            }
        }

        Ok(found)
    }

    /// Overwrite the `ispe` width/height of `item_id` in `buf`.
    ///
    /// `buf` must be the buffer this tree was parsed from. Returns the number
    /// of `ispe` boxes rewritten.
    pub fn set_image_size(
        &self,
        buf: &mut [u8],
        item_id: u32,
        width: u32,
        height: u32,
    ) -> Result<usize, HeifError> {
        let targets: Vec<usize> = self
            .item_ispe_boxes(buf, item_id)?
            .into_iter()
            .map(|ispe| {
                if ispe.size < ISPE_HEIGHT_OFFSET + 4 {
                    Err(HeifError::ShortPayload(FourCc::ISPE))
                } else {
                    Ok(ispe.offset)
                }
            })
            .collect::<Result<_, _>>()?;

        for offset in &targets {
            buf[offset + ISPE_WIDTH_OFFSET..offset + ISPE_WIDTH_OFFSET + 4]
                .copy_from_slice(&width.to_be_bytes());
            buf[offset + ISPE_HEIGHT_OFFSET..offset + ISPE_HEIGHT_OFFSET + 4]
                .copy_from_slice(&height.to_be_bytes());
        }
        Ok(targets.len())
    }

    /// Declared size of `item_id`, from its first associated `ispe` box.
    pub fn image_size(&self, buf: &[u8], item_id: u32) -> Result<Option<(u32, u32)>, HeifError> {
        let Some(ispe) = self.item_ispe_boxes(buf, item_id)?.into_iter().next() else {
            return Ok(None);
        };
        let width = read_u32(buf, ispe.offset + ISPE_WIDTH_OFFSET);
        let height = read_u32(buf, ispe.offset + ISPE_HEIGHT_OFFSET);
        match (width, height) {
            (Some(w), Some(h)) if ispe.size >= ISPE_HEIGHT_OFFSET + 4 => Ok(Some((w, h))),
            _ => Err(HeifError::ShortPayload(FourCc::ISPE)),
        }
    }
}

/// Rewrite the declared size of the primary image in place.
pub fn set_primary_image_size(buf: &mut [u8], width: u32, height: u32) -> Result<usize, HeifError> {
    let heif = Heif::parse(buf)?;
    let primary = heif.primary_item_id(buf)?;
    heif.set_image_size(buf, primary, width, height)
}

/// Declared size of the primary image.
pub fn primary_image_size(buf: &[u8]) -> Result<Option<(u32, u32)>, HeifError> {
    let heif = Heif::parse(buf)?;
    let primary = heif.primary_item_id(buf)?;
    heif.image_size(buf, primary)
}
