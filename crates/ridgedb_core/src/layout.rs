//! Shared on-page header and byte cursors.
//!
//! Every page written by an index in this crate starts with the same 24-byte
//! header:
//!
//! ```text
//! +---------+------+----------+-------------+--------+------+------+----------+
//! | page_id | kind | reserved | entry_count | parent | prev | next | body_len |
//! |   u32   |  u8  |    u8    |     u16     |  u32   | u32  | u32  |   u32    |
//! +---------+------+----------+-------------+--------+------+------+----------+
//! ```
//!
//! All integers are big-endian. A zero-filled page decodes as
//! [`PageKind::Free`], so freshly allocated pages need no initialisation.

use crate::error::{CoreError, CoreResult};
use bytes::{Buf, BufMut};
use ridgedb_storage::{Page, PageId};

/// Size of the common page header in bytes.
pub const HEADER_SIZE: usize = 24;

/// What a page holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Unused page, available for reuse.
    Free = 0,
    /// B-Tree leaf.
    Leaf = 1,
    /// B-Tree internal node.
    Internal = 2,
    /// B-Tree meta page.
    TreeMeta = 3,
    /// Hash index meta page.
    HashMeta = 4,
    /// Hash directory slots.
    Directory = 5,
    /// Hash bucket.
    Bucket = 6,
}

impl PageKind {
    fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Free,
            1 => Self::Leaf,
            2 => Self::Internal,
            3 => Self::TreeMeta,
            4 => Self::HashMeta,
            5 => Self::Directory,
            6 => Self::Bucket,
            _ => return None,
        })
    }
}

/// Decoded page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_id: PageId,
    pub kind: PageKind,
    pub entry_count: u16,
    pub parent: PageId,
    pub prev: PageId,
    pub next: PageId,
    pub body_len: u32,
}

impl PageHeader {
    /// Creates a header with no links and an empty body.
    pub fn new(page_id: PageId, kind: PageKind) -> Self {
        Self {
            page_id,
            kind,
            entry_count: 0,
            parent: PageId::INVALID,
            prev: PageId::INVALID,
            next: PageId::INVALID,
            body_len: 0,
        }
    }

    fn put(&self, buf: &mut Vec<u8>) {
        buf.put_u32(self.page_id.as_u32());
        buf.put_u8(self.kind as u8);
        buf.put_u8(0);
        buf.put_u16(self.entry_count);
        buf.put_u32(self.parent.as_u32());
        buf.put_u32(self.prev.as_u32());
        buf.put_u32(self.next.as_u32());
        buf.put_u32(self.body_len);
    }

    fn read(reader: &mut PageReader<'_>) -> CoreResult<Self> {
        let page_id = PageId::new(reader.u32()?);
        let tag = reader.u8()?;
        let kind = PageKind::from_u8(tag)
            .ok_or_else(|| CoreError::invalid_format(format!("unknown page kind {tag}")))?;
        let _reserved = reader.u8()?;
        Ok(Self {
            page_id,
            kind,
            entry_count: reader.u16()?,
            parent: PageId::new(reader.u32()?),
            prev: PageId::new(reader.u32()?),
            next: PageId::new(reader.u32()?),
            body_len: reader.u32()?,
        })
    }
}

/// Writes `header` followed by `body` into a page of `page_size` bytes.
///
/// The header's `body_len` is overwritten with the real body length.
pub fn write_page(mut header: PageHeader, body: &[u8], page_size: usize) -> CoreResult<Page> {
    let total = HEADER_SIZE + body.len();
    if total > page_size {
        return Err(CoreError::invalid_format(format!(
            "{} page of {total} bytes exceeds page size {page_size}",
            header.page_id
        )));
    }
    header.body_len = body.len() as u32;

    let mut buf = Vec::with_capacity(total);
    header.put(&mut buf);
    buf.extend_from_slice(body);

    let mut page = Page::new(header.page_id, page_size);
    page.data_mut()[..total].copy_from_slice(&buf);
    Ok(page)
}

/// Reads the header of `page` and returns it with its body.
///
/// A free page's header is returned with the page's own id, since zeroed
/// pages carry id 0.
pub fn read_page(page: &Page) -> CoreResult<(PageHeader, &[u8])> {
    let data = page.data();
    let mut reader = PageReader::new(data);
    let mut header = PageHeader::read(&mut reader)?;
    if header.kind == PageKind::Free {
        header.page_id = page.id();
        return Ok((header, &[]));
    }
    if header.page_id != page.id() {
        return Err(CoreError::invalid_format(format!(
            "{} carries header id {}",
            page.id(),
            header.page_id
        )));
    }
    let end = HEADER_SIZE + header.body_len as usize;
    if end > data.len() {
        return Err(CoreError::invalid_format(format!(
            "{} body length {} overruns the page",
            page.id(),
            header.body_len
        )));
    }
    Ok((header, &data[HEADER_SIZE..end]))
}

/// Bounds-checked big-endian reader over a page body.
pub struct PageReader<'a> {
    buf: &'a [u8],
}

impl<'a> PageReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> CoreResult<()> {
        if self.buf.remaining() < n {
            return Err(CoreError::invalid_format(format!(
                "truncated page: need {n} bytes, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn u8(&mut self) -> CoreResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16(&mut self) -> CoreResult<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn u32(&mut self) -> CoreResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn u64(&mut self) -> CoreResult<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    pub fn bytes(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut header = PageHeader::new(PageId::new(3), PageKind::Leaf);
        header.entry_count = 2;
        header.parent = PageId::new(1);
        header.next = PageId::new(4);

        let page = write_page(header, b"body", 256).unwrap();
        let (decoded, body) = read_page(&page).unwrap();
        assert_eq!(decoded.kind, PageKind::Leaf);
        assert_eq!(decoded.entry_count, 2);
        assert_eq!(decoded.parent, PageId::new(1));
        assert_eq!(decoded.prev, PageId::INVALID);
        assert_eq!(decoded.next, PageId::new(4));
        assert_eq!(body, b"body");
    }

    #[test]
    fn zeroed_page_is_free() {
        let page = Page::new(PageId::new(9), 256);
        let (header, body) = read_page(&page).unwrap();
        assert_eq!(header.kind, PageKind::Free);
        assert_eq!(header.page_id, PageId::new(9));
        assert!(body.is_empty());
    }

    #[test]
    fn oversized_body_rejected() {
        let header = PageHeader::new(PageId::new(0), PageKind::Leaf);
        assert!(write_page(header, &[0u8; 300], 256).is_err());
    }

    #[test]
    fn mismatched_id_rejected() {
        let page = write_page(PageHeader::new(PageId::new(2), PageKind::Leaf), &[], 256).unwrap();
        let moved = Page::from_bytes(PageId::new(5), page.into_bytes());
        assert!(matches!(read_page(&moved), Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut page = Page::new(PageId::new(0), 256);
        page.data_mut()[4] = 0x7f;
        assert!(read_page(&page).is_err());
    }

    #[test]
    fn reader_detects_truncation() {
        let mut reader = PageReader::new(&[0, 1]);
        assert_eq!(reader.u16().unwrap(), 1);
        assert!(reader.u8().is_err());
    }
}
