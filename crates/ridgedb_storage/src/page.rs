//! Page identifiers and page buffers.

use std::fmt;

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 16 * 1024;

/// Smallest page size a store accepts.
pub const MIN_PAGE_SIZE: usize = 256;

/// Identifier of a page inside one page store.
///
/// Page ids are dense: a store holding `n` pages addresses them as `0..n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub u32);

impl PageId {
    /// Sentinel for "no page" in on-page pointers.
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Creates a new page id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns true unless this is [`PageId::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    /// Converts an on-page pointer into an optional id.
    #[must_use]
    pub const fn to_option(self) -> Option<PageId> {
        if self.is_valid() {
            Some(self)
        } else {
            None
        }
    }

    /// Converts an optional id into an on-page pointer.
    #[must_use]
    pub fn from_option(id: Option<PageId>) -> Self {
        id.unwrap_or(Self::INVALID)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "page:{}", self.0)
        } else {
            write!(f, "page:none")
        }
    }
}

/// A fixed-size page buffer tagged with its id.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    id: PageId,
    data: Vec<u8>,
}

impl Page {
    /// Creates a zero-filled page.
    #[must_use]
    pub fn new(id: PageId, page_size: usize) -> Self {
        Self {
            id,
            data: vec![0u8; page_size],
        }
    }

    /// Wraps an existing buffer.
    #[must_use]
    pub fn from_bytes(id: PageId, data: Vec<u8>) -> Self {
        Self { id, data }
    }

    /// Returns the page id.
    #[must_use]
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Returns the page size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns the page contents.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the page contents for writing.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consumes the page and returns its buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id)
            .field("size", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_page_id_round_trips_through_option() {
        assert_eq!(PageId::INVALID.to_option(), None);
        assert_eq!(PageId::from_option(None), PageId::INVALID);
        assert_eq!(PageId::from_option(Some(PageId::new(7))), PageId::new(7));
        assert!(!PageId::INVALID.is_valid());
    }

    #[test]
    fn page_id_display() {
        assert_eq!(format!("{}", PageId::new(3)), "page:3");
        assert_eq!(format!("{}", PageId::INVALID), "page:none");
    }

    #[test]
    fn new_page_is_zeroed() {
        let page = Page::new(PageId::new(1), 512);
        assert_eq!(page.size(), 512);
        assert!(page.data().iter().all(|b| *b == 0));
    }
}
