//! Property tests: pages read back exactly as last written, across both
//! page stores and across a file reopen.

use proptest::prelude::*;
use proptest::sample::Index;
use ridgedb_storage::{FilePageStore, InMemoryPageStore, Page, PageId, PageStore};
use tempfile::tempdir;

const PAGE_SIZE: usize = 256;

fn page_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), PAGE_SIZE)
}

/// Allocates one page per image, then applies `rewrites` on top and returns
/// the images the store should now hold.
fn apply(
    store: &mut dyn PageStore,
    images: &[Vec<u8>],
    rewrites: &[(Index, Vec<u8>)],
) -> Vec<Vec<u8>> {
    let mut expected = Vec::with_capacity(images.len());
    for image in images {
        let mut page = store.allocate_page().unwrap();
        page.data_mut().copy_from_slice(image);
        store.write_page(&page).unwrap();
        expected.push(image.clone());
    }
    for (slot, image) in rewrites {
        let i = slot.index(expected.len());
        store
            .write_page(&Page::from_bytes(PageId::new(i as u32), image.clone()))
            .unwrap();
        expected[i] = image.clone();
    }
    expected
}

fn read_all(store: &dyn PageStore) -> Vec<Vec<u8>> {
    (0..store.page_count())
        .map(|id| store.read_page(PageId::new(id)).unwrap().into_bytes())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn memory_store_returns_last_write(
        images in prop::collection::vec(page_bytes(), 1..8),
        rewrites in prop::collection::vec((any::<Index>(), page_bytes()), 0..12),
    ) {
        let mut store = InMemoryPageStore::new(PAGE_SIZE);
        let expected = apply(&mut store, &images, &rewrites);
        prop_assert_eq!(read_all(&store), expected.clone());

        let restored = InMemoryPageStore::with_pages(PAGE_SIZE, store.snapshot()).unwrap();
        prop_assert_eq!(read_all(&restored), expected);
    }

    #[test]
    fn file_store_survives_reopen(
        images in prop::collection::vec(page_bytes(), 1..8),
        rewrites in prop::collection::vec((any::<Index>(), page_bytes()), 0..12),
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.idx");

        let expected = {
            let mut store = FilePageStore::open(&path, PAGE_SIZE).unwrap();
            let expected = apply(&mut store, &images, &rewrites);
            prop_assert_eq!(read_all(&store), expected.clone());
            store.flush().unwrap();
            expected
        };

        let reopened = FilePageStore::open(&path, PAGE_SIZE).unwrap();
        prop_assert_eq!(reopened.page_count() as usize, expected.len());
        prop_assert_eq!(read_all(&reopened), expected);
    }
}
