use pretty_assertions::assert_eq;

use super::raw::{self, BlockData};
use crate::memory::{Arena, Handle};
use crate::types::{BLOCK_HEADER_SIZE, TypeDesc, TypeTable};

#[test]
fn test_bytes_block_holds_header_and_payload() {
    let arena = Arena::with_capacity(256).unwrap();
    let block = BlockData::new_bytes(&arena, b"hello").unwrap();

    assert_eq!(block.len(), 5);
    assert_eq!(block.as_bytes(), b"hello");
    assert_eq!(arena.used(), BLOCK_HEADER_SIZE + 5);
}

#[test]
fn test_list_block_is_zeroed() {
    let arena = Arena::with_capacity(256).unwrap();
    let mut types = TypeTable::default();
    let int = types.push(TypeDesc::Int).unwrap();
    let layout = types.list_block(int).unwrap();

    let block = BlockData::new_list(&arena, layout, 3).unwrap();
    assert_eq!(block.len(), 3);
    for i in 0..3 {
        assert_eq!(unsafe { raw::read_i32(block.element(layout, i)) }, 0);
    }

    unsafe { raw::write_i32(block.element(layout, 2), -7) };
    assert_eq!(unsafe { raw::read_i32(block.element(layout, 2)) }, -7);
}

#[test]
fn test_null_slot_is_empty_value() {
    let slot = [0u8; core::mem::size_of::<usize>()];
    assert!(unsafe { BlockData::from_slot(slot.as_ptr()) }.is_none());
}

#[test]
fn test_store_and_reload_through_slot() {
    let arena = Arena::with_capacity(256).unwrap();
    let block = BlockData::new_bytes(&arena, b"abc").unwrap();
    let mut slot = [0u8; core::mem::size_of::<usize>()];

    unsafe { block.store(slot.as_mut_ptr()) };
    let reloaded = unsafe { BlockData::from_slot(slot.as_ptr()) }.unwrap();

    assert_eq!(reloaded.as_ptr(), block.as_ptr());
    assert_eq!(reloaded.as_bytes(), b"abc");
}

#[test]
fn test_scalar_slots() {
    let mut octets = [0u8; 8];
    let base = octets.as_mut_ptr();
    unsafe {
        raw::write_handle(base, Handle::from_raw(3));
        raw::write_bool(base.add(4), true);
        assert_eq!(raw::read_handle(base), Handle::from_raw(3));
        assert!(raw::read_bool(base.add(4)));
        raw::write_u32(base, 0x41);
        assert_eq!(raw::read_u32(base), 0x41);
    }
}

#[test]
fn test_block_allocation_respects_capacity() {
    let arena = Arena::with_capacity(BLOCK_HEADER_SIZE + 4).unwrap();
    assert!(BlockData::new_bytes(&arena, b"abcdef").is_err());
    assert!(BlockData::new_bytes(&arena, b"abcd").is_ok());
}
