//! Boot heap backing `alloc` on bare metal.
//!
//! A fixed in-image region handed to a free-list allocator. Hosted test
//! builds use the host allocator instead.

use linked_list_allocator::LockedHeap;

#[cfg_attr(not(test), global_allocator)]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

const HEAP_LEN: usize = 1 << 20;

#[repr(align(4096))]
struct HeapArea([u8; HEAP_LEN]);

static mut HEAP_AREA: HeapArea = HeapArea([0; HEAP_LEN]);

/// # Safety
///
/// Call once, before the first allocation.
pub unsafe fn init() {
    let start = core::ptr::addr_of_mut!(HEAP_AREA) as usize;
    ALLOCATOR.lock().init(start, HEAP_LEN);
}
