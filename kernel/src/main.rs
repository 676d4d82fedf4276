#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

mod block;
mod drivers;
mod interrupts;
mod mem;
mod sync;
mod vfs;

extern crate alloc;

use crate::drivers::ata::ata_core::IdeController;
use crate::drivers::ata::ata_interrupt;
use crate::mem::dma::BumpDmaAllocator;
use alloc::boxed::Box;
use alloc::sync::Arc;
use silt_shared::port::X86PortIo;
use silt_shared::println;

#[cfg(not(test))]
#[panic_handler]
fn panic(args: &core::panic::PanicInfo) -> ! {
    silt_shared::eprintln!("{}", args);
    loop {}
}

/// Entry from the loader. `dma_base`/`dma_len` bound an identity-mapped
/// region below 4 GiB reserved for bus-master transfers.
#[cfg_attr(not(test), no_mangle)]
extern "C" fn main(dma_base: usize, dma_len: usize) -> ! {
    // SAFETY: Called once, before the first allocation.
    unsafe {
        mem::heap::init();
    }

    // SAFETY: Single core in ring 0; the loader reserved the DMA window
    // for us.
    let io = unsafe { X86PortIo::new() };
    let dma = unsafe { BumpDmaAllocator::new(dma_base, dma_base as u32, dma_len) };

    println!("ide: probing legacy channels");
    let controller = IdeController::init(Box::new(io), Box::new(dma));

    // The platform IDT routes vectors 14/15 to the entry points; only
    // then is it safe to unmask the lines.
    ata_interrupt::install(Arc::clone(&controller));
    controller.enable_irqs();

    {
        let mut registry = vfs::DEV_REGISTRY.lock();
        vfs::block_node::publish_nodes(&controller, &mut registry);
        println!("{}", *registry);
    }

    loop {
        core::hint::spin_loop();
    }
}
