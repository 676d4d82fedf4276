//! IDE interrupt entry points.
//!
//! The platform's IDT stubs call [`primary_irq_entry`] / [`secondary_irq_entry`]
//! for vectors 14 and 15. All the handler does is acknowledge the device by
//! reading its status register and, if a packet command is sleeping on the
//! channel, post its completion.

use crate::drivers::ata::ata_core::IdeController;
use alloc::boxed::Box;
use alloc::sync::Arc;
use once_cell::race::OnceBox;

static CONTROLLER: OnceBox<Arc<IdeController>> = OnceBox::new();

/// Make `controller` the instance the interrupt entry points dispatch to.
/// The first call wins; later calls are ignored.
pub fn install(controller: Arc<IdeController>) {
    let _ = CONTROLLER.set(Box::new(controller));
}

#[no_mangle]
pub extern "C" fn primary_irq_entry() {
    on_ide_interrupt(14);
}

#[no_mangle]
pub extern "C" fn secondary_irq_entry() {
    on_ide_interrupt(15);
}

fn on_ide_interrupt(irq: u8) {
    if let Some(controller) = CONTROLLER.get() {
        controller.handle_irq(irq);
    }
}
