//! Interrupt flag control.
//!
//! The DMA completion spin runs with interrupts enabled and the copy-out
//! runs with them disabled; these wrappers are how the transport flips the
//! flag. Hosted builds (unit tests) compile them to no-ops.

/// Disables maskable interrupts.
pub fn intr_disable() {
    #[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), target_os = "none"))]
    // SAFETY: `cli` only touches the interrupt flag.
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack));
    }
}

/// Enables maskable interrupts.
pub fn intr_enable() {
    #[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), target_os = "none"))]
    // SAFETY: `sti` only touches the interrupt flag.
    unsafe {
        core::arch::asm!("sti", options(nomem, nostack));
    }
}

#[allow(dead_code)]
#[derive(Debug, PartialEq)]
pub enum IntrLevel {
    IntrOn,
    IntrOff,
}

/// Reports whether maskable interrupts are currently enabled.
#[allow(dead_code)]
pub fn intr_get_level() -> IntrLevel {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    {
        let flags: u32;
        // SAFETY: Reads EFLAGS through the stack and restores ESP.
        unsafe {
            core::arch::asm!(
                "pushfd",
                "mov {0:e}, [esp]",
                "popfd",
                out(reg) flags
            );
        }
        if flags & (1 << 9) != 0 {
            IntrLevel::IntrOn
        } else {
            IntrLevel::IntrOff
        }
    }
    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    {
        IntrLevel::IntrOn
    }
}
