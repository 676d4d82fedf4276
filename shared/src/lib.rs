#![no_std]

pub mod macros;
pub mod port;
pub mod serial;
pub mod sizes;
