//! Cortex-M port
//!
//! Ticks come from [`SYSTICK`], which the application's SysTick handler
//! advances through [`CortexM::on_systick`] (SysTick configured for 1 kHz).
//! Interrupt context is read from `ICSR.VECTACTIVE`.
//!
//! Author: Moroya Sakamoto

use cortex_m::peripheral::scb::VectActive;
use cortex_m::peripheral::SCB;

use super::Port;
use crate::timer::Ticker;

/// Millisecond counter fed by the SysTick exception
pub static SYSTICK: Ticker = Ticker::new();

/// Cortex-M board port
pub struct CortexM;

impl CortexM {
    /// Call from the SysTick exception handler once per millisecond.
    #[inline]
    pub fn on_systick() {
        SYSTICK.advance(1);
    }
}

impl Port for CortexM {
    fn now_ms() -> u32 {
        SYSTICK.now_ms()
    }

    fn in_interrupt() -> bool {
        !matches!(SCB::vect_active(), VectActive::ThreadMode)
    }
}
