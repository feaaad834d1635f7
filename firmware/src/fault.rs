//! Terminal fault handling.

use power_core::fault::FaultKind;

/// Logs `kind` and traps; the debugger or watchdog takes it from here.
pub fn halt(kind: FaultKind) -> ! {
    defmt::error!("fault: {}", kind);
    cortex_m::asm::udf();
}
