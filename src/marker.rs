//! The native breakpoint marker.
//!
//! GDB locates the marker by its exported symbol name, so the function must
//! keep its own frame and must not touch any state.

/// Exported symbol name of the marker. This is what `break` targets in GDB.
pub const SYMBOL: &str = "_pygdb_breakpoint_mark";

/// The function GDB breaks on.
///
/// The opaque body keeps calls from being dropped as side-effect free.
#[inline(never)]
#[unsafe(export_name = "_pygdb_breakpoint_mark")]
pub extern "C" fn breakpoint_mark_symbol() {
    std::hint::black_box(());
}

/// Calls the marker symbol.
///
/// Never fails and touches no state; safe to call from any thread.
#[inline]
pub fn breakpoint_mark() {
    breakpoint_mark_symbol();
}

/// Address of the marker symbol, for logging where GDB should break.
pub fn symbol_address() -> usize {
    breakpoint_mark_symbol as extern "C" fn() as usize
}
