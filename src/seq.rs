//! Modular comparison helpers for the 32-bit sequence space. The sender and
//! receiver assume the space does not wrap at the byte rates this engine
//! targets (see spec §9), but every comparison still goes through these
//! helpers so the engine stays correct if that assumption is ever revisited.

/// `true` if `lhs` precedes `rhs` in the wrapping 32-bit sequence space.
pub fn wrapping_lt(lhs: u32, rhs: u32) -> bool {
    lhs.wrapping_sub(rhs) > (1 << 31)
}

/// `true` if `lhs` follows or equals `rhs`.
pub fn wrapping_ge(lhs: u32, rhs: u32) -> bool {
    !wrapping_lt(lhs, rhs)
}
