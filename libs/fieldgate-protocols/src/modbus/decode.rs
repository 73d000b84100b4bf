//! Register-window numeric decoding
//!
//! Turns a slice of 16-bit words read off the wire into scaled doubles.
//! The float32 path keeps the upstream clamp and near-zero fallback exactly
//! as the fielded devices were calibrated against; see DESIGN.md before
//! touching either.

use super::types::{Endianness, RegisterDef, RegisterKind};

/// Decode one register value from a read window.
///
/// `offset` is the register's position relative to the window start.
/// Returns `None` when the window is too short for the declared length; the
/// caller skips the point and continues.
pub fn decode_register(
    words: &[u16],
    offset: usize,
    register: &RegisterDef,
    endianness: Endianness,
) -> Option<f64> {
    match register.kind {
        RegisterKind::U16 => {
            let raw = *words.get(offset)?;
            Some(raw as f64 * register.scale)
        },
        RegisterKind::Float32 => {
            let r1 = *words.get(offset)?;
            let r2 = *words.get(offset + 1)?;
            Some(decode_float32(r1, r2, register.word_swap, endianness, register.scale))
        },
    }
}

fn decode_float32(r1: u16, r2: u16, word_swap: bool, endianness: Endianness, scale: f64) -> f64 {
    let (hi, lo) = if word_swap { (r2, r1) } else { (r1, r2) };
    let mut bytes = [(hi >> 8) as u8, hi as u8, (lo >> 8) as u8, lo as u8];

    let raw = match endianness {
        Endianness::Big => f32::from_be_bytes(bytes) as f64,
        Endianness::Little => {
            bytes.reverse();
            f32::from_le_bytes(bytes) as f64
        },
    };

    // Upstream encoding mistakes produce garbage magnitudes; clamp them out.
    let raw = if !raw.is_finite() || raw.abs() > 1.0e6 {
        0.0
    } else {
        raw
    };

    // Near-zero floats fall back to the first word; kept bit-compatible with
    // the fielded behaviour even though it can mask values below 1e-3.
    if (r1 == 0 && r2 == 0) || raw.abs() < 1.0e-3 {
        return r1 as f64 * scale;
    }

    raw * scale
}
