//! Bit-level packing of primitive values.
//!
//! [`BitBuffer`] is a growable byte buffer addressed in bits. Values are
//! packed at whatever bit the cursor is on, with no implicit alignment:
//! a `u32` written after a single `bool` straddles five bytes. Bits fill
//! each byte from the least significant end, and multi-byte values are
//! written least-significant byte first, so an aligned `u32` lands in
//! little-endian order.
//!
//! The only alignment in the format is explicit, via
//! [`write_pad_bits`](BitBuffer::write_pad_bits) and
//! [`read_pad_bits`](BitBuffer::read_pad_bits). Both sides of a
//! connection must pad at exactly the same points.
//!
//! ```text
//! write_bool(true); write_u8(0xAB)
//!
//!   byte 0                    byte 1
//!   7 6 5 4 3 2 1 0           7 6 5 4 3 2 1 0
//!   1 0 1 0 1 1 0|1           . . . . . . . 1
//!   └── low 7 bits of 0xAB ─┘ │           └ high bit of 0xAB
//!                          bool
//! ```

use crate::ProtocolError;

/// Largest encoded size of a variable-length `u32`.
const MAX_VAR_U32_BYTES: usize = 5;

/// Number of bits needed to hold every value in `0..=range`.
///
/// A zero-width range still takes one bit on the wire.
pub fn bits_to_hold(range: u32) -> u32 {
    (u32::BITS - range.leading_zeros()).max(1)
}

/// A growable, bit-addressed buffer with a single read/write cursor.
///
/// `length_bits` is the high-water mark of everything written (or, for a
/// received buffer, the number of bits received). Reads never go past it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitBuffer {
    data: Vec<u8>,
    seek_pos: usize,
    length_bits: usize,
}

impl BitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `bytes` bytes.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            ..Self::default()
        }
    }

    /// Wraps received bytes for reading. The cursor starts at bit 0.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let length_bits = data.len() * 8;
        Self {
            data,
            seek_pos: 0,
            length_bits,
        }
    }

    // -- Cursor -----------------------------------------------------------

    pub fn bit_position(&self) -> usize {
        self.seek_pos
    }

    /// Moves the cursor. Seeking past the current length extends it with
    /// zero bits, so the length never trails the cursor.
    pub fn set_bit_position(&mut self, position: usize) {
        self.ensure_capacity(position);
        self.length_bits = self.length_bits.max(position);
        self.seek_pos = position;
    }

    pub fn byte_position(&self) -> usize {
        self.seek_pos / 8
    }

    pub fn length_bits(&self) -> usize {
        self.length_bits
    }

    /// Truncates or extends the recorded length. The cursor is clamped so
    /// it never sits past the end.
    pub fn set_length_bits(&mut self, length_bits: usize) {
        self.ensure_capacity(length_bits);
        self.length_bits = length_bits;
        self.seek_pos = self.seek_pos.min(length_bits);
    }

    /// Length rounded up to whole bytes.
    pub fn length_bytes(&self) -> usize {
        self.length_bits.div_ceil(8)
    }

    /// Bits left between the cursor and the end.
    pub fn remaining_bits(&self) -> usize {
        self.length_bits.saturating_sub(self.seek_pos)
    }

    /// The written bytes, `length_bytes()` long.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.length_bytes()]
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.data.truncate(self.length_bytes());
        self.data
    }

    fn ensure_capacity(&mut self, end_bit: usize) {
        let needed = end_bit.div_ceil(8);
        if self.data.len() < needed {
            self.data.resize(needed, 0);
        }
    }

    fn ensure_readable(&self, bits: usize) -> Result<(), ProtocolError> {
        if self.seek_pos + bits > self.length_bits {
            return Err(ProtocolError::ReadPastEnd {
                position: self.seek_pos,
                requested: bits,
                length: self.length_bits,
            });
        }
        Ok(())
    }

    /// Runs a compound read and rewinds the cursor if any part fails.
    fn rewind_on_error<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        let start = self.seek_pos;
        let result = read(self);
        if result.is_err() {
            self.seek_pos = start;
        }
        result
    }

    // -- Writing ----------------------------------------------------------

    /// Writes the low `bit_count` bits of `value` (at most 64).
    pub fn write_bits(&mut self, value: u64, bit_count: u32) {
        debug_assert!(bit_count <= u64::BITS);
        let end = self.seek_pos + bit_count as usize;
        self.ensure_capacity(end);

        let mut value = value;
        let mut remaining = bit_count;
        let mut pos = self.seek_pos;
        while remaining > 0 {
            let bit_offset = (pos % 8) as u32;
            let take = (8 - bit_offset).min(remaining);
            let mask = ((1u16 << take) - 1) as u8;
            let byte = &mut self.data[pos / 8];
            *byte = (*byte & !(mask << bit_offset)) | (((value as u8) & mask) << bit_offset);
            value = value.checked_shr(take).unwrap_or(0);
            remaining -= take;
            pos += take as usize;
        }

        self.seek_pos = end;
        self.length_bits = self.length_bits.max(end);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bits(u64::from(value), 1);
    }

    /// Advances to the next byte boundary, leaving the skipped bits zero.
    pub fn write_pad_bits(&mut self) {
        let pad = (8 - self.seek_pos % 8) % 8;
        self.write_bits(0, pad as u32);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bits(u64::from(value), 8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bits(u64::from(value), 16);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bits(u64::from(value), 32);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bits(value, 64);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_u64(value as u64);
    }

    /// Writes the raw IEEE 754 bit pattern, so every value (NaN payloads
    /// and signed zeros included) survives exactly.
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    /// Writes `value` in 7-bit groups, low group first, with the high bit
    /// of each byte set while more groups follow. Returns the byte count.
    pub fn write_var_u32(&mut self, value: u32) -> usize {
        let mut value = value;
        let mut written = 1;
        while value >= 0x80 {
            self.write_u8((value as u8) | 0x80);
            value >>= 7;
            written += 1;
        }
        self.write_u8(value as u8);
        written
    }

    /// Writes a varint byte count followed by the UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) {
        self.write_var_u32(value.len() as u32);
        self.write_bytes(value.as_bytes());
    }

    /// Copies bytes verbatim at the current bit.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.seek_pos % 8 == 0 {
            let start = self.seek_pos / 8;
            let end = self.seek_pos + bytes.len() * 8;
            self.ensure_capacity(end);
            self.data[start..start + bytes.len()].copy_from_slice(bytes);
            self.seek_pos = end;
            self.length_bits = self.length_bits.max(end);
        } else {
            for &byte in bytes {
                self.write_u8(byte);
            }
        }
    }

    /// Writes `value - min` in the fewest bits that cover `max - min`.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidRange`] if `min > max`,
    /// [`ProtocolError::OutOfRange`] if `value` is outside `[min, max]`.
    pub fn write_ranged_integer(
        &mut self,
        value: i32,
        min: i32,
        max: i32,
    ) -> Result<(), ProtocolError> {
        let range = integer_range(min, max)?;
        if !(min..=max).contains(&value) {
            return Err(ProtocolError::OutOfRange {
                value: f64::from(value),
                min: f64::from(min),
                max: f64::from(max),
            });
        }
        let offset = (i64::from(value) - i64::from(min)) as u64;
        self.write_bits(offset, bits_to_hold(range));
        Ok(())
    }

    /// Quantizes `value` onto `0..=2^bit_count - 1` and writes it in
    /// `bit_count` bits. Lossy: the decoded value is within
    /// `(max - min) / 2^bit_count` of the original.
    pub fn write_ranged_float(
        &mut self,
        value: f32,
        min: f32,
        max: f32,
        bit_count: u32,
    ) -> Result<(), ProtocolError> {
        let max_step = float_steps(min, max, bit_count)?;
        if !(min..=max).contains(&value) {
            return Err(ProtocolError::OutOfRange {
                value: f64::from(value),
                min: f64::from(min),
                max: f64::from(max),
            });
        }
        let unit = (f64::from(value) - f64::from(min)) / (f64::from(max) - f64::from(min));
        let step = ((unit * max_step as f64).round() as u64).min(max_step);
        self.write_bits(step, bit_count);
        Ok(())
    }

    // -- Reading ----------------------------------------------------------

    /// Reads `bit_count` bits (at most 64) into the low end of a `u64`.
    pub fn read_bits(&mut self, bit_count: u32) -> Result<u64, ProtocolError> {
        debug_assert!(bit_count <= u64::BITS);
        self.ensure_readable(bit_count as usize)?;

        let mut result = 0u64;
        let mut read = 0u32;
        let mut pos = self.seek_pos;
        while read < bit_count {
            let bit_offset = (pos % 8) as u32;
            let take = (8 - bit_offset).min(bit_count - read);
            let mask = ((1u16 << take) - 1) as u8;
            let chunk = (self.data[pos / 8] >> bit_offset) & mask;
            result |= u64::from(chunk) << read;
            read += take;
            pos += take as usize;
        }

        self.seek_pos = pos;
        Ok(result)
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_bits(1)? != 0)
    }

    pub fn read_pad_bits(&mut self) -> Result<(), ProtocolError> {
        let pad = (8 - self.seek_pos % 8) % 8;
        self.ensure_readable(pad)?;
        self.seek_pos += pad;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(self.read_bits(32)? as u32)
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        self.read_bits(64)
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_var_u32(&mut self) -> Result<u32, ProtocolError> {
        self.rewind_on_error(|buf| {
            let mut value = 0u32;
            for i in 0..MAX_VAR_U32_BYTES {
                let byte = buf.read_u8()?;
                value |= u32::from(byte & 0x7f) << (7 * i);
                if byte & 0x80 == 0 {
                    return Ok(value);
                }
            }
            Err(ProtocolError::MalformedVarInt)
        })
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// A declared length longer than the rest of the message fails the
    /// read without consuming anything, including the prefix.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        self.rewind_on_error(|buf| {
            let len = buf.read_var_u32()? as usize;
            if len == 0 {
                return Ok(String::new());
            }
            let bytes = buf.read_bytes(len)?;
            Ok(String::from_utf8(bytes)?)
        })
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, ProtocolError> {
        self.ensure_readable(count.saturating_mul(8))?;
        if self.seek_pos % 8 == 0 {
            let start = self.seek_pos / 8;
            self.seek_pos += count * 8;
            return Ok(self.data[start..start + count].to_vec());
        }
        (0..count).map(|_| self.read_u8()).collect()
    }

    pub fn read_ranged_integer(&mut self, min: i32, max: i32) -> Result<i32, ProtocolError> {
        let range = integer_range(min, max)?;
        self.rewind_on_error(|buf| {
            let offset = buf.read_bits(bits_to_hold(range))?;
            if offset > u64::from(range) {
                return Err(ProtocolError::OutOfRange {
                    value: f64::from(min) + offset as f64,
                    min: f64::from(min),
                    max: f64::from(max),
                });
            }
            Ok((i64::from(min) + offset as i64) as i32)
        })
    }

    pub fn read_ranged_float(
        &mut self,
        min: f32,
        max: f32,
        bit_count: u32,
    ) -> Result<f32, ProtocolError> {
        let max_step = float_steps(min, max, bit_count)?;
        let step = self.read_bits(bit_count)?;
        let range = f64::from(max) - f64::from(min);
        Ok((f64::from(min) + range * step as f64 / max_step as f64) as f32)
    }
}

fn integer_range(min: i32, max: i32) -> Result<u32, ProtocolError> {
    if min > max {
        return Err(ProtocolError::InvalidRange {
            min: f64::from(min),
            max: f64::from(max),
        });
    }
    Ok((i64::from(max) - i64::from(min)) as u32)
}

/// Validates a float range and returns the largest quantization step.
fn float_steps(min: f32, max: f32, bit_count: u32) -> Result<u64, ProtocolError> {
    if !(1..=32).contains(&bit_count) {
        return Err(ProtocolError::InvalidBitCount(bit_count));
    }
    if !(min.is_finite() && max.is_finite() && min < max) {
        return Err(ProtocolError::InvalidRange {
            min: f64::from(min),
            max: f64::from(max),
        });
    }
    Ok((1u64 << bit_count) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A buffer whose cursor sits `offset` bits in, after junk bools.
    fn at_offset(offset: usize) -> BitBuffer {
        let mut buf = BitBuffer::new();
        for i in 0..offset {
            buf.write_bool(i % 2 == 0);
        }
        buf
    }

    /// Rewinds to `offset` for reading back what followed the junk bits.
    fn rewind(buf: &mut BitBuffer, offset: usize) {
        buf.set_bit_position(offset);
    }

    // =====================================================================
    // Layout
    // =====================================================================

    #[test]
    fn test_write_bool_then_byte_straddles_lsb_first() {
        let mut buf = BitBuffer::new();
        buf.write_bool(true);
        buf.write_u8(0xFF);

        assert_eq!(buf.as_bytes(), &[0xFF, 0x01]);
        assert_eq!(buf.length_bits(), 9);
        assert_eq!(buf.length_bytes(), 2);
    }

    #[test]
    fn test_write_u32_aligned_is_little_endian() {
        let mut buf = BitBuffer::new();
        buf.write_u32(0x1122_3344);
        assert_eq!(buf.as_bytes(), &[0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn test_overwrite_replaces_bits_without_touching_neighbours() {
        let mut buf = BitBuffer::new();
        buf.write_u16(0xFFFF);
        buf.set_bit_position(4);
        buf.write_bits(0, 4);

        assert_eq!(buf.as_bytes(), &[0x0F, 0xFF]);
        assert_eq!(buf.length_bits(), 16, "high-water mark is kept");
    }

    // =====================================================================
    // Round trips at every bit offset
    // =====================================================================

    #[test]
    fn test_integers_round_trip_at_every_offset() {
        for offset in 0..8 {
            let mut buf = at_offset(offset);
            buf.write_u8(0xA5);
            buf.write_u16(0xBEEF);
            buf.write_i16(-12345);
            buf.write_u32(0xDEAD_BEEF);
            buf.write_i32(i32::MIN);
            buf.write_u64(u64::MAX - 1);
            buf.write_i64(-9_876_543_210);

            assert_eq!(buf.length_bits(), offset + 8 + 16 + 16 + 32 + 32 + 64 + 64);

            rewind(&mut buf, offset);
            assert_eq!(buf.read_u8().unwrap(), 0xA5, "offset {offset}");
            assert_eq!(buf.read_u16().unwrap(), 0xBEEF, "offset {offset}");
            assert_eq!(buf.read_i16().unwrap(), -12345, "offset {offset}");
            assert_eq!(buf.read_u32().unwrap(), 0xDEAD_BEEF, "offset {offset}");
            assert_eq!(buf.read_i32().unwrap(), i32::MIN, "offset {offset}");
            assert_eq!(buf.read_u64().unwrap(), u64::MAX - 1, "offset {offset}");
            assert_eq!(buf.read_i64().unwrap(), -9_876_543_210, "offset {offset}");
            assert_eq!(buf.remaining_bits(), 0);
        }
    }

    #[test]
    fn test_integer_extremes_round_trip_unaligned() {
        let mut buf = at_offset(3);
        for v in [0u64, 1, u64::MAX, 1 << 63, 0x0123_4567_89AB_CDEF] {
            buf.write_u64(v);
        }
        rewind(&mut buf, 3);
        for v in [0u64, 1, u64::MAX, 1 << 63, 0x0123_4567_89AB_CDEF] {
            assert_eq!(buf.read_u64().unwrap(), v);
        }
    }

    #[test]
    fn test_floats_round_trip_bit_exact() {
        let values = [
            0.0f32,
            -0.0,
            1.5,
            -3.402_823_5e38,
            f32::MIN_POSITIVE / 2.0, // subnormal
            f32::INFINITY,
            f32::NEG_INFINITY,
            f32::from_bits(0x7FC0_1234), // NaN with payload
        ];
        for offset in 0..8 {
            let mut buf = at_offset(offset);
            for v in values {
                buf.write_f32(v);
            }
            rewind(&mut buf, offset);
            for v in values {
                assert_eq!(buf.read_f32().unwrap().to_bits(), v.to_bits());
            }
        }
    }

    #[test]
    fn test_doubles_round_trip_bit_exact() {
        let values = [
            0.0f64,
            -0.0,
            std::f64::consts::PI,
            f64::MAX,
            f64::from_bits(0x7FF8_0000_0000_BEEF),
        ];
        for offset in 0..8 {
            let mut buf = at_offset(offset);
            for v in values {
                buf.write_f64(v);
            }
            rewind(&mut buf, offset);
            for v in values {
                assert_eq!(buf.read_f64().unwrap().to_bits(), v.to_bits());
            }
        }
    }

    #[test]
    fn test_strings_round_trip_including_multibyte() {
        let values = ["", "a", "Captain", "Łódź ⚓ 潜水艦 🚢", &"x".repeat(300)];
        for offset in 0..8 {
            let mut buf = at_offset(offset);
            for v in values {
                buf.write_string(v);
            }
            rewind(&mut buf, offset);
            for v in values {
                assert_eq!(buf.read_string().unwrap(), v);
            }
        }
    }

    #[test]
    fn test_empty_string_is_a_single_zero_prefix() {
        let mut buf = BitBuffer::new();
        buf.write_string("");
        assert_eq!(buf.as_bytes(), &[0]);
    }

    #[test]
    fn test_bytes_round_trip_unaligned() {
        let payload: Vec<u8> = (0..=255).collect();
        let mut buf = at_offset(5);
        buf.write_bytes(&payload);
        rewind(&mut buf, 5);
        assert_eq!(buf.read_bytes(payload.len()).unwrap(), payload);
    }

    // =====================================================================
    // Variable-length integers
    // =====================================================================

    #[test]
    fn test_var_u32_byte_counts() {
        let cases = [
            (0u32, 1usize),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (u32::MAX, 5),
        ];
        for (value, expected) in cases {
            let mut buf = BitBuffer::new();
            assert_eq!(buf.write_var_u32(value), expected, "value {value}");
            assert_eq!(buf.length_bytes(), expected);
            buf.set_bit_position(0);
            assert_eq!(buf.read_var_u32().unwrap(), value);
        }
    }

    #[test]
    fn test_var_u32_with_six_continuation_bytes_is_malformed() {
        let mut buf = BitBuffer::from_bytes(vec![0xFF; 6]);
        assert!(matches!(buf.read_var_u32(), Err(ProtocolError::MalformedVarInt)));
        assert_eq!(buf.bit_position(), 0, "failed read must not consume");
    }

    #[test]
    fn test_var_u32_truncated_fails() {
        let mut buf = BitBuffer::from_bytes(vec![0x80, 0x80]);
        assert!(matches!(
            buf.read_var_u32(),
            Err(ProtocolError::ReadPastEnd { .. })
        ));
        assert_eq!(buf.bit_position(), 0);
    }

    // =====================================================================
    // Ranged integers
    // =====================================================================

    #[test]
    fn test_bits_to_hold() {
        assert_eq!(bits_to_hold(0), 1);
        assert_eq!(bits_to_hold(1), 1);
        assert_eq!(bits_to_hold(2), 2);
        assert_eq!(bits_to_hold(3), 2);
        assert_eq!(bits_to_hold(4), 3);
        assert_eq!(bits_to_hold(100), 7);
        assert_eq!(bits_to_hold(u32::MAX), 32);
    }

    #[test]
    fn test_ranged_integer_every_value_and_bit_cost() {
        for (min, max) in [(0, 2), (-5, 5), (0, 100), (7, 7), (-1000, 24)] {
            let expected_bits = bits_to_hold((max - min) as u32) as usize;
            for v in min..=max {
                let mut buf = BitBuffer::new();
                buf.write_ranged_integer(v, min, max).unwrap();
                assert_eq!(buf.length_bits(), expected_bits, "[{min}, {max}]");

                buf.set_bit_position(0);
                assert_eq!(buf.read_ranged_integer(min, max).unwrap(), v);
            }
        }
    }

    #[test]
    fn test_ranged_integer_zero_width_range_costs_one_bit() {
        let mut buf = BitBuffer::new();
        buf.write_ranged_integer(7, 7, 7).unwrap();
        assert_eq!(buf.length_bits(), 1);
    }

    #[test]
    fn test_ranged_integer_full_i32_range_uses_32_bits() {
        let mut buf = BitBuffer::new();
        buf.write_ranged_integer(-1, i32::MIN, i32::MAX).unwrap();
        assert_eq!(buf.length_bits(), 32);
        buf.set_bit_position(0);
        assert_eq!(buf.read_ranged_integer(i32::MIN, i32::MAX).unwrap(), -1);
    }

    #[test]
    fn test_ranged_integer_rejects_out_of_range_value() {
        let mut buf = BitBuffer::new();
        let result = buf.write_ranged_integer(101, 0, 100);
        assert!(matches!(result, Err(ProtocolError::OutOfRange { .. })));
        assert_eq!(buf.length_bits(), 0, "nothing written on error");
    }

    #[test]
    fn test_ranged_integer_rejects_inverted_range() {
        let mut buf = BitBuffer::new();
        assert!(matches!(
            buf.write_ranged_integer(0, 5, 1),
            Err(ProtocolError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_read_ranged_integer_above_range_is_malformed() {
        // Range 0..=4 takes 3 bits; raw 7 can't be a valid encoding.
        let mut buf = BitBuffer::new();
        buf.write_bits(7, 3);
        buf.set_bit_position(0);
        assert!(matches!(
            buf.read_ranged_integer(0, 4),
            Err(ProtocolError::OutOfRange { .. })
        ));
        assert_eq!(buf.bit_position(), 0);
    }

    #[test]
    fn test_ranged_integer_then_bool_packs_into_one_byte() {
        let mut buf = BitBuffer::new();
        buf.write_ranged_integer(42, 0, 100).unwrap();
        buf.write_bool(true);
        assert_eq!(buf.length_bits(), 8);

        buf.set_bit_position(0);
        let value = buf.read_ranged_integer(0, 100).unwrap();
        let flag = buf.read_bool().unwrap();
        assert_eq!((value, flag), (42, true));
        assert_eq!(buf.bit_position(), 8);
    }

    // =====================================================================
    // Ranged floats
    // =====================================================================

    #[test]
    fn test_ranged_float_error_is_bounded() {
        let cases = [(0.0f32, 1.0f32, 8u32), (-100.0, 100.0, 10), (0.0, 360.0, 16), (-1.0, 1.0, 1)];
        for (min, max, bits) in cases {
            let bound = (max - min) / (1u64 << bits) as f32;
            for i in 0..=200 {
                let v = min + (max - min) * i as f32 / 200.0;
                let mut buf = BitBuffer::new();
                buf.write_ranged_float(v, min, max, bits).unwrap();
                assert_eq!(buf.length_bits(), bits as usize);

                buf.set_bit_position(0);
                let decoded = buf.read_ranged_float(min, max, bits).unwrap();
                assert!(
                    (decoded - v).abs() <= bound,
                    "v={v} decoded={decoded} bound={bound} bits={bits}"
                );
            }
        }
    }

    #[test]
    fn test_ranged_float_endpoints_are_exact() {
        let mut buf = BitBuffer::new();
        buf.write_ranged_float(-5.0, -5.0, 5.0, 12).unwrap();
        buf.write_ranged_float(5.0, -5.0, 5.0, 12).unwrap();
        buf.set_bit_position(0);
        assert_eq!(buf.read_ranged_float(-5.0, 5.0, 12).unwrap(), -5.0);
        assert_eq!(buf.read_ranged_float(-5.0, 5.0, 12).unwrap(), 5.0);
    }

    #[test]
    fn test_ranged_float_rejects_bad_arguments() {
        let mut buf = BitBuffer::new();
        assert!(matches!(
            buf.write_ranged_float(0.5, 0.0, 1.0, 0),
            Err(ProtocolError::InvalidBitCount(0))
        ));
        assert!(matches!(
            buf.write_ranged_float(0.5, 0.0, 1.0, 33),
            Err(ProtocolError::InvalidBitCount(33))
        ));
        assert!(matches!(
            buf.write_ranged_float(0.5, 1.0, 1.0, 8),
            Err(ProtocolError::InvalidRange { .. })
        ));
        assert!(matches!(
            buf.write_ranged_float(f32::NAN, 0.0, 1.0, 8),
            Err(ProtocolError::OutOfRange { .. })
        ));
        assert!(matches!(
            buf.write_ranged_float(1.5, 0.0, 1.0, 8),
            Err(ProtocolError::OutOfRange { .. })
        ));
    }

    // =====================================================================
    // Padding and cursor control
    // =====================================================================

    #[test]
    fn test_pad_bits_advance_to_byte_boundary() {
        let mut buf = BitBuffer::new();
        buf.write_bool(true);
        buf.write_pad_bits();
        assert_eq!(buf.bit_position(), 8);
        buf.write_pad_bits();
        assert_eq!(buf.bit_position(), 8, "already aligned: no-op");
        buf.write_u8(0x42);

        buf.set_bit_position(0);
        assert!(buf.read_bool().unwrap());
        buf.read_pad_bits().unwrap();
        assert_eq!(buf.read_u8().unwrap(), 0x42);
    }

    #[test]
    fn test_set_length_bits_clamps_cursor() {
        let mut buf = BitBuffer::new();
        buf.write_u32(1);
        buf.set_length_bits(10);
        assert_eq!(buf.bit_position(), 10);
        assert_eq!(buf.length_bytes(), 2);
    }

    #[test]
    fn test_set_bit_position_past_end_extends_length() {
        let mut buf = BitBuffer::new();
        buf.write_u8(1);
        buf.set_bit_position(24);

        assert!(buf.length_bits() >= buf.bit_position());
        assert_eq!(buf.length_bits(), 24);
        assert_eq!(buf.as_bytes(), &[1, 0, 0]);

        buf.write_u8(7);
        assert_eq!(buf.into_bytes(), vec![1, 0, 0, 7]);
    }

    #[test]
    fn test_set_bit_position_backwards_keeps_length() {
        let mut buf = BitBuffer::new();
        buf.write_u32(0xDEAD_BEEF);
        buf.set_bit_position(8);

        assert_eq!(buf.length_bits(), 32);
        assert_eq!(buf.remaining_bits(), 24);
    }

    // =====================================================================
    // Malformed input
    // =====================================================================

    #[test]
    fn test_read_past_end_fails_without_consuming() {
        let mut buf = BitBuffer::from_bytes(vec![0x01, 0x02]);
        assert!(matches!(
            buf.read_u32(),
            Err(ProtocolError::ReadPastEnd { position: 0, requested: 32, length: 16 })
        ));
        assert_eq!(buf.read_u16().unwrap(), 0x0201);
    }

    #[test]
    fn test_truncated_string_fails_and_leaves_cursor() {
        let mut full = BitBuffer::new();
        full.write_bool(true);
        full.write_string("submarine");
        let mut bytes = full.into_bytes();
        bytes.truncate(4);

        let mut buf = BitBuffer::from_bytes(bytes);
        assert!(buf.read_bool().unwrap());
        let before = buf.bit_position();

        assert!(matches!(
            buf.read_string(),
            Err(ProtocolError::ReadPastEnd { .. })
        ));
        assert_eq!(buf.bit_position(), before, "prefix must not be consumed");
        // The length prefix is still readable on its own.
        assert_eq!(buf.read_var_u32().unwrap(), 9);
    }

    #[test]
    fn test_invalid_utf8_string_is_rejected() {
        let mut buf = BitBuffer::new();
        buf.write_var_u32(2);
        buf.write_bytes(&[0xC3, 0x28]);
        buf.set_bit_position(0);
        assert!(matches!(buf.read_string(), Err(ProtocolError::InvalidUtf8(_))));
        assert_eq!(buf.bit_position(), 0);
    }
}
