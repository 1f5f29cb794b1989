//! # Tick Bitmap
//!
//! One bit per usable tick (tick / spacing), packed into 256-bit words keyed
//! by word index. Words with no set bits are not stored, so a sparse pool
//! pays nothing for the empty price space between its positions.

use std::collections::BTreeMap;

use defione_types::{CoreResult, EngineError, U256};
use serde::{Deserialize, Serialize};

/// Sparse bitmap of initialized ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickBitmap {
    words: BTreeMap<i16, U256>,
}

/// Word index and bit offset of a compressed tick.
fn position(compressed: i32) -> (i16, u8) {
    // arithmetic shift floors toward negative infinity, matching the
    // two's-complement bit offset below
    ((compressed >> 8) as i16, (compressed & 0xff) as u8)
}

impl TickBitmap {
    /// Toggle the bit for `tick`, which must be a multiple of `tick_spacing`.
    pub fn flip_tick(&mut self, tick: i32, tick_spacing: i32) -> CoreResult<()> {
        if tick % tick_spacing != 0 {
            return Err(EngineError::InvalidTickRange);
        }
        let (word_pos, bit_pos) = position(tick / tick_spacing);
        let mask = U256::one() << bit_pos;
        let word = self.words.entry(word_pos).or_default();
        *word = *word ^ mask;
        if word.is_zero() {
            self.words.remove(&word_pos);
        }
        Ok(())
    }

    /// Whether the bit for `tick` is set. Test and diagnostics helper.
    pub fn is_initialized(&self, tick: i32, tick_spacing: i32) -> bool {
        if tick % tick_spacing != 0 {
            return false;
        }
        let (word_pos, bit_pos) = position(tick / tick_spacing);
        self.words
            .get(&word_pos)
            .map(|word| !(*word & (U256::one() << bit_pos)).is_zero())
            .unwrap_or(false)
    }

    /// Next initialized tick within the same 256-bit word, searching left
    /// (at or below `tick`) when `lte` is set, otherwise strictly above.
    ///
    /// Returns the candidate tick and whether it is actually initialized;
    /// an uninitialized result marks the end of the word and callers step
    /// from there into the adjacent word on the next iteration.
    pub fn next_initialized_tick_within_one_word(
        &self,
        tick: i32,
        tick_spacing: i32,
        lte: bool,
    ) -> (i32, bool) {
        let compressed = tick.div_euclid(tick_spacing);

        if lte {
            let (word_pos, bit_pos) = position(compressed);
            let word = self.words.get(&word_pos).copied().unwrap_or_default();
            // bits at or below bit_pos
            let mask = ((U256::one() << bit_pos) - U256::one()) | (U256::one() << bit_pos);
            let masked = word & mask;
            if masked.is_zero() {
                ((compressed - bit_pos as i32) * tick_spacing, false)
            } else {
                let msb = 255 - masked.leading_zeros() as i32;
                (
                    (compressed - (bit_pos as i32 - msb)) * tick_spacing,
                    true,
                )
            }
        } else {
            let (word_pos, bit_pos) = position(compressed + 1);
            let word = self.words.get(&word_pos).copied().unwrap_or_default();
            // bits at or above bit_pos
            let mask = !((U256::one() << bit_pos) - U256::one());
            let masked = word & mask;
            if masked.is_zero() {
                ((compressed + 1 + (255 - bit_pos as i32)) * tick_spacing, false)
            } else {
                let lsb = masked.trailing_zeros() as i32;
                (
                    (compressed + 1 + (lsb - bit_pos as i32)) * tick_spacing,
                    true,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_sets_and_clears() {
        let mut bitmap = TickBitmap::default();
        assert!(!bitmap.is_initialized(60, 60));
        bitmap.flip_tick(60, 60).unwrap();
        assert!(bitmap.is_initialized(60, 60));
        bitmap.flip_tick(60, 60).unwrap();
        assert!(!bitmap.is_initialized(60, 60));
        // empty words are pruned
        assert_eq!(bitmap, TickBitmap::default());
    }

    #[test]
    fn test_flip_rejects_unaligned_tick() {
        let mut bitmap = TickBitmap::default();
        assert_eq!(
            bitmap.flip_tick(61, 60),
            Err(EngineError::InvalidTickRange)
        );
    }

    #[test]
    fn test_flip_is_independent_per_tick() {
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(-240, 60).unwrap();
        bitmap.flip_tick(-300, 60).unwrap();
        assert!(bitmap.is_initialized(-240, 60));
        assert!(bitmap.is_initialized(-300, 60));
        assert!(!bitmap.is_initialized(-180, 60));
    }

    #[test]
    fn test_next_tick_lte_finds_self() {
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(-60, 60).unwrap();
        let (next, initialized) = bitmap.next_initialized_tick_within_one_word(-60, 60, true);
        assert_eq!((next, initialized), (-60, true));
    }

    #[test]
    fn test_next_tick_lte_searches_down() {
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(-120, 60).unwrap();
        let (next, initialized) = bitmap.next_initialized_tick_within_one_word(-61, 60, true);
        assert_eq!((next, initialized), (-120, true));
    }

    #[test]
    fn test_next_tick_gt_excludes_self() {
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(60, 60).unwrap();
        bitmap.flip_tick(120, 60).unwrap();
        let (next, initialized) = bitmap.next_initialized_tick_within_one_word(60, 60, false);
        assert_eq!((next, initialized), (120, true));
    }

    #[test]
    fn test_next_tick_empty_word_reports_boundary() {
        let bitmap = TickBitmap::default();
        let (next, initialized) = bitmap.next_initialized_tick_within_one_word(0, 1, true);
        assert_eq!((next, initialized), (0, false));
        let (next_up, initialized_up) = bitmap.next_initialized_tick_within_one_word(0, 1, false);
        assert_eq!(next_up, 255);
        assert!(!initialized_up);
    }

    #[test]
    fn test_next_tick_negative_unaligned_floors() {
        // -61 / 60 compresses to -2, so the search at or below -61 must not
        // see a bit set at -60.
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(-60, 60).unwrap();
        let (_, initialized) = bitmap.next_initialized_tick_within_one_word(-61, 60, true);
        assert!(!initialized);
    }
}
