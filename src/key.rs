//! Bit-packed cell key codec ([C1]).
//!
//! A cell is addressed by one element id per dimension. The codec packs
//! that tuple into a single `u64` using per-dimension bit-widths and
//! shifts fixed at cube construction time, so two distinct legal tuples
//! never collide.

use crate::error::{Error, Result};

/// An element identifier, unique within its owning dimension.
pub type ElementId = u32;

/// Sentinel meaning "no element" (e.g. an absent parent).
pub const NO_ELEMENT: ElementId = u32::MAX;

/// Sentinel used by [`crate::area::Area`] to mark "every element of this
/// dimension" before it is resolved against a concrete dimension.
pub const ALL_ELEMENTS: ElementId = u32::MAX - 1;

fn bit_width(max_id: ElementId) -> u32 {
    // width = ceil(log2(max_id + 1)), at least 1 bit so id 0 is still addressable
    let span = u64::from(max_id) + 1;
    (64 - (span - 1).leading_zeros()).max(1)
}

/// One dimension's slot in the packed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyField {
    pub dim_pos: u32,
    pub width: u32,
    pub mask: u64,
}

/// Fixed per-cube layout mapping dimension index to bit field.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    fields: Vec<KeyField>,
}

impl KeyCodec {
    /// Builds a codec for an ordered list of dimensions, given each
    /// dimension's maximum element id.
    ///
    /// Fails with [`Error::Internal`] if the fields would not fit in 64 bits.
    pub fn new(max_ids: &[ElementId]) -> Result<Self> {
        let mut fields = Vec::with_capacity(max_ids.len());
        let mut pos = 0u32;

        for &max_id in max_ids {
            assert!(
                max_id < ALL_ELEMENTS,
                "element id collides with a reserved sentinel"
            );

            let width = bit_width(max_id);
            if pos as u64 + u64::from(width) > 64 {
                return Err(Error::Internal(format!(
                    "packed key would need {} bits, at most 64 are available",
                    pos as u64 + u64::from(width)
                )));
            }

            let mask = if width == 64 {
                u64::MAX
            } else {
                (1u64 << width) - 1
            };

            fields.push(KeyField {
                dim_pos: pos,
                width,
                mask,
            });
            pos += width;
        }

        Ok(Self { fields })
    }

    #[must_use]
    pub fn dim_count(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn field(&self, dim: usize) -> KeyField {
        self.fields[dim]
    }

    /// Packs a tuple of per-dimension element ids into one key.
    #[must_use]
    pub fn encode(&self, ids: &[ElementId]) -> u64 {
        debug_assert_eq!(ids.len(), self.fields.len());

        let mut key = 0u64;
        for (id, field) in ids.iter().zip(&self.fields) {
            key |= (u64::from(*id) & field.mask) << field.dim_pos;
        }
        key
    }

    /// Unpacks a key into its per-dimension tuple.
    #[must_use]
    pub fn decode(&self, key: u64) -> Vec<ElementId> {
        self.fields
            .iter()
            .map(|field| ((key >> field.dim_pos) & field.mask) as ElementId)
            .collect()
    }

    /// Unpacks just one dimension's id out of a key, without allocating.
    #[must_use]
    pub fn decode_dim(&self, key: u64, dim: usize) -> ElementId {
        let field = self.fields[dim];
        ((key >> field.dim_pos) & field.mask) as ElementId
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn round_trip_single_dim() {
        let codec = KeyCodec::new(&[10]).unwrap();
        for id in 0..=10 {
            let key = codec.encode(&[id]);
            assert_eq!(codec.decode(key), vec![id]);
        }
    }

    #[test]
    fn round_trip_multi_dim() {
        let codec = KeyCodec::new(&[3, 1000, 7]).unwrap();
        let tuples = [[0, 0, 0], [3, 1000, 7], [1, 500, 4], [2, 1, 0]];
        for tuple in tuples {
            let key = codec.encode(&tuple);
            assert_eq!(codec.decode(key), tuple.to_vec());
        }
    }

    #[test]
    fn distinct_tuples_never_collide() {
        let codec = KeyCodec::new(&[4, 4]).unwrap();
        let mut seen = std::collections::HashSet::new();
        for a in 0..=4 {
            for b in 0..=4 {
                let key = codec.encode(&[a, b]);
                assert!(seen.insert(key), "collision for ({a}, {b})");
            }
        }
    }

    #[test]
    fn overflow_is_rejected() {
        // 33 bits * 2 > 64
        let big = 1u32 << 32;
        let err = KeyCodec::new(&[big.wrapping_sub(1), big.wrapping_sub(1)]);
        assert!(err.is_err());
    }

    #[test]
    fn single_bit_width_for_boolean_dimension() {
        let codec = KeyCodec::new(&[1]).unwrap();
        assert_eq!(codec.field(0).width, 1);
    }
}
