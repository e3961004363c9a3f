use crate::error::Error;
use crate::generic::object::DataVector;
use ark_ff::PrimeField;

/// Folds attestation deltas into a data vector.
///
/// The first `sum_field_count` fields accumulate by field addition. The rest are replaced by the
/// most recent write, so callers must feed changes in attestation index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregator {
    pub field_count: usize,
    pub sum_field_count: usize,
}

impl Aggregator {
    pub fn new(field_count: usize, sum_field_count: usize) -> Self {
        Self {
            field_count,
            sum_field_count,
        }
    }

    pub fn zero<F: PrimeField>(&self) -> DataVector<F> {
        vec![F::zero(); self.field_count]
    }

    pub fn is_summed(&self, field_index: usize) -> bool {
        field_index < self.sum_field_count
    }

    /// Applies a single change in place.
    pub fn apply<F: PrimeField>(
        &self,
        data: &mut [F],
        field_index: usize,
        change: F,
    ) -> Result<(), Error> {
        let slot = data
            .get_mut(field_index)
            .filter(|_| field_index < self.field_count)
            .ok_or(Error::FieldIndexOutOfRange {
                index: field_index,
                field_count: self.field_count,
            })?;
        if self.is_summed(field_index) {
            *slot += change;
        } else {
            *slot = change;
        }
        Ok(())
    }

    /// Folds `(field_index, change)` pairs, in order, starting from zero.
    pub fn aggregate<F: PrimeField>(
        &self,
        changes: impl IntoIterator<Item = (usize, F)>,
    ) -> Result<DataVector<F>, Error> {
        let mut data = self.zero();
        for (field_index, change) in changes {
            self.apply(&mut data, field_index, change)?;
        }
        Ok(data)
    }

    /// Write positions of the replace fields, one per field after the summed ones: `1 + index` of
    /// the latest attestation that wrote the field, or 0 if none did. Comparing positions orders
    /// replace writes made to different epoch keys the same way [`Aggregator::aggregate`] does.
    pub fn replace_positions(&self, writes: impl IntoIterator<Item = (usize, u64)>) -> Vec<u64> {
        let mut positions = vec![0; self.field_count.saturating_sub(self.sum_field_count)];
        for (field_index, index) in writes {
            let slot = field_index
                .checked_sub(self.sum_field_count)
                .and_then(|i| positions.get_mut(i));
            if let Some(slot) = slot {
                *slot = (*slot).max(index + 1);
            }
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Fr;

    #[test]
    fn sums_wrap_around_the_modulus() {
        let agg = Aggregator::new(2, 1);
        let minus_one = -Fr::from(1u64);
        let data = agg
            .aggregate([(0, minus_one), (0, Fr::from(3u64))])
            .unwrap();
        assert_eq!(data, vec![Fr::from(2u64), Fr::from(0u64)]);
    }

    #[test]
    fn replace_fields_keep_last_write() {
        let agg = Aggregator::new(3, 1);
        let data = agg
            .aggregate([
                (2, Fr::from(10u64)),
                (0, Fr::from(1u64)),
                (2, Fr::from(4u64)),
                (0, Fr::from(1u64)),
            ])
            .unwrap();
        assert_eq!(data, vec![Fr::from(2u64), Fr::from(0u64), Fr::from(4u64)]);
    }

    #[test]
    fn aggregation_is_repeatable() {
        let agg = Aggregator::new(4, 2);
        let changes = vec![
            (0, Fr::from(5u64)),
            (3, Fr::from(9u64)),
            (1, Fr::from(2u64)),
            (3, Fr::from(8u64)),
        ];
        let first = agg.aggregate(changes.clone()).unwrap();
        let second = agg.aggregate(changes).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[3], Fr::from(8u64));
    }

    #[test]
    fn replace_positions_track_latest_write() {
        let agg = Aggregator::new(4, 2);
        let positions = agg.replace_positions([(3, 7), (0, 9), (3, 2), (2, 0)]);
        assert_eq!(positions, vec![1, 8]);
        assert_eq!(agg.replace_positions([(1, 4)]), vec![0, 0]);
    }

    #[test]
    fn out_of_range_field_is_rejected() {
        let agg = Aggregator::new(2, 1);
        assert!(matches!(
            agg.aggregate([(2, Fr::from(1u64))]),
            Err(Error::FieldIndexOutOfRange { index: 2, field_count: 2 })
        ));
    }
}
