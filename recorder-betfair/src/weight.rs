//! Request weight model and batch planner
//!
//! The exchange charges each book request `weight(projection) * markets`
//! against a fixed per-call budget.

use recorder_core::PriceData;
use std::collections::BTreeSet;

/// Per-call weight budget for listMarketBook
pub const WEIGHT_BUDGET: u32 = 200;

/// Weight of a request with no price projection
const EMPTY_PROJECTION_WEIGHT: u32 = 2;

/// Discounted combinations, checked in order. The first match wins.
const COMBINED_WEIGHTS: [(&[PriceData], u32); 2] = [
    (&[PriceData::ExAllOffers, PriceData::ExTraded], 32),
    (&[PriceData::ExBestOffers, PriceData::ExTraded], 20),
];

pub fn field_weight(field: PriceData) -> u32 {
    match field {
        PriceData::ExBestOffers => 5,
        PriceData::ExAllOffers => 17,
        PriceData::ExTraded => 17,
        PriceData::SpAvailable => 3,
        PriceData::SpTraded => 7,
    }
}

/// Weight of one market under `fields`. Duplicates count once.
pub fn total_weight(fields: &[PriceData]) -> u32 {
    let mut remaining: BTreeSet<PriceData> = fields.iter().copied().collect();
    if remaining.is_empty() {
        return EMPTY_PROJECTION_WEIGHT;
    }

    let mut total = 0;
    if let Some((combo, weight)) = COMBINED_WEIGHTS
        .iter()
        .find(|(combo, _)| combo.iter().all(|f| remaining.contains(f)))
    {
        for field in combo.iter() {
            remaining.remove(field);
        }
        total += weight;
    }

    total + remaining.into_iter().map(field_weight).sum::<u32>()
}

/// Largest number of markets per request that stays within the budget, at least one
pub fn compute_batch_size(fields: &[PriceData]) -> usize {
    ((WEIGHT_BUDGET / total_weight(fields)) as usize).max(1)
}

/// Split `market_ids` into ordered batches of at most `batch_size`
pub fn plan_batches(market_ids: &[String], batch_size: usize) -> Vec<Vec<String>> {
    market_ids
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_subsets() -> Vec<Vec<PriceData>> {
        (0u32..(1 << PriceData::ALL.len()))
            .map(|mask| {
                PriceData::ALL
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, f)| *f)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_known_weights() {
        use PriceData::*;
        assert_eq!(total_weight(&[]), 2);
        assert_eq!(total_weight(&[ExBestOffers]), 5);
        assert_eq!(total_weight(&[ExAllOffers, ExTraded]), 32);
        assert_eq!(total_weight(&[ExTraded, ExBestOffers]), 20);
        // ALL+TRADED takes precedence, BEST is then summed
        assert_eq!(total_weight(&[ExBestOffers, ExAllOffers, ExTraded]), 37);
        assert_eq!(
            total_weight(&[ExBestOffers, ExAllOffers, ExTraded, SpAvailable, SpTraded]),
            47
        );
        assert_eq!(total_weight(&[SpTraded, SpTraded, SpAvailable]), 10);
    }

    #[test]
    fn test_batch_size_within_budget_for_every_projection() {
        for fields in all_subsets() {
            let weight = total_weight(&fields) as usize;
            let size = compute_batch_size(&fields);
            let budget = WEIGHT_BUDGET as usize;

            assert!(size >= 1);
            assert!(weight * size <= budget, "{:?}", fields);
            assert!(budget < weight * (size + 1), "{:?}", fields);
        }
    }

    #[test]
    fn test_default_projection_batch_size() {
        use PriceData::*;
        assert_eq!(
            compute_batch_size(&[ExBestOffers, ExAllOffers, ExTraded, SpAvailable, SpTraded]),
            4
        );
        assert_eq!(compute_batch_size(&[]), 100);
    }

    #[test]
    fn test_plan_batches_preserves_order() {
        let ids: Vec<String> = (0..11).map(|i| format!("1.{}", i)).collect();
        let batches = plan_batches(&ids, 4);

        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() <= 4));
        assert_eq!(batches[2].len(), 3);
        assert_eq!(batches.concat(), ids);
    }

    #[test]
    fn test_plan_batches_edges() {
        assert!(plan_batches(&[], 5).is_empty());
        let ids = vec!["1.1".to_string(), "1.2".to_string()];
        assert_eq!(plan_batches(&ids, 0).len(), 2);
    }
}
