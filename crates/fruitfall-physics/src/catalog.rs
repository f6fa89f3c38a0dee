//! The fixed fruit tier table.
//!
//! Tiers are indexed `0..=10`. Tier `n` merges only into tier `n + 1`; the
//! last tier never merges.

/// Tier index into [`FruitCatalog`].
pub type Tier = u8;

/// Static description of one fruit tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FruitTier {
    /// Display name.
    pub name: &'static str,
    /// Collision radius in board units.
    pub radius: f32,
    /// Color token used by renderers.
    pub color: &'static str,
    /// Points awarded when a fruit of this tier is produced by a merge.
    pub score: u32,
}

const fn tier(name: &'static str, radius: f32, color: &'static str, score: u32) -> FruitTier {
    FruitTier {
        name,
        radius,
        color,
        score,
    }
}

static TIERS: [FruitTier; 11] = [
    tier("cherry", 15.0, "#dc143c", 1),
    tier("strawberry", 20.0, "#ff6347", 3),
    tier("grape", 25.0, "#8b008b", 6),
    tier("lemon", 30.0, "#ffff00", 10),
    tier("orange", 35.0, "#ff8c00", 15),
    tier("apple", 40.0, "#ff0000", 21),
    tier("pear", 45.0, "#9acd32", 28),
    tier("peach", 50.0, "#ffb6c1", 36),
    tier("pineapple", 55.0, "#ffd700", 45),
    tier("coconut", 60.0, "#8b4513", 55),
    tier("watermelon", 65.0, "#228b22", 66),
];

/// Lookup table for the eleven fruit tiers.
pub struct FruitCatalog;

impl FruitCatalog {
    /// The highest tier. Fruits of this tier never merge.
    pub const MAX_TIER: Tier = 10;

    /// Tiers `0..DROPPABLE_TIERS` may be offered as the next drop.
    pub const DROPPABLE_TIERS: Tier = 5;

    /// Return the tier description, or `None` if `tier` is out of range.
    pub fn get(tier: Tier) -> Option<&'static FruitTier> {
        TIERS.get(tier as usize)
    }

    /// Number of tiers in the catalog.
    pub fn len() -> usize {
        TIERS.len()
    }

    /// All tiers in index order.
    pub fn tiers() -> &'static [FruitTier] {
        &TIERS
    }

    /// The tier produced by merging two fruits of `tier`, if any.
    pub fn merge_target(tier: Tier) -> Option<Tier> {
        if tier < Self::MAX_TIER {
            Some(tier + 1)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_eleven_tiers() {
        assert_eq!(FruitCatalog::len(), 11);
        assert!(FruitCatalog::get(10).is_some());
        assert!(FruitCatalog::get(11).is_none());
    }

    #[test]
    fn test_radii_grow_by_five() {
        for (i, t) in FruitCatalog::tiers().iter().enumerate() {
            assert_eq!(t.radius, 15.0 + 5.0 * i as f32, "tier {i}");
        }
    }

    #[test]
    fn test_scores_are_triangular() {
        let scores: Vec<u32> = FruitCatalog::tiers().iter().map(|t| t.score).collect();
        assert_eq!(scores, vec![1, 3, 6, 10, 15, 21, 28, 36, 45, 55, 66]);
    }

    #[test]
    fn test_last_tier_has_no_merge_target() {
        assert_eq!(FruitCatalog::merge_target(0), Some(1));
        assert_eq!(FruitCatalog::merge_target(9), Some(10));
        assert_eq!(FruitCatalog::merge_target(10), None);
    }

    #[test]
    fn test_names_and_colors() {
        let first = FruitCatalog::get(0).unwrap();
        assert_eq!(first.name, "cherry");
        assert_eq!(first.color, "#dc143c");
        let last = FruitCatalog::get(FruitCatalog::MAX_TIER).unwrap();
        assert_eq!(last.name, "watermelon");
        assert_eq!(last.color, "#228b22");
    }
}
