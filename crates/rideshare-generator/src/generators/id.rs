//! Entity identifier generator.

use geo_core::{EntityId, EntityKind};
use rand::Rng;

/// Generate an identifier tagged with its home region and kind, filling the
/// remaining bytes from the provided RNG.
pub fn generate_entity_id<R: Rng>(rng: &mut R, region_ordinal: u8, kind: EntityKind) -> EntityId {
    let mut random = [0u8; 14];
    rng.fill(&mut random);
    EntityId::from_parts(region_ordinal, kind, random)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_id_is_tagged() {
        let mut rng = StdRng::seed_from_u64(42);
        let id = generate_entity_id(&mut rng, 3, EntityKind::Vehicle);
        assert_eq!(id.region_ordinal(), 3);
        assert_eq!(id.kind_tag(), EntityKind::Vehicle.tag());
        assert_eq!(id.as_uuid().get_version_num(), 8);
    }

    #[test]
    fn test_id_deterministic() {
        let mut rng1 = StdRng::seed_from_u64(42);
        let mut rng2 = StdRng::seed_from_u64(42);
        assert_eq!(
            generate_entity_id(&mut rng1, 0, EntityKind::Rider),
            generate_entity_id(&mut rng2, 0, EntityKind::Rider)
        );

        let next = generate_entity_id(&mut rng1, 0, EntityKind::Rider);
        assert_ne!(next, generate_entity_id(&mut rng1, 0, EntityKind::Rider));
    }

    #[test]
    fn test_different_seeds_differ() {
        let mut rng1 = StdRng::seed_from_u64(42);
        let mut rng2 = StdRng::seed_from_u64(43);
        assert_ne!(
            generate_entity_id(&mut rng1, 0, EntityKind::Ride),
            generate_entity_id(&mut rng2, 0, EntityKind::Ride)
        );
    }
}
