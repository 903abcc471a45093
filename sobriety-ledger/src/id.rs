//! Identifier generation

use crate::types::EntityId;
use uuid::Uuid;

/// Issues identifiers for new records
pub trait IdGenerator: Send + Sync {
    /// Fresh identifier, never returned before
    fn next_id(&self) -> EntityId;
}

/// Random v4 UUIDs from the operating system CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> EntityId {
        EntityId::from_uuid(Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_canonical_and_unique() {
        let generator = UuidGenerator;
        let ids: HashSet<_> = (0..1_000).map(|_| generator.next_id()).collect();
        assert_eq!(ids.len(), 1_000);

        for id in ids.iter().take(10) {
            let rendered = id.to_string();
            assert_eq!(EntityId::parse(&rendered), Some(*id));
            assert_eq!(rendered, rendered.to_lowercase());
        }
    }
}
