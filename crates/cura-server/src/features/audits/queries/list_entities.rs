use cura_common::types::AuditEntity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListEntityTypesQuery;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListEntityTypesResponse(pub Vec<String>);

/// Names of every auditable entity type
pub fn handle(_query: ListEntityTypesQuery) -> ListEntityTypesResponse {
    ListEntityTypesResponse(AuditEntity::ALL.iter().map(|e| e.as_str().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_every_entity_type() {
        let ListEntityTypesResponse(names) = handle(ListEntityTypesQuery);
        assert_eq!(names.len(), AuditEntity::ALL.len());
        assert!(names.contains(&"Gene".to_string()));
        assert!(names.contains(&"Flag".to_string()));
    }
}
