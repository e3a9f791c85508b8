pub mod record;
pub mod staged_file;
pub mod validation;

pub use record::{AttributeValue, Attributes, NodeRecord, RelationshipRecord};
pub use staged_file::{DatasetKind, StagedFile};
pub use validation::{ConsistencyStats, ValidationError, ValidationResult};
