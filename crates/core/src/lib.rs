pub mod audit;
pub mod clock;
pub mod config;
pub mod details;
pub mod diff;
pub mod edit;
pub mod entities;
pub mod enums;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod policy;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use edit::{Edit, EditComment, EditVote};
pub use enums::{EditStatus, Operation, Role, TargetType, VoteType};
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
