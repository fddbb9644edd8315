pub mod condition;
pub mod params;
pub mod schema;
pub mod steps;

pub use condition::ConditionSpec;
pub use params::{ParamDef, Params};
pub use schema::{OnFailure, RetryConfig, Scenario, SuccessCondition, TargetUrl};
pub use steps::{Step, Target};
