// Request/Response models
pub mod common;
pub mod credits;
pub mod grant_ext; // Extension methods for entity::credit_grants
