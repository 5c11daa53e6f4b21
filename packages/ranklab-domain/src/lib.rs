pub mod credentials;
pub mod endpoint;
pub mod judgement;
pub mod percentile;
pub mod rules;
pub mod scorers;
