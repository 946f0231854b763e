pub mod predictor;
pub mod trainer;
