// Pipeline processing: normalization, reshaping, vocabulary matching, and validation

pub mod matching;
pub mod normalize;
pub mod reshape;
pub mod validation;
