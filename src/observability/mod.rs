// Observability: metrics recording by pipeline phase

pub mod metrics;
