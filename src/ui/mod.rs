//! Terminal and JSON presentation of classification results.
pub mod output;
