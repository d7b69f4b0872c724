pub mod classify;
pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod pose;
pub mod scoring;
pub mod swing;
pub mod track;

#[cfg(test)]
pub(crate) mod test_support;
