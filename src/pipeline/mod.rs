//! Artifact pipeline.
//!
//! A finished report flows through:
//! 1. `chart`: results plot from the data table
//! 2. `docx`: template fill and image embedding
//! 3. `convert`: PDF through the first external tool that works
//!
//! `processor::ArtifactPipeline` runs the steps and indexes every artifact.

pub mod chart;
pub mod convert;
pub mod docx;
pub mod processor;

pub use chart::{ChartRenderer, ChartSpec, ScatterChart};
pub use convert::{Converter, ConverterChain};
pub use processor::{ArtifactPipeline, GeneratedReport};
