//! # dxa
//!
//! Dislocation Extraction Algorithm: turns a raw atomic configuration into a set of
//! dislocation lines, each annotated with a Burgers vector.
//!
//! The pipeline runs in stages: neighbor enumeration, per-atom structure identification
//! (Common Neighbor Analysis or Polyhedral Template Matching), cluster-graph construction
//! over crystalline regions, interface-mesh construction around the disordered core, Burgers
//! circuit tracing across that mesh, and finally smoothing/clipping/density computation on
//! the resulting polylines.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dxa::{Frame, DxaConfig, run_frame};
//!
//! let output = run_frame(&frame, &DxaConfig::default())?;
//! for segment in &output.segments {
//!     println!("{} ({} pts)", segment.burgers_vector_fractional, segment.line.len());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

// Data model
pub mod atom;
pub mod cell;
pub mod cluster;
pub mod frame;
pub mod segment;

// Structure identification
pub mod cna;
pub mod ptm;

// Geometry
pub mod mesh;
pub mod neighbors;

// Burgers loop construction
pub mod burgers_fraction;
pub mod circuit;
pub mod refine;

// Output post-processing
pub mod smoothing;

// Configuration and orchestration
pub mod config;
pub mod pipeline;

pub use cell::Cell;
pub use config::{DxaConfig, IdentificationMode};
pub use error::{DxaError, DxaWarning, Result};
pub use frame::{Frame, FrameOutput};
pub use pipeline::{run_frame, run_trajectory};
