//! DevWorkspace CRD Definitions
//!
//! Kubernetes Custom Resource Definitions and shared types for the DevWorkspace controller.

pub mod component;
pub mod constants;
pub mod devworkspace;

pub use component::*;
pub use constants::*;
pub use devworkspace::*;
