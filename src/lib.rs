// -- Lint policy ---------------------------------------------------------
// Crate-wide lints beyond the groups configured in Cargo.toml.

// Documentation
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Function signature hygiene
#![deny(clippy::fn_params_excessive_bools)]
// Clone / pass-by-value hygiene
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::redundant_closure_for_method_calls)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]

//! Real-time comparison of light culling techniques on wgpu.
//!
//! lightcull renders one scene lit by up to sixteen animated point lights with
//! any of eight techniques: forward with and without a depth prepass,
//! deferred shading through a full-screen loop or per-light quads, tiled
//! compute shading, and streaming surface-based anti-aliasing. Every
//! technique runs with or without MSAA and reports per-stage GPU times.
//!
//! # Key entry points
//!
//! - [`renderer::Renderer`] - owns the resource set, lights and pipelines
//!   and records frames into a caller-owned target
//! - [`renderer::Technique`] - the technique selector
//! - [`options::Options`] - runtime configuration (renderer, lighting,
//!   display toggles, streaming knobs)
//! - [`diagnostics::MemoryReport`] - per-technique memory footprint
//!
//! # Architecture
//!
//! Each frame the dispatcher turns the selected technique into a
//! [`renderer::plan::FramePlan`]: an ordered list of render, compute and
//! clear passes naming the resource-set members they attach and bind. The
//! plan is checked for read/write hazards, its bind groups are built from
//! the resource set, and the executor encodes it. Scene geometry and the
//! camera come in through the [`mesh::MeshProvider`] and
//! [`camera::CameraProvider`] seams.

pub mod camera;
pub mod diagnostics;
pub mod error;
pub mod gpu;
pub mod lights;
pub mod mesh;
pub mod options;
pub mod renderer;
#[cfg(feature = "viewer")]
pub mod viewer;
