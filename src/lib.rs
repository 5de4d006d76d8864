//! # Thumber
//!
//! The core of an on-the-fly thumbnailing service: everything between "here
//! are the source bytes and the request parameters" and "here are the
//! thumbnail bytes", minus the network.
//!
//! # Architecture: Plan, Then Execute
//!
//! Every render goes through the same steps:
//!
//! ```text
//! 1. Sniff    bytes    →  ImageFormat       (magic numbers, no decoding)
//! 2. Probe    bytes    →  source size       (header only)
//! 3. Plan     request  →  TransformPlan     (pure geometry)
//! 4. Execute  plan     →  thumbnail bytes   (pixel engine)
//! ```
//!
//! Planning is pure and engine-agnostic, so all geometry (fit / crop /
//! margin, overlay and text placement) is unit tested without touching a
//! pixel. The pixel work sits behind the [`imaging::ImageEngine`] trait.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Format sniffing, GIF first frame, HEIF boxes, geometry planners, pixel engine, render pipeline |
//! | [`request`] | Request parameter parsing, validation, color and URL canonicalisation |
//! | [`config`] | `thumber.toml` loading, validation and merging over stock defaults |
//! | [`batch`] | Parallel rendering of a JSON job list |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Byte-Level Container Surgery
//!
//! Two container fixes are done on raw bytes rather than through a decoder:
//! animated GIFs are cut to their first frame by writing a trailer after the
//! first image block, and HEIC output has its primary item's `ispe` property
//! patched to the final canvas size. Both are in-place and never reallocate.
//!
//! ## Skips Are Not Errors
//!
//! A crop without a gravity, or an unknown crop mode, is a request the
//! planner cannot satisfy but that is not malformed either. It produces
//! [`imaging::PlanOutcome::Skip`] and [`imaging::RenderOutcome::Skipped`],
//! which callers report without failing.
//!
//! ## Pure-Rust Imaging
//!
//! [`imaging::RustEngine`] uses the `image` crate (Lanczos3 resampling). No
//! system libraries are required; HEIC and text rasterization are left to
//! other engines.

pub mod batch;
pub mod config;
pub mod imaging;
pub mod output;
pub mod request;
