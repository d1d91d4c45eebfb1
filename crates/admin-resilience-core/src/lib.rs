//! # Admin Resilience Core
//!
//! Pure, runtime-free logic for consuming an inconsistent REST backend:
//! locating the real payload inside variant-shaped responses, guessing
//! where an uploaded asset actually lives, and interpreting either of the
//! backend's permission encodings.
//!
//! This crate contains no tokio, reqwest, or filesystem I/O. Network-facing
//! pieces (request coalescing, HTTP probing) live in the `admin-resilience`
//! application crate and plug into the seams defined here.

pub mod assets;
pub mod extract;
pub mod models;
pub mod permissions;
