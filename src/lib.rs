//! # Image Marker
//!
//! Browser-driven bounding-box labeling for a directory of unlabeled images.
//!
//! The annotator is handed a random unlabeled image, draws boxes on it and
//! submits them. Each submission becomes one line in an append-only sample
//! log, and the image is moved into `marked/` under the image root so it is
//! never served again.
//!
//! ## Architecture
//!
//! ```text
//!   browser ──GET /images/random──▶ RandomSampler ──▶ image root listing
//!      │
//!      └────POST /images/{name}───▶ AnnotationStore
//!                                      │ 1. append line ──▶ SampleLog
//!                                      │ 2. move ─────────▶ image root/marked/
//! ```
//!
//! ## Sample log format
//!
//! ```text
//! ../marked/cat.png 2 10 20 30 40 50 60 70 80
//! ```
//!
//! Path of the marked image relative to the log file's own directory, box
//! count, then `x y width height` per box in submission order.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and command-line overrides |
//! | [`error`] | Startup failures and exit codes |
//! | [`models`] | Image names, boxes, log records |
//! | [`paths`] | Path resolution and safe joins |
//! | [`sample_log`] | Append-only sample log |
//! | [`store`] | Commit protocol for one submission |
//! | [`sampler`] | Random unlabeled-image choice |
//! | [`server`] | HTTP front end |
//! | [`reconcile`] | Offline repair of logged-but-unmoved images |
//! | [`stats`] | Labeling progress summary |

pub mod config;
pub mod error;
pub mod models;
pub mod paths;
pub mod reconcile;
pub mod sample_log;
pub mod sampler;
pub mod server;
pub mod stats;
pub mod store;
