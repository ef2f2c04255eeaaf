//! Workspace root package; anchors git hooks via cargo-husky.
//!
//! All functionality lives in `crates/`.
