//! Image build planning, build context bundling, layer cache rotation and
//! deployment descriptor rendering for gantry.
//!
//! # Deploy pipeline
//!
//! ```text
//! gantry deploy
//!   1. Dirty check  ── git status --porcelain (skip with --allow-dirty)
//!   2. Dockerfile   ── DockerfileGenerator::render() or .gantry/Dockerfile
//!   3. Bundle       ── git ls-files → .gantry-bundle/
//!   4. Cache        ── CacheStore::restore() → --cache-from / --cache-to <key>.new
//!   5. Build        ── docker buildx build --load (fatal on failure)
//!   6. Cache        ── CacheStore::promote() (non-fatal on failure)
//!   7. Publish      ── docker push <sha>, docker push latest, digests must match
//!   8. Submit       ── render_descriptor() → lightsail create-container-service-deployment
//! ```
//!
//! # Image plan
//!
//! The builder stage compiles every pinned requirement plus the server into
//! wheels. The runtime stage installs only runtime libraries, copies the
//! wheel directory across the stage boundary, installs from it offline and
//! switches to an unprivileged user before declaring its command.
//! [`stage::ImagePlan::validate`] rejects plans that break any of this.

pub mod bundle;
pub mod cache;
pub mod dockerfile;
pub mod eject;
pub mod instruction;
pub mod stage;
pub mod template;

pub use cache::{CacheKey, CacheRestore, CacheStore};
pub use dockerfile::DockerfileGenerator;
pub use template::{DEFAULT_TEMPLATE, TemplateValues, render_descriptor};
