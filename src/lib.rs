//! Workspace placeholder crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates (`core-sync`, `core-runtime`, `provider-google-photos`,
//! `bridge-desktop`). Host applications can depend on `photo-sync-workspace`
//! and enable the documented features without wiring each crate individually.

#[cfg(feature = "engine")]
pub use core_runtime as runtime;
#[cfg(feature = "engine")]
pub use core_sync as sync;

#[cfg(feature = "google-photos")]
pub use provider_google_photos as google_photos;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;
