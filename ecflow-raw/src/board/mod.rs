//! Board-specific embedded controller definitions
//!
//! Each board exposes a different register layout and command set on its
//! controller. Boards are selected with feature flags.
//!
//! ## Supported Boards
//!
//! - **Acer Iconia Tab A500** (`a500` feature) - ENE KB930 controller

#[cfg(feature = "a500")]
pub mod a500;
