//! pir-displayd - motion sensor daemon for dashboard displays.
//!
//! Watches a PIR sensor and powers the display down after a period without
//! motion, either through a relay or through display power commands.

pub mod command;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod domain;
pub mod host;
pub mod power;
pub mod relay;
pub mod sensor;
