//! One-shot probes.
//!
//! Unlike the polling sensors these run synchronously on demand: form
//! factor detection, virtualization checks, bluetooth adapter status, the
//! notification blocker and permission predicates.

pub mod bluetooth;
pub mod notification;
pub mod permissions;
pub mod system;
pub mod vm;
