//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository, file and controller calls into use-case APIs.
//! - Keep UI/FFI layers decoupled from storage details.

pub mod profile_service;
