//! Flutter bridge crate for FestPick profile sharing.

pub mod api;
