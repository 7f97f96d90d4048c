//! Core data models for the drive.
//!
//! `FileRecord` is the only persisted entity; directories are computed per
//! request from the flat list of records.

pub mod file;
pub mod listing;
pub mod upload;
pub mod user;
