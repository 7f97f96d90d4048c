pub mod access;
pub mod archive;
pub mod batch;
pub mod directory;
pub mod drive_service;
pub mod identity;
#[cfg(test)]
pub mod memory;
pub mod object_store;
pub mod path_index;
pub mod range;
pub mod upload;
