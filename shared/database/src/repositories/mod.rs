//! Repository module for database CRUD operations

pub mod document;

pub use document::DocumentRepository;
