#![deny(missing_docs)]

//! Core library for the SmartLens document-to-note service.

/// Structured analysis of extracted text.
pub mod analysis;
/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Text extraction from images and PDFs.
pub mod extraction;
/// Upload pipeline orchestration.
pub mod ingestion;
/// Language-model collaborators.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Local OCR engines.
pub mod ocr;
/// Note persistence and asset storage.
pub mod store;
