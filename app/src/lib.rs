// ==============================================================================
// lib.rs - GWAS Indexer Library
// ==============================================================================
// Description: Library interface for GWAS summary-statistics ingestion
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod audit;
pub mod backend;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod extractor;
pub mod guard;
pub mod loader;
pub mod models;
pub mod parsers;
pub mod pipeline;
pub mod validator;
pub mod verify;
