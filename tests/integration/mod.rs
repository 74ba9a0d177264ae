//! Integration tests for change tracking and the storage mappers

mod codec;
mod composition;
mod config_integration;
mod document_mapper;
mod sql_mapper;
mod tracker_scenarios;
