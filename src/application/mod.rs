// Application layer - Use cases and the seams they depend on
pub mod chart_cache;
pub mod chart_service;
pub mod reading_repository;
pub mod request_tracker;
