// Infrastructure layer - External dependencies and adapters
pub mod backend_repository;
pub mod chart_mapper;
pub mod config;
pub mod http_response;
