// Services module - business logic layer

pub mod auth;
pub mod catalog;
pub mod draft;
pub mod favorites;
pub mod seeder;
pub mod trailers;

// Metadata provider
pub mod tmdb;
