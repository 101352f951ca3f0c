pub mod iframe;
pub mod tmdb;
