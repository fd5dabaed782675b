pub mod entity;
pub mod examples;
pub mod export;
pub mod generation;
pub mod import;
pub mod linking;
pub mod project;
pub mod shot;
