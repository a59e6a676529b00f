//! CourseHub - A course catalog and user directory service
//!
//! This library provides the core functionality for the CourseHub system:
//! a "course" content type with a hierarchical category taxonomy, validated
//! duration/level metadata, a `[courses_list]` text directive, and an
//! admin-gated streaming export of the user directory.

pub mod api;
pub mod config;
pub mod db;
pub mod export;
pub mod models;
pub mod registration;
pub mod services;
pub mod shortcode;
