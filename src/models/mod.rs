//! Data models
//!
//! This module contains all data structures used throughout the coursehub service.
//! Models represent:
//! - Database entities (Course, CourseCategory, User, Session)
//! - Input types for service operations
//! - Internal data transfer objects

mod category;
mod course;
mod session;
mod user;

pub use category::{CategoryTree, CourseCategory};
pub use course::{
    Course, CourseLevel, CourseMetaForm, CreateCourseInput, UpdateCourseInput,
    META_DURATION, META_LEVEL,
};
pub use session::Session;
pub use user::{User, UserRole, UserWithMeta};
