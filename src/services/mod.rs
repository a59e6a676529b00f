//! Services layer - Business logic
//!
//! This module contains all business logic services for the CourseHub system.
//! Services are responsible for:
//! - Implementing business rules
//! - Coordinating between repositories
//! - Handling validation and error cases

pub mod category;
pub mod course;
pub mod nonce;
pub mod password;
pub mod user;

pub use category::{
    generate_slug, CategoryService, CategoryServiceError, CreateCategoryInput,
};
pub use course::{
    sanitize_text_field, CourseService, CourseServiceError, SAVE_META_ACTION,
};
pub use nonce::NonceService;
pub use password::{hash_password, verify_password};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
