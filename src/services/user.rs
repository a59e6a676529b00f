//! User service
//!
//! Implements business logic for user management:
//! - User registration (first user becomes administrator)
//! - Login/logout
//! - Session management
//! - Password hashing

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User, UserRole};
use crate::services::password::{hash_password, verify_password};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    /// Create a new user service with the given repositories
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days: DEFAULT_SESSION_EXPIRATION_DAYS,
        }
    }

    /// Create a new user service with custom session expiration
    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Register a new user.
    ///
    /// The first user in the system is assigned the administrator role;
    /// everyone after that registers as a subscriber.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if login, email or password is empty
    /// - `UserExists` if login or email is already taken
    /// - `InternalError` for database errors
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        self.validate_register_input(&input)?;

        if self
            .user_repo
            .get_by_login(&input.login)
            .await
            .context("Failed to check login")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Login '{}' is already taken",
                input.login
            )));
        }

        if self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let is_first = self.is_first_user().await?;
        let roles = if is_first {
            vec![UserRole::Administrator]
        } else {
            vec![UserRole::Subscriber]
        };

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let user = User::new(input.login, input.email, password_hash, roles);

        let created_user = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = created_user.id, login = %created_user.login, "User registered");

        Ok(created_user)
    }

    /// Login with credentials.
    ///
    /// Validates the provided credentials and creates a new session if valid.
    ///
    /// # Errors
    ///
    /// - `AuthenticationError` if credentials are invalid
    /// - `InternalError` for database errors
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let user = self
            .find_user_by_login_or_email(&input.login_or_email)
            .await?
            .ok_or_else(|| {
                UserServiceError::AuthenticationError("Invalid login or password".to_string())
            })?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;

        if !password_valid {
            return Err(UserServiceError::AuthenticationError(
                "Invalid login or password".to_string(),
            ));
        }

        let session = self.create_session(user.id).await?;

        tracing::debug!(user_id = user.id, "User logged in");

        Ok(session)
    }

    /// Logout (invalidate session)
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;

        Ok(())
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;

        Ok(user)
    }

    /// Get user by login name
    pub async fn get_by_login(&self, login: &str) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_login(login)
            .await
            .context("Failed to get user by login")?;

        Ok(user)
    }

    /// Validate session token and return the associated user.
    ///
    /// Checks if the session exists and is not expired. Expired sessions are
    /// removed as a side effect.
    ///
    /// # Returns
    ///
    /// The user if the session is valid, `None` if the session doesn't exist
    /// or is expired.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            // Clean up expired session
            let _ = self.session_repo.delete(token).await;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    /// Check if this is the first user (for auto-admin)
    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self
            .user_repo
            .count()
            .await
            .context("Failed to count users")?;

        Ok(count == 0)
    }

    /// Delete all expired sessions.
    ///
    /// Maintenance operation to be called periodically.
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;

        Ok(count)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    /// Validate registration input
    fn validate_register_input(&self, input: &RegisterInput) -> Result<(), UserServiceError> {
        if input.login.trim().is_empty() {
            return Err(UserServiceError::ValidationError(
                "Login cannot be empty".to_string(),
            ));
        }

        if input.email.trim().is_empty() {
            return Err(UserServiceError::ValidationError(
                "Email cannot be empty".to_string(),
            ));
        }

        if input.password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Password cannot be empty".to_string(),
            ));
        }

        // Basic email format validation
        if !input.email.contains('@') {
            return Err(UserServiceError::ValidationError(
                "Invalid email format".to_string(),
            ));
        }

        Ok(())
    }

    /// Find user by login or email
    async fn find_user_by_login_or_email(
        &self,
        login_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_login(login_or_email)
            .await
            .context("Failed to get user by login")?
        {
            return Ok(Some(user));
        }

        let user = self
            .user_repo
            .get_by_email(login_or_email)
            .await
            .context("Failed to get user by email")?;

        Ok(user)
    }

    /// Create a new session for a user
    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::new(user_id, self.session_expiration_days);

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        Ok(created)
    }
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub login: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    /// Create a new registration input
    pub fn new(
        login: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            login: login.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub login_or_email: String,
    pub password: String,
}

impl LoginInput {
    /// Create a new login input
    pub fn new(login_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login_or_email: login_or_email.into(),
            password: password.into(),
        }
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::password::{hash_password, verify_password};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    // Counter for generating unique logins/emails across test iterations
    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    async fn setup_property_test_service() -> UserService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        UserService::new(user_repo, session_repo)
    }

    fn unique_suffix() -> u64 {
        TEST_COUNTER.fetch_add(1, Ordering::SeqCst)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// For any valid credentials, login should return a token that
        /// validates to the same user.
        #[test]
        fn property_auth_roundtrip(
            login in "[a-z]{3,10}",
            email_prefix in "[a-z]{3,10}",
            password in "[a-zA-Z0-9!@#$%^&*]{8,20}"
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let service = setup_property_test_service().await;
                let suffix = unique_suffix();

                let unique_login = format!("{}_{}", login, suffix);
                let unique_email = format!("{}_{}@example.com", email_prefix, suffix);

                let register_input = RegisterInput::new(
                    unique_login.clone(),
                    unique_email.clone(),
                    password.clone(),
                );
                let registered_user = service.register(register_input).await
                    .expect("Registration should succeed");

                let login_input = LoginInput::new(unique_login.clone(), password.clone());
                let session = service.login(login_input).await
                    .expect("Login should succeed with valid credentials");

                let validated_user = service.validate_session(&session.id).await
                    .expect("Session validation should not error")
                    .expect("Session should be valid and return user");

                prop_assert_eq!(validated_user.id, registered_user.id);
                prop_assert_eq!(validated_user.login, registered_user.login);
                prop_assert_eq!(validated_user.email, registered_user.email);
                Ok(())
            });
            result?;
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// For any password, the stored hash differs from the original and
        /// only the correct password verifies.
        #[test]
        fn property_password_secure_storage(
            password in "[a-zA-Z0-9!@#$%^&*()_+-=]{1,50}"
        ) {
            let hash = hash_password(&password)
                .expect("Password hashing should succeed");

            prop_assert_ne!(&hash, &password);
            prop_assert!(hash.starts_with("$argon2id$"));

            let verify_result = verify_password(&password, &hash)
                .expect("Password verification should not error");
            prop_assert!(verify_result);

            let wrong_password = format!("{}wrong", password);
            let wrong_verify_result = verify_password(&wrong_password, &hash)
                .expect("Password verification should not error");
            prop_assert!(!wrong_verify_result);

            // Random salt gives different hashes for the same password
            let hash2 = hash_password(&password)
                .expect("Second password hashing should succeed");
            prop_assert_ne!(&hash, &hash2);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// For any wrong password or nonexistent login, login returns an
        /// authentication error.
        #[test]
        fn property_invalid_credentials_rejection(
            login in "[a-z]{3,10}",
            email_prefix in "[a-z]{3,10}",
            correct_password in "[a-zA-Z0-9]{8,20}",
            wrong_password in "[a-zA-Z0-9]{8,20}",
            nonexistent_login in "[a-z]{3,10}"
        ) {
            prop_assume!(correct_password != wrong_password);

            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let service = setup_property_test_service().await;
                let suffix = unique_suffix();

                let unique_login = format!("{}_{}", login, suffix);
                let unique_email = format!("{}_{}@example.com", email_prefix, suffix);
                let unique_nonexistent = format!("nonexist_{}_{}", nonexistent_login, suffix);

                let register_input = RegisterInput::new(
                    unique_login.clone(),
                    unique_email.clone(),
                    correct_password.clone(),
                );
                service.register(register_input).await
                    .expect("Registration should succeed");

                let wrong_password_result = service
                    .login(LoginInput::new(unique_login.clone(), wrong_password.clone()))
                    .await;
                prop_assert!(matches!(
                    wrong_password_result,
                    Err(UserServiceError::AuthenticationError(_))
                ));

                let nonexistent_result = service
                    .login(LoginInput::new(unique_nonexistent, correct_password.clone()))
                    .await;
                prop_assert!(matches!(
                    nonexistent_result,
                    Err(UserServiceError::AuthenticationError(_))
                ));
                Ok(())
            });
            result?;
        }
    }
}
