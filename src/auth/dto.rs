use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ApiError;
use crate::users::User;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

/// Column widths of the `users` table, counted in characters.
pub(crate) const MAX_NAME_CHARS: usize = 64;
pub(crate) const MAX_EMAIL_CHARS: usize = 128;

fn check_email(email: &str) -> Result<(), ApiError> {
    if email.chars().count() > MAX_EMAIL_CHARS {
        return Err(ApiError::Validation(format!(
            "Email must be at most {MAX_EMAIL_CHARS} characters"
        )));
    }
    if !is_valid_email(email) {
        return Err(ApiError::Validation("Invalid email".into()));
    }
    Ok(())
}

fn check_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::Validation("Name must not be blank".into()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ApiError::Validation(format!(
            "Name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(())
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        check_email(self.email.trim())?;
        check_name(self.first_name.trim())?;
        check_name(self.last_name.trim())?;
        if self.password.is_empty() {
            return Err(ApiError::Validation("Password must not be empty".into()));
        }
        Ok(())
    }
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.new_password.is_empty() {
            return Err(ApiError::Validation("Password must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEmailRequest {
    pub new_email: String,
    pub password: String,
}

impl ChangeEmailRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        check_email(self.new_email.trim())
    }
}

/// Returned by login and change-email.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            first_name: u.first_name,
            last_name: u.last_name,
            email: u.email,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(email: &str, first: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            first_name: first.into(),
            last_name: "Doe".into(),
            password: password.into(),
        }
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("Alice.Smith+tag@sub.example.org"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@"));
        assert!(!is_valid_email("a b@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn register_validation() {
        assert!(register(" jane@example.com ", "Jane", "pw").validate().is_ok());
        assert!(register("jane", "Jane", "pw").validate().is_err());
        assert!(register("jane@example.com", "  ", "pw").validate().is_err());
        assert!(register("jane@example.com", "Jane", "").validate().is_err());
    }

    #[test]
    fn register_rejects_values_wider_than_columns() {
        let at_limit = "x".repeat(MAX_NAME_CHARS);
        assert!(register("jane@example.com", &at_limit, "pw").validate().is_ok());
        // trimmed before measuring
        let padded = format!("  {at_limit}  ");
        assert!(register("jane@example.com", &padded, "pw").validate().is_ok());

        let too_long = "x".repeat(MAX_NAME_CHARS + 1);
        let err = register("jane@example.com", &too_long, "pw")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let mut req = register("jane@example.com", "Jane", "pw");
        req.last_name = too_long;
        assert!(matches!(req.validate(), Err(ApiError::Validation(_))));

        // measured in characters, as Postgres does
        let wide = "é".repeat(MAX_NAME_CHARS);
        assert!(register("jane@example.com", &wide, "pw").validate().is_ok());

        let long_email = format!("{}@example.com", "a".repeat(MAX_EMAIL_CHARS));
        assert!(matches!(
            register(&long_email, "Jane", "pw").validate(),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn change_email_rejects_overlong_address() {
        let ok = ChangeEmailRequest {
            new_email: format!("{}@example.com", "a".repeat(MAX_EMAIL_CHARS - 12)),
            password: "pw".into(),
        };
        assert_eq!(ok.new_email.len(), MAX_EMAIL_CHARS);
        assert!(ok.validate().is_ok());

        let long = ChangeEmailRequest {
            new_email: format!("{}@example.com", "a".repeat(MAX_EMAIL_CHARS)),
            password: "pw".into(),
        };
        assert!(matches!(long.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn request_bodies_use_camel_case() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@b.co","firstName":"A","lastName":"B","password":"p"}"#,
        )
        .unwrap();
        assert_eq!(req.first_name, "A");

        let req: ChangeEmailRequest =
            serde_json::from_str(r#"{"newEmail":"n@b.co","password":"p"}"#).unwrap();
        assert_eq!(req.new_email, "n@b.co");

        let req: ChangePasswordRequest =
            serde_json::from_str(r#"{"oldPassword":"o","newPassword":"n"}"#).unwrap();
        assert_eq!(req.old_password, "o");
    }

    #[test]
    fn public_user_has_no_password_field() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            first_name: "Test".into(),
            last_name: "User".into(),
            email: "test@example.com".into(),
            hashed_password: "$argon2id$v=19$m=19456,t=2,p=1$abc$def".into(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(PublicUser::from(user)).unwrap();
        assert_eq!(json["email"], "test@example.com");
        assert_eq!(json["firstName"], "Test");
        assert!(json.get("hashedPassword").is_none());
        assert!(!json.to_string().contains("argon2"));
    }
}
