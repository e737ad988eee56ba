//! Classification of driver errors

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use records_common::error::Error;

static DUPLICATE_KEY: Lazy<Option<Regex>> = Lazy::new(|| {
    pattern(&[
        r"duplicate entry",
        r"duplicate key (value|row)",
        r"unique constraint failed",
        r"violation of (primary|unique) key",
    ])
});

static DATA_INTEGRITY: Lazy<Option<Regex>> = Lazy::new(|| {
    pattern(&[
        // mysql
        r"foreign key constraint fails",
        r"cannot be null",
        r"check constraint '[^']*' is violated",
        // postgres
        r"violates (foreign key|not-null|check) constraint",
        r"null value in column",
        // sqlite
        r"(foreign key|not null|check) constraint failed",
        // sql server
        r"conflicted with the (foreign key|reference|check) constraint",
        r"cannot insert the value null",
    ])
});

fn pattern(phrases: &[&str]) -> Option<Regex> {
    RegexBuilder::new(&phrases.join("|"))
        .case_insensitive(true)
        .build()
        .ok()
}

fn is_match(pattern: &Lazy<Option<Regex>>, message: &str) -> bool {
    pattern.as_ref().is_some_and(|regex| regex.is_match(message))
}

/// Classify a driver error message
#[must_use]
pub fn classify_message(message: &str) -> Error {
    if is_match(&DUPLICATE_KEY, message) {
        Error::DuplicateKey(message.to_string())
    } else if is_match(&DATA_INTEGRITY, message) {
        Error::DataIntegrityViolation(message.to_string())
    } else {
        Error::DatabaseError(message.to_string())
    }
}

/// Classify an sqlx error, preferring the driver reported constraint kind
#[must_use]
pub fn classify(error: &sqlx::Error) -> Error {
    match error {
        sqlx::Error::Database(database) => {
            let message = database.message().to_string();
            match database.kind() {
                sqlx::error::ErrorKind::UniqueViolation => Error::DuplicateKey(message),
                sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation => Error::DataIntegrityViolation(message),
                _ => classify_message(&message),
            }
        }
        sqlx::Error::PoolTimedOut => {
            Error::DatabaseError("Timed out waiting for a pooled connection".to_string())
        }
        other => Error::DatabaseError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_key_messages() {
        for message in [
            "Duplicate entry '1' for key 'PRIMARY'",
            "duplicate key value violates unique constraint \"users_pkey\"",
            "UNIQUE constraint failed: users.id",
            "Violation of PRIMARY KEY constraint 'PK_users'.",
            "Cannot insert duplicate key row in object 'dbo.users'",
        ] {
            assert!(matches!(classify_message(message), Error::DuplicateKey(_)), "{message}");
        }
    }

    #[test]
    fn test_integrity_messages() {
        for message in [
            "Cannot add or update a child row: a foreign key constraint fails",
            "Column 'name' cannot be null",
            "insert or update on table \"posts\" violates foreign key constraint",
            "null value in column \"name\" violates not-null constraint",
            "FOREIGN KEY constraint failed",
            "NOT NULL constraint failed: posts.content",
            "The INSERT statement conflicted with the FOREIGN KEY constraint",
            "Check constraint 'positive_length' is violated.",
        ] {
            assert!(
                matches!(classify_message(message), Error::DataIntegrityViolation(_)),
                "{message}"
            );
        }
    }

    #[test]
    fn test_other_messages() {
        assert!(matches!(
            classify_message("syntax error at or near \"FROM\""),
            Error::DatabaseError(_)
        ));
        assert!(matches!(classify(&sqlx::Error::PoolTimedOut), Error::DatabaseError(_)));
    }
}
