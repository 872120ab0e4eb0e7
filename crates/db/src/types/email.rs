//! The `email` domain type.
//!
//! A Postgres domain over `text` whose check constraint is the HTML5 email
//! grammar (stricter than RFC 5322), plus two SQL functions that split an
//! address on its first `@`. Any column declared with the domain gets the
//! validation on write; queries can group or filter by either half without
//! repeating the string handling.
//!
//! [`Email`] applies the same pattern on the Rust side.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, instrument};

use super::{CustomFunction, TypeRegistry};
use crate::models::Value;
use crate::schema::quote_literal;
use crate::{DbError, DbPool};

/// HTML5 email grammar.
pub const EMAIL_PATTERN: &str = concat!(
    r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}",
    r"[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
);

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("EMAIL_PATTERN is a valid regex"))
}

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

/// The statements [`create_email_type`] runs, in order.
///
/// The functions depend on the domain, so they are dropped before it; a column
/// still using the domain makes the `DROP DOMAIN` fail instead of cascading.
pub fn email_type_statements(registry: &TypeRegistry) -> Vec<String> {
    let email = registry.email_type();
    let domain_name = registry.function(CustomFunction::EmailDomainName);
    let local_part = registry.function(CustomFunction::EmailLocalPart);

    let mut statements: Vec<String> = CustomFunction::ALL
        .iter()
        .map(|&function| {
            format!("DROP FUNCTION IF EXISTS {}({email})", registry.function(function))
        })
        .collect();
    statements.extend([
        format!("DROP DOMAIN IF EXISTS {email}"),
        format!(
            "CREATE DOMAIN {email} AS text CHECK (value ~ {})",
            quote_literal(EMAIL_PATTERN)
        ),
        split_function(&domain_name.to_string(), &email.to_string(), 2),
        split_function(&local_part.to_string(), &email.to_string(), 1),
    ]);
    statements
}

fn split_function(name: &str, email: &str, part: u8) -> String {
    format!(
        "CREATE OR REPLACE FUNCTION {name}({email})\n\
         RETURNS text AS $$\n    \
             SELECT split_part($1, '@', {part});\n\
         $$\n\
         LANGUAGE SQL IMMUTABLE RETURNS NULL ON NULL INPUT"
    )
}

/// (Re)define the email domain and its two functions, in one transaction.
#[instrument(skip(pool, registry), fields(schema = %registry.schema()))]
pub async fn create_email_type(pool: &DbPool, registry: &TypeRegistry) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    for statement in email_type_statements(registry) {
        sqlx::raw_sql(&statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    info!("email type created");
    Ok(())
}

/// Call `email_local_part` on the server. `None` in, `None` out.
pub async fn email_local_part(
    pool: &DbPool,
    registry: &TypeRegistry,
    value: Option<&str>,
) -> Result<Option<String>, DbError> {
    call_email_function(pool, registry, CustomFunction::EmailLocalPart, value).await
}

/// Call `email_domain_name` on the server. `None` in, `None` out.
pub async fn email_domain_name(
    pool: &DbPool,
    registry: &TypeRegistry,
    value: Option<&str>,
) -> Result<Option<String>, DbError> {
    call_email_function(pool, registry, CustomFunction::EmailDomainName, value).await
}

async fn call_email_function(
    pool: &DbPool,
    registry: &TypeRegistry,
    function: CustomFunction,
    value: Option<&str>,
) -> Result<Option<String>, DbError> {
    let sql = format!(
        "SELECT {}($1::{})",
        registry.function(function),
        registry.email_type()
    );
    let result: (Option<String>,) = sqlx::query_as(&sql).bind(value).fetch_one(pool).await?;
    Ok(result.0)
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

/// An address that satisfies the same check as the `email` domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

impl Email {
    /// # Errors
    /// [`DbError::InvalidEmail`] if `raw` doesn't match [`EMAIL_PATTERN`].
    pub fn parse(raw: impl Into<String>) -> Result<Self, DbError> {
        let raw = raw.into();
        if email_regex().is_match(&raw) {
            Ok(Self(raw))
        } else {
            Err(DbError::InvalidEmail(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the first `@`.
    pub fn local_part(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(local, _)| local)
    }

    /// Everything after the first `@`.
    pub fn domain_name(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, domain)| domain)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Email> for Value {
    fn from(email: Email) -> Self {
        Value::Text(email.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html5_addresses_are_accepted() {
        for raw in [
            "a@b.com",
            "first.last@example.org",
            "o'brien+tag@sub.example.co.uk",
            "x@localhost",
            "weird!#$%&*/=?^_`{|}~-@host-name.io",
        ] {
            assert!(Email::parse(raw).is_ok(), "{raw} should be accepted");
        }
    }

    #[test]
    fn non_html5_addresses_are_rejected() {
        for raw in [
            "",
            "plainaddress",
            "@example.com",
            "user@",
            "user@-example.com",
            "user@example-.com",
            "user@exa_mple.com",
            "two@@example.com",
            "spaces in@example.com",
            "user@example..com",
        ] {
            assert!(
                matches!(Email::parse(raw), Err(DbError::InvalidEmail(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn labels_are_limited_to_63_characters() {
        let ok = format!("u@{}.com", "a".repeat(63));
        let too_long = format!("u@{}.com", "a".repeat(64));
        assert!(Email::parse(ok).is_ok());
        assert!(Email::parse(too_long).is_err());
    }

    #[test]
    fn parts_split_on_the_first_at_sign() {
        let email: Email = "a@b.com".parse().expect("valid");
        assert_eq!(email.local_part(), "a");
        assert_eq!(email.domain_name(), "b.com");
        assert_eq!(Value::from(email), Value::Text("a@b.com".to_string()));
    }

    #[test]
    fn ddl_drops_functions_before_the_domain() {
        let statements = email_type_statements(&TypeRegistry::new("types"));
        assert_eq!(statements.len(), 6);
        assert_eq!(
            statements[0],
            "DROP FUNCTION IF EXISTS \"types\".\"email_domain_name\"(\"types\".\"email\")"
        );
        assert_eq!(
            statements[1],
            "DROP FUNCTION IF EXISTS \"types\".\"email_local_part\"(\"types\".\"email\")"
        );
        assert_eq!(statements[2], "DROP DOMAIN IF EXISTS \"types\".\"email\"");
    }

    #[test]
    fn every_custom_function_is_dropped_and_recreated() {
        let registry = TypeRegistry::new("types");
        let statements = email_type_statements(&registry);
        for function in CustomFunction::ALL {
            let name = registry.function(function).to_string();
            assert!(statements.iter().any(|s| s.starts_with(&format!("DROP FUNCTION IF EXISTS {name}("))));
            assert!(statements
                .iter()
                .any(|s| s.starts_with(&format!("CREATE OR REPLACE FUNCTION {name}("))));
        }
    }

    #[test]
    fn domain_check_embeds_the_pattern_as_a_quoted_literal() {
        let statements = email_type_statements(&TypeRegistry::new("types"));
        let create = &statements[3];
        assert!(create.starts_with("CREATE DOMAIN \"types\".\"email\" AS text CHECK (value ~ '^"));
        // The single quote inside the character class is doubled.
        assert!(create.contains("&''*+/"));
        assert!(create.ends_with("$')"));
    }

    #[test]
    fn functions_split_with_split_part_and_propagate_null() {
        let statements = email_type_statements(&TypeRegistry::new("types"));
        let domain_fn = &statements[4];
        let local_fn = &statements[5];
        assert!(domain_fn.starts_with(
            "CREATE OR REPLACE FUNCTION \"types\".\"email_domain_name\"(\"types\".\"email\")"
        ));
        assert!(domain_fn.contains("split_part($1, '@', 2)"));
        assert!(local_fn.contains("split_part($1, '@', 1)"));
        for f in [domain_fn, local_fn] {
            assert!(f.ends_with("LANGUAGE SQL IMMUTABLE RETURNS NULL ON NULL INPUT"));
        }
    }
}
