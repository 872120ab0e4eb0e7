//! Custom database types and the functions that go with them.
//!
//! The registry maps each custom type and scalar function to its
//! schema-qualified name. It is populated explicitly, once, by [`init`] during
//! startup; nothing is registered as a side effect of loading this module.

pub mod email;

use std::sync::OnceLock;

use tracing::{info, instrument};

use crate::schema::{quote_ident, QualifiedName};
use crate::{DbError, DbPool};

/// Name of the email domain type.
pub const EMAIL_TYPE: &str = "email";

/// Server-side scalar functions that come with the custom types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomFunction {
    /// `email_domain_name(email) -> text`: everything after the first `@`.
    EmailDomainName,
    /// `email_local_part(email) -> text`: everything before the first `@`.
    EmailLocalPart,
}

impl CustomFunction {
    pub const ALL: [Self; 2] = [Self::EmailDomainName, Self::EmailLocalPart];

    pub fn name(self) -> &'static str {
        match self {
            Self::EmailDomainName => "email_domain_name",
            Self::EmailLocalPart => "email_local_part",
        }
    }
}

/// Where the custom types live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRegistry {
    schema: String,
}

impl TypeRegistry {
    /// A standalone registry; use [`init`] for the process-wide one.
    pub fn new(schema: impl Into<String>) -> Self {
        Self { schema: schema.into() }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Qualified name of the email domain type.
    pub fn email_type(&self) -> QualifiedName {
        QualifiedName::new(&self.schema, EMAIL_TYPE)
    }

    /// Qualified name of a custom function.
    pub fn function(&self, function: CustomFunction) -> QualifiedName {
        QualifiedName::new(&self.schema, function.name())
    }
}

static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

/// Populate the process-wide registry. Call once at startup.
///
/// Calling again with the same schema returns the existing registry.
///
/// # Errors
/// [`DbError::RegistryConflict`] if the registry already points at another schema.
pub fn init(schema: &str) -> Result<&'static TypeRegistry, DbError> {
    let registry = REGISTRY.get_or_init(|| {
        info!(schema, "registering custom types");
        TypeRegistry::new(schema)
    });
    if registry.schema() != schema {
        return Err(DbError::RegistryConflict(registry.schema().to_string()));
    }
    Ok(registry)
}

/// The process-wide registry.
///
/// # Errors
/// [`DbError::RegistryNotInitialized`] before [`init`] has run.
pub fn registry() -> Result<&'static TypeRegistry, DbError> {
    REGISTRY.get().ok_or(DbError::RegistryNotInitialized)
}

/// `CREATE SCHEMA IF NOT EXISTS` for the registry's schema.
#[instrument(skip(pool, registry), fields(schema = %registry.schema()))]
pub async fn create_type_schema(pool: &DbPool, registry: &TypeRegistry) -> Result<(), DbError> {
    let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(registry.schema()));
    let mut tx = pool.begin().await?;
    sqlx::raw_sql(&sql).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

/// Create the type schema and every custom type in it.
pub async fn install(pool: &DbPool, registry: &TypeRegistry) -> Result<(), DbError> {
    create_type_schema(pool, registry).await?;
    email::create_email_type(pool, registry).await?;
    info!(schema = %registry.schema(), "custom types installed");
    Ok(())
}
