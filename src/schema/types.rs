//! Record schema descriptors
//!
//! A schema names a record kind and the role of each interesting field.
//! Fields without a declared role are stored but never indexed.

use std::fmt;

/// Role a field plays in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    /// Primary key; exactly one per kind
    Identifier,
    /// Secondary index supporting equality and prefix lookup
    Indexed,
    /// Secondary index that also forbids duplicate values
    Unique,
}

impl FieldRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldRole::Identifier => "id",
            FieldRole::Indexed => "index",
            FieldRole::Unique => "unique",
        }
    }
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub role: FieldRole,
}

/// Schema for one record kind.
///
/// ```
/// use bucketdb::schema::RecordSchema;
///
/// let schema = RecordSchema::new("User")
///     .identifier("id")
///     .unique("email")
///     .indexed("group");
/// assert_eq!(schema.identifier_field(), Some("id"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    kind: String,
    fields: Vec<FieldDef>,
}

impl RecordSchema {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Vec::new(),
        }
    }

    /// Declares the identifier field.
    pub fn identifier(mut self, name: impl Into<String>) -> Self {
        self.push(name, FieldRole::Identifier);
        self
    }

    /// Declares a secondary index.
    pub fn indexed(mut self, name: impl Into<String>) -> Self {
        self.push(name, FieldRole::Indexed);
        self
    }

    /// Declares a unique secondary index.
    pub fn unique(mut self, name: impl Into<String>) -> Self {
        self.push(name, FieldRole::Unique);
        self
    }

    fn push(&mut self, name: impl Into<String>, role: FieldRole) {
        self.fields.push(FieldDef {
            name: name.into(),
            role,
        });
    }

    /// Bucket name for records of this kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Name of the identifier field, if one is declared.
    pub fn identifier_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.role == FieldRole::Identifier)
            .map(|f| f.name.as_str())
    }

    /// `(name, unique)` for every secondary index.
    pub fn indexed_fields(&self) -> impl Iterator<Item = (&str, bool)> {
        self.fields.iter().filter_map(|f| match f.role {
            FieldRole::Identifier => None,
            FieldRole::Indexed => Some((f.name.as_str(), false)),
            FieldRole::Unique => Some((f.name.as_str(), true)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_records_roles_in_order() {
        let schema = RecordSchema::new("User")
            .identifier("id")
            .unique("email")
            .indexed("group");

        assert_eq!(schema.kind(), "User");
        assert_eq!(schema.identifier_field(), Some("id"));
        assert_eq!(schema.fields()[1].role, FieldRole::Unique);
        assert_eq!(
            schema.indexed_fields().collect::<Vec<_>>(),
            vec![("email", true), ("group", false)]
        );
    }

    #[test]
    fn test_schema_without_identifier() {
        let schema = RecordSchema::new("Note").indexed("title");
        assert!(schema.identifier_field().is_none());
    }
}
