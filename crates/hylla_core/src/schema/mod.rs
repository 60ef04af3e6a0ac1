//! Record-shape definitions and the registry that assigns them to
//! sections and the library.
//!
//! A schema is plain data: a name, an ordered list of typed fields, and an
//! `extra_forbidden` flag. Composition is by nesting
//! ([`FieldType::Schema`]), never by inheritance.
//!
//! A record conforms to a schema when:
//! - every field without a default is present,
//! - every present field has the declared type (recursively for nested
//!   schemas), and
//! - no undeclared field is present, unless `extra_forbidden` is off.
//!
//! Validation reports every violation at once rather than the first.
//! Defaults are never written into validated records; [`Schema::defaults`]
//! exists for Reset.

mod field;
mod registry;

pub use field::{FieldDef, FieldType};
pub use registry::SchemaRegistry;

use crate::error::{CoreError, CoreResult};
use crate::path::is_valid_name;
use hylla_codec::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_extra_forbidden() -> bool {
    true
}

/// A named record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Name used in violation reports.
    pub name: String,
    /// Declared fields, in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Reject fields the schema does not declare.
    #[serde(default = "default_extra_forbidden")]
    pub extra_forbidden: bool,
}

impl Schema {
    /// An empty schema that forbids extra fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            extra_forbidden: true,
        }
    }

    /// Adds a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDef::new(name, ty));
        self
    }

    /// Adds a field that may be omitted.
    #[must_use]
    pub fn field_with_default(
        mut self,
        name: impl Into<String>,
        ty: FieldType,
        default: hylla_codec::Value,
    ) -> Self {
        self.fields.push(FieldDef::with_default(name, ty, default));
        self
    }

    /// Allows fields the schema does not declare.
    #[must_use]
    pub fn allow_extra(mut self) -> Self {
        self.extra_forbidden = false;
        self
    }

    /// Looks up a field definition.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Checks that the schema itself is well formed: field names are valid
    /// and unique, and every default satisfies its field's type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` describing the first problem found.
    pub fn check(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::invalid_schema("schema name is empty"));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !is_valid_name(&field.name) {
                return Err(CoreError::invalid_schema(format!(
                    "{}: field name {:?} is not a valid name",
                    self.name, field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(CoreError::invalid_schema(format!(
                    "{}: field {} is declared twice",
                    self.name, field.name
                )));
            }
            if let Some(default) = &field.default {
                let mut out = Vec::new();
                field.ty.check(default, &field.name, &mut out);
                if !out.is_empty() {
                    return Err(CoreError::invalid_schema(format!(
                        "{}: default does not match: {}",
                        self.name,
                        out.join("; ")
                    )));
                }
            }
            check_nested(&field.ty)?;
        }
        Ok(())
    }

    /// Validates a record against this schema.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolation` listing every violated field.
    pub fn validate(&self, record: &Record) -> CoreResult<()> {
        let mut violations = Vec::new();
        self.collect_violations(record, "", &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(CoreError::SchemaViolation {
                schema: self.name.clone(),
                violations,
            })
        }
    }

    /// The record Reset writes: every defaulted field at its default.
    pub fn defaults(&self) -> Record {
        self.fields
            .iter()
            .filter_map(|f| f.default.clone().map(|v| (f.name.clone(), v)))
            .collect()
    }

    pub(crate) fn collect_violations(&self, record: &Record, prefix: &str, out: &mut Vec<String>) {
        for field in &self.fields {
            match record.get(&field.name) {
                Some(value) => field.ty.check(value, &format!("{prefix}{}", field.name), out),
                None if field.default.is_some() => {}
                None => out.push(format!("missing field {prefix}{}", field.name)),
            }
        }
        if self.extra_forbidden {
            for key in record.keys() {
                if self.get_field(key).is_none() {
                    out.push(format!("unknown field {prefix}{key}"));
                }
            }
        }
    }
}

fn check_nested(ty: &FieldType) -> CoreResult<()> {
    match ty {
        FieldType::List(inner) | FieldType::Dict(inner) | FieldType::Optional(inner) => {
            check_nested(inner)
        }
        FieldType::Schema(schema) => schema.check(),
        _ => Ok(()),
    }
}
