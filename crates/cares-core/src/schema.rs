//! Declarative schema model
//!
//! A [`ResourceSpec`] describes one collection of the remote store: its typed
//! attributes, its indexes and the permissions granted on it. Specs are static
//! configuration; the provisioner moves the remote store towards them without
//! ever deleting or altering what already exists.

use crate::error::{CaresError, Result};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

// ============================================================================
// Permissions
// ============================================================================

/// Action a permission rule grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Read,
    Create,
    Update,
    Delete,
}

impl PermissionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Actor class a permission rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Principal {
    /// Anyone, including anonymous visitors
    Anyone,
    /// Any authenticated user
    AuthenticatedUsers,
}

impl Principal {
    /// Role name understood by the store
    pub fn as_role(&self) -> &'static str {
        match self {
            Self::Anyone => "any",
            Self::AuthenticatedUsers => "users",
        }
    }
}

/// A single `(action, principal)` grant
///
/// Renders in the store's wire form, e.g. `read("any")`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionRule {
    pub action: PermissionAction,
    pub principal: Principal,
}

impl PermissionRule {
    pub fn new(action: PermissionAction, principal: Principal) -> Self {
        Self { action, principal }
    }

    pub fn read(principal: Principal) -> Self {
        Self::new(PermissionAction::Read, principal)
    }

    pub fn create(principal: Principal) -> Self {
        Self::new(PermissionAction::Create, principal)
    }

    pub fn update(principal: Principal) -> Self {
        Self::new(PermissionAction::Update, principal)
    }

    pub fn delete(principal: Principal) -> Self {
        Self::new(PermissionAction::Delete, principal)
    }

    /// Public read, authenticated users write
    pub fn public_read_user_write() -> Vec<Self> {
        vec![
            Self::read(Principal::Anyone),
            Self::create(Principal::AuthenticatedUsers),
            Self::update(Principal::AuthenticatedUsers),
            Self::delete(Principal::AuthenticatedUsers),
        ]
    }
}

impl fmt::Display for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(\"{}\")", self.action.as_str(), self.principal.as_role())
    }
}

impl Serialize for PermissionRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Render rules in wire form
pub fn render_permissions(rules: &[PermissionRule]) -> Vec<String> {
    rules.iter().map(ToString::to_string).collect()
}

// ============================================================================
// Attributes
// ============================================================================

/// Kind of an attribute together with its kind-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AttributeKind {
    String {
        size: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<String>,
        array: bool,
    },
    Boolean {
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<bool>,
    },
    Datetime {
        /// ISO-8601 timestamp
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    Integer {
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
}

impl AttributeKind {
    /// Name used in store endpoints (`attributes/{name}`)
    pub fn name(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Boolean { .. } => "boolean",
            Self::Datetime { .. } => "datetime",
            Self::Integer { .. } => "integer",
        }
    }
}

/// Typed field definition within a collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeSpec {
    pub key: String,
    pub required: bool,
    #[serde(flatten)]
    pub kind: AttributeKind,
}

impl AttributeSpec {
    fn with_kind(key: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            key: key.into(),
            required: false,
            kind,
        }
    }

    pub fn string(key: impl Into<String>, size: u32) -> Self {
        Self::with_kind(
            key,
            AttributeKind::String {
                size,
                default: None,
                array: false,
            },
        )
    }

    pub fn boolean(key: impl Into<String>) -> Self {
        Self::with_kind(key, AttributeKind::Boolean { default: None })
    }

    pub fn datetime(key: impl Into<String>) -> Self {
        Self::with_kind(key, AttributeKind::Datetime { default: None })
    }

    pub fn integer(key: impl Into<String>) -> Self {
        Self::with_kind(
            key,
            AttributeKind::Integer {
                default: None,
                min: None,
                max: None,
            },
        )
    }

    /// Builder: mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Builder: store a list of strings
    pub fn array(mut self) -> Self {
        debug_assert!(matches!(self.kind, AttributeKind::String { .. }));
        if let AttributeKind::String { ref mut array, .. } = self.kind {
            *array = true;
        }
        self
    }

    /// Builder: default for a string attribute
    pub fn default_str(mut self, value: impl Into<String>) -> Self {
        debug_assert!(matches!(self.kind, AttributeKind::String { .. }));
        if let AttributeKind::String { ref mut default, .. } = self.kind {
            *default = Some(value.into());
        }
        self
    }

    /// Builder: default for a boolean attribute
    pub fn default_bool(mut self, value: bool) -> Self {
        debug_assert!(matches!(self.kind, AttributeKind::Boolean { .. }));
        if let AttributeKind::Boolean { ref mut default } = self.kind {
            *default = Some(value);
        }
        self
    }

    /// Builder: default for an integer attribute
    pub fn default_int(mut self, value: i64) -> Self {
        debug_assert!(matches!(self.kind, AttributeKind::Integer { .. }));
        if let AttributeKind::Integer { ref mut default, .. } = self.kind {
            *default = Some(value);
        }
        self
    }

    /// Builder: lower bound for an integer attribute
    pub fn min(mut self, value: i64) -> Self {
        debug_assert!(matches!(self.kind, AttributeKind::Integer { .. }));
        if let AttributeKind::Integer { ref mut min, .. } = self.kind {
            *min = Some(value);
        }
        self
    }

    /// Builder: upper bound for an integer attribute
    pub fn max(mut self, value: i64) -> Self {
        debug_assert!(matches!(self.kind, AttributeKind::Integer { .. }));
        if let AttributeKind::Integer { ref mut max, .. } = self.kind {
            *max = Some(value);
        }
        self
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match &self.kind {
            AttributeKind::String { size: 0, .. } => {
                problems.push(format!("attribute '{}' has a zero size", self.key));
            }
            AttributeKind::Integer {
                min: Some(min),
                max: Some(max),
                ..
            } if min > max => {
                problems.push(format!("attribute '{}' has min {min} > max {max}", self.key));
            }
            AttributeKind::Integer {
                default: Some(value),
                min,
                max,
            } if min.is_some_and(|m| *value < m) || max.is_some_and(|m| *value > m) => {
                problems.push(format!("attribute '{}' default {value} is out of range", self.key));
            }
            _ => {}
        }
        problems
    }
}

// ============================================================================
// Indexes
// ============================================================================

/// Index sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Index type understood by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    #[default]
    Key,
    Unique,
    Fulltext,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Unique => "unique",
            Self::Fulltext => "fulltext",
        }
    }
}

/// One `(attribute, direction)` entry of an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexField {
    pub attribute: String,
    pub order: SortOrder,
}

/// Ordered key-attribute list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    pub key: String,
    #[serde(rename = "type")]
    pub index_type: IndexType,
    pub fields: Vec<IndexField>,
}

impl IndexSpec {
    fn with_type(key: impl Into<String>, index_type: IndexType) -> Self {
        Self {
            key: key.into(),
            index_type,
            fields: Vec::new(),
        }
    }

    /// Plain key index
    pub fn key(key: impl Into<String>) -> Self {
        Self::with_type(key, IndexType::Key)
    }

    /// Unique index
    pub fn unique(key: impl Into<String>) -> Self {
        Self::with_type(key, IndexType::Unique)
    }

    /// Builder: append an ascending field
    pub fn asc(mut self, attribute: impl Into<String>) -> Self {
        self.fields.push(IndexField {
            attribute: attribute.into(),
            order: SortOrder::Asc,
        });
        self
    }

    /// Builder: append a descending field
    pub fn desc(mut self, attribute: impl Into<String>) -> Self {
        self.fields.push(IndexField {
            attribute: attribute.into(),
            order: SortOrder::Desc,
        });
        self
    }

    pub fn attributes(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.attribute.as_str()).collect()
    }

    pub fn orders(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.order.as_str()).collect()
    }
}

// ============================================================================
// Collections
// ============================================================================

/// Declarative description of one collection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// Stable key, used as the idempotency key across runs
    pub id: String,
    pub display_name: String,
    pub attributes: Vec<AttributeSpec>,
    pub indexes: Vec<IndexSpec>,
    pub permissions: Vec<PermissionRule>,
    pub document_security: bool,
    pub enabled: bool,
}

impl ResourceSpec {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            attributes: Vec::new(),
            indexes: Vec::new(),
            permissions: Vec::new(),
            document_security: true,
            enabled: true,
        }
    }

    /// Builder: set permissions
    pub fn with_permissions(mut self, permissions: Vec<PermissionRule>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Builder: append an attribute
    pub fn attribute(mut self, attribute: AttributeSpec) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Builder: append an index
    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Same collection without attributes or indexes
    pub fn collection_only(&self) -> Self {
        Self {
            attributes: Vec::new(),
            indexes: Vec::new(),
            ..self.clone()
        }
    }

    /// Check internal consistency of the declaration
    ///
    /// Attribute and index keys must be unique, and every index field must
    /// name an attribute declared alongside it.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.id.is_empty() {
            problems.push("collection id is empty".to_string());
        }

        let mut attribute_keys = HashSet::new();
        for attribute in &self.attributes {
            if !attribute_keys.insert(attribute.key.as_str()) {
                problems.push(format!("duplicate attribute '{}'", attribute.key));
            }
            problems.extend(attribute.problems());
        }

        let mut index_keys = HashSet::new();
        for index in &self.indexes {
            if !index_keys.insert(index.key.as_str()) {
                problems.push(format!("duplicate index '{}'", index.key));
            }
            if index.fields.is_empty() {
                problems.push(format!("index '{}' has no fields", index.key));
            }
            for field in &index.fields {
                if !attribute_keys.contains(field.attribute.as_str()) {
                    problems.push(format!(
                        "index '{}' references unknown attribute '{}'",
                        index.key, field.attribute
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CaresError::config(format!(
                "collection '{}': {}",
                self.id,
                problems.join("; ")
            )))
        }
    }
}

/// Collection as reported by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "$permissions", default)]
    pub permissions: Vec<String>,
    #[serde(rename = "documentSecurity", default)]
    pub document_security: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Full replacement of a collection's settings
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionUpdate {
    pub collection_id: String,
    pub name: String,
    pub permissions: Vec<PermissionRule>,
    pub document_security: bool,
    pub enabled: bool,
}

impl CollectionUpdate {
    /// Check whether applying this update would change `current`
    pub fn differs_from(&self, current: &Collection) -> bool {
        let wanted: HashSet<String> = render_permissions(&self.permissions).into_iter().collect();
        let present: HashSet<String> = current.permissions.iter().cloned().collect();

        wanted != present
            || self.name != current.name
            || self.document_security != current.document_security
            || self.enabled != current.enabled
    }
}
