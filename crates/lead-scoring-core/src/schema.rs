//! Feature schema for lead records
//!
//! The schema is the single source of truth for what a lead record looks like
//! and how it maps onto the model's feature columns. It is declared once as a
//! static table ([`LEAD_SCHEMA`]) so the category→column lookup is frozen at
//! compile time and versioned together with the field list.
//!
//! Validation is field-by-field in declaration order and stops at the first
//! violation. A successful validation yields a [`ValidatedLead`], which is the
//! only input the encoder accepts.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::SchemaError;

/// Version tag of the lead schema; model artifacts must declare the same tag
pub const SCHEMA_VERSION: &str = "lead-v1";

/// Numeric rescaling applied by the encoder, fixed at training time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scaling {
    /// Pass the value through unchanged
    Identity,
    /// `(value - mean) / std`
    Standard { mean: f64, std: f64 },
}

impl Scaling {
    pub fn apply(&self, value: f64) -> f64 {
        match *self {
            Scaling::Identity => value,
            Scaling::Standard { mean, std } => (value - mean) / std,
        }
    }
}

/// One admissible value of a categorical field
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Category {
    /// Canonical label, as accepted on the wire
    pub label: &'static str,
    /// One-hot column for this category; `None` marks the reference (dropped) category
    pub column: Option<&'static str>,
}

impl Category {
    pub const fn reference(label: &'static str) -> Self {
        Self {
            label,
            column: None,
        }
    }

    pub const fn column(label: &'static str, column: &'static str) -> Self {
        Self {
            label,
            column: Some(column),
        }
    }
}

/// Type and domain of a field
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Numeric {
        min: f64,
        max: f64,
        integer: bool,
        scaling: Scaling,
    },
    Categorical {
        categories: &'static [Category],
    },
}

/// Value used when an optional field is absent
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldDefault {
    Number(f64),
    Category(&'static str),
}

/// Declaration of a single input field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// Canonical field name
    pub name: &'static str,
    /// Alternative names accepted on input
    pub aliases: &'static [&'static str],
    pub kind: FieldKind,
    /// `None` means the field is required
    pub default: Option<FieldDefault>,
    pub description: &'static str,
}

impl FieldSpec {
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    /// Number of feature columns this field contributes
    pub fn width(&self) -> usize {
        match self.kind {
            FieldKind::Numeric { .. } => 1,
            FieldKind::Categorical { categories } => {
                categories.iter().filter(|c| c.column.is_some()).count()
            }
        }
    }

    fn lookup<'r>(&self, record: &'r Map<String, Value>) -> Option<&'r Value> {
        std::iter::once(self.name)
            .chain(self.aliases.iter().copied())
            .filter_map(|key| record.get(key))
            .find(|v| !v.is_null())
    }

    fn check(&self, raw: &Value) -> Result<FieldValue, SchemaError> {
        match self.kind {
            FieldKind::Numeric {
                min, max, integer, ..
            } => {
                let expected = if integer { "integer" } else { "number" };
                let value = raw.as_f64().ok_or_else(|| {
                    SchemaError::invalid_type(self.name, expected, json_type_name(raw))
                })?;
                if !value.is_finite() {
                    return Err(SchemaError::invalid_type(self.name, expected, "non-finite number"));
                }
                if integer && value.fract() != 0.0 {
                    return Err(SchemaError::invalid_type(self.name, "integer", "fractional number"));
                }
                if value < min || value > max {
                    return Err(SchemaError::out_of_range(self.name, value, min, max));
                }
                Ok(FieldValue::Number(value))
            }
            FieldKind::Categorical { categories } => {
                let text = raw.as_str().ok_or_else(|| {
                    SchemaError::invalid_type(self.name, "string", json_type_name(raw))
                })?;
                let needle = text.trim();
                categories
                    .iter()
                    .position(|c| c.label.eq_ignore_ascii_case(needle))
                    .map(FieldValue::Category)
                    .ok_or_else(|| {
                        let domain: Vec<&str> = categories.iter().map(|c| c.label).collect();
                        SchemaError::out_of_domain(self.name, text, &domain)
                    })
            }
        }
    }

    fn default_value(&self) -> Option<FieldValue> {
        match (self.default?, self.kind) {
            (FieldDefault::Number(v), FieldKind::Numeric { .. }) => Some(FieldValue::Number(v)),
            (FieldDefault::Category(label), FieldKind::Categorical { categories }) => categories
                .iter()
                .position(|c| c.label == label)
                .map(FieldValue::Category),
            _ => None,
        }
    }

    /// Deterministic stand-in value: the default, else the reference category or range minimum
    fn reference_value(&self) -> FieldValue {
        if let Some(value) = self.default_value() {
            return value;
        }
        match self.kind {
            FieldKind::Numeric { min, .. } => FieldValue::Number(min),
            FieldKind::Categorical { categories } => FieldValue::Category(
                categories
                    .iter()
                    .position(|c| c.column.is_none())
                    .unwrap_or(0),
            ),
        }
    }
}

/// A field value after validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Number(f64),
    /// Index into the field's category list
    Category(usize),
}

/// Ordered set of field declarations plus the schema version tag
#[derive(Debug)]
pub struct FeatureSchema {
    version: &'static str,
    fields: &'static [FieldSpec],
}

impl FeatureSchema {
    pub const fn new(version: &'static str, fields: &'static [FieldSpec]) -> Self {
        Self { version, fields }
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Length of every feature vector produced from this schema
    pub fn feature_count(&self) -> usize {
        self.fields.iter().map(FieldSpec::width).sum()
    }

    /// Column names in feature-vector order
    pub fn feature_names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(self.feature_count());
        for field in self.fields {
            match field.kind {
                FieldKind::Numeric { .. } => names.push(field.name),
                FieldKind::Categorical { categories } => {
                    names.extend(categories.iter().filter_map(|c| c.column));
                }
            }
        }
        names
    }

    /// Validate a raw record, returning the normalized record or the first violation
    pub fn validate(&self, record: &Map<String, Value>) -> Result<ValidatedLead<'_>, SchemaError> {
        let mut values = Vec::with_capacity(self.fields.len());

        for field in self.fields {
            let value = match field.lookup(record) {
                Some(raw) => field.check(raw)?,
                None => field
                    .default_value()
                    .ok_or_else(|| SchemaError::missing(field.name))?,
            };
            values.push(value);
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            for key in record.keys() {
                let known = self
                    .fields
                    .iter()
                    .any(|f| f.name == key || f.aliases.contains(&key.as_str()));
                if !known {
                    tracing::debug!(field = %key, "Ignoring unknown field");
                }
            }
        }

        Ok(ValidatedLead {
            schema: self,
            values,
        })
    }

    /// A valid record built only from defaults, reference categories and range minimums
    pub fn reference_record(&self) -> ValidatedLead<'_> {
        ValidatedLead {
            schema: self,
            values: self.fields.iter().map(FieldSpec::reference_value).collect(),
        }
    }

    /// Check the static declarations for internal consistency
    pub fn verify(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for field in self.fields {
            for name in std::iter::once(field.name).chain(field.aliases.iter().copied()) {
                if !seen.insert(name) {
                    return Err(format!("duplicate field name or alias '{}'", name));
                }
            }
            match field.kind {
                FieldKind::Numeric { min, max, scaling, .. } => {
                    if !(min.is_finite() && max.is_finite() && min <= max) {
                        return Err(format!("field '{}' has an invalid range", field.name));
                    }
                    if let Scaling::Standard { std, .. } = scaling {
                        if !(std.is_finite() && std > 0.0) {
                            return Err(format!("field '{}' has a non-positive std", field.name));
                        }
                    }
                }
                FieldKind::Categorical { categories } => {
                    let references = categories.iter().filter(|c| c.column.is_none()).count();
                    if references > 1 {
                        return Err(format!(
                            "field '{}' declares {} reference categories",
                            field.name, references
                        ));
                    }
                }
            }
            if field.default.is_some() && field.default_value().is_none() {
                return Err(format!("field '{}' has a default outside its domain", field.name));
            }
        }

        let names = self.feature_names();
        let unique: std::collections::HashSet<_> = names.iter().collect();
        if unique.len() != names.len() {
            return Err("duplicate feature column".to_string());
        }
        Ok(())
    }

    pub fn describe(&self) -> SchemaDescription<'_> {
        SchemaDescription {
            version: self.version,
            feature_count: self.feature_count(),
            feature_names: self.feature_names(),
            fields: self
                .fields
                .iter()
                .map(|f| FieldDescription {
                    name: f.name,
                    aliases: f.aliases,
                    required: f.is_required(),
                    kind: &f.kind,
                    default: f.default,
                    description: f.description,
                })
                .collect(),
        }
    }
}

/// Serializable view of a schema, served at `GET /schema`
#[derive(Debug, Serialize)]
pub struct SchemaDescription<'a> {
    pub version: &'a str,
    pub feature_count: usize,
    pub feature_names: Vec<&'a str>,
    pub fields: Vec<FieldDescription<'a>>,
}

#[derive(Debug, Serialize)]
pub struct FieldDescription<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub aliases: &'a [&'a str],
    pub required: bool,
    #[serde(flatten)]
    pub kind: &'a FieldKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldDefault>,
    pub description: &'a str,
}

/// A record that passed schema validation
///
/// Only [`FeatureSchema::validate`] and [`FeatureSchema::reference_record`]
/// construct this type, so every value is known to be in-domain.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedLead<'s> {
    schema: &'s FeatureSchema,
    values: Vec<FieldValue>,
}

impl PartialEq for FeatureSchema {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.fields == other.fields
    }
}

impl<'s> ValidatedLead<'s> {
    pub fn schema(&self) -> &'s FeatureSchema {
        self.schema
    }

    /// Values aligned with `schema().fields()`
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.schema
            .fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| self.values[i])
    }

    /// Canonical label of a categorical field
    pub fn label(&self, name: &str) -> Option<&'static str> {
        let index = self.schema.fields.iter().position(|f| f.name == name)?;
        match (self.schema.fields[index].kind, self.values[index]) {
            (FieldKind::Categorical { categories }, FieldValue::Category(i)) => {
                categories.get(i).map(|c| c.label)
            }
            _ => None,
        }
    }
}

/// Serializes as the normalized record: canonical names, canonical labels, integers as integers
impl Serialize for ValidatedLead<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in self.schema.fields.iter().zip(&self.values) {
            match (field.kind, value) {
                (FieldKind::Numeric { integer: true, .. }, FieldValue::Number(v)) => {
                    map.serialize_entry(field.name, &(*v as i64))?
                }
                (_, FieldValue::Number(v)) => map.serialize_entry(field.name, v)?,
                (FieldKind::Categorical { categories }, FieldValue::Category(i)) => {
                    map.serialize_entry(field.name, categories[*i].label)?
                }
                (FieldKind::Numeric { .. }, FieldValue::Category(i)) => {
                    map.serialize_entry(field.name, i)?
                }
            }
        }
        map.end()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

const fn yes_no(column: &'static str) -> [Category; 2] {
    [Category::reference("No"), Category::column("Yes", column)]
}

const OCCUPATION: &[Category] = &[
    Category::reference("Professional"),
    Category::column("Student", "current_occupation_student"),
    Category::column("Unemployed", "current_occupation_unemployed"),
];

const FIRST_INTERACTION: &[Category] = &[
    Category::reference("Mobile App"),
    Category::column("Website", "first_interaction_website"),
];

const PROFILE_COMPLETED: &[Category] = &[
    Category::reference("High"),
    Category::column("Low", "profile_completed_low"),
    Category::column("Medium", "profile_completed_medium"),
];

const LAST_ACTIVITY: &[Category] = &[
    Category::reference("Email"),
    Category::column("Phone", "last_activity_phone"),
    Category::column("Website", "last_activity_website"),
];

const PRINT_MEDIA_TYPE1: &[Category] = &yes_no("print_media_type1_yes");
const PRINT_MEDIA_TYPE2: &[Category] = &yes_no("print_media_type2_yes");
const DIGITAL_MEDIA: &[Category] = &yes_no("digital_media_yes");
const EDUCATIONAL_CHANNELS: &[Category] = &yes_no("educational_channels_yes");
const REFERRAL: &[Category] = &yes_no("referral_yes");

const fn numeric(min: f64, max: f64, integer: bool) -> FieldKind {
    FieldKind::Numeric {
        min,
        max,
        integer,
        scaling: Scaling::Identity,
    }
}

const fn yes_no_field(
    name: &'static str,
    categories: &'static [Category],
    description: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        aliases: &[],
        kind: FieldKind::Categorical { categories },
        default: Some(FieldDefault::Category("No")),
        description,
    }
}

const LEAD_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "age",
        aliases: &[],
        kind: numeric(0.0, 100.0, true),
        default: Some(FieldDefault::Number(52.0)),
        description: "Age of the lead in years",
    },
    FieldSpec {
        name: "website_visits",
        aliases: &[],
        kind: numeric(0.0, 10_000.0, true),
        default: None,
        description: "Total number of visits to the website",
    },
    FieldSpec {
        name: "time_spent_on_website",
        aliases: &["time_spent"],
        kind: numeric(0.0, 1_000_000.0, false),
        default: None,
        description: "Total time spent on the website in seconds",
    },
    FieldSpec {
        name: "page_views_per_visit",
        aliases: &[],
        kind: numeric(0.0, 1_000.0, false),
        default: Some(FieldDefault::Number(3.0)),
        description: "Average number of pages viewed per visit",
    },
    FieldSpec {
        name: "current_occupation",
        aliases: &[],
        kind: FieldKind::Categorical {
            categories: OCCUPATION,
        },
        default: Some(FieldDefault::Category("Professional")),
        description: "Current occupation of the lead",
    },
    FieldSpec {
        name: "first_interaction",
        aliases: &[],
        kind: FieldKind::Categorical {
            categories: FIRST_INTERACTION,
        },
        default: None,
        description: "Channel of the first interaction with the lead",
    },
    FieldSpec {
        name: "profile_completed",
        aliases: &[],
        kind: FieldKind::Categorical {
            categories: PROFILE_COMPLETED,
        },
        default: None,
        description: "Profile completion level (Low 0-50%, Medium 50-75%, High 75-100%)",
    },
    FieldSpec {
        name: "last_activity",
        aliases: &[],
        kind: FieldKind::Categorical {
            categories: LAST_ACTIVITY,
        },
        default: Some(FieldDefault::Category("Email")),
        description: "Most recent interaction with the lead",
    },
    yes_no_field("print_media_type1", PRINT_MEDIA_TYPE1, "Seen the newspaper ad"),
    yes_no_field("print_media_type2", PRINT_MEDIA_TYPE2, "Seen the magazine ad"),
    yes_no_field("digital_media", DIGITAL_MEDIA, "Seen a digital media ad"),
    yes_no_field(
        "educational_channels",
        EDUCATIONAL_CHANNELS,
        "Heard of the offer through educational channels",
    ),
    yes_no_field("referral", REFERRAL, "Referred by another lead"),
];

/// The lead schema the production model was trained on
pub static LEAD_SCHEMA: FeatureSchema = FeatureSchema::new(SCHEMA_VERSION, LEAD_FIELDS);
