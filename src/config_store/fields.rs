use crate::error::{AppError, Result};
use crate::state::query::KEYWORD_SUFFIX;
use crate::state::{Filter, SortOrder, SortSpec};
use serde_json::Value;

/// How a listable field is indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Numeric document metadata; filters accept a value or a `from..to` range
    Metadata,
    /// Exact-match field; filters accept a comma separated value list
    Keyword,
    /// Free text; sorted on its keyword form, filtered by substring
    Text,
}

/// A field callers may sort or filter config listings on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListField {
    pub name: &'static str,
    pub path: &'static str,
    pub kind: FieldKind,
}

const FIELDS: &[ListField] = &[
    ListField {
        name: "last_updated_time_ms",
        path: "metadata.last_update_time_ms",
        kind: FieldKind::Metadata,
    },
    ListField {
        name: "created_time_ms",
        path: "metadata.created_time_ms",
        kind: FieldKind::Metadata,
    },
    ListField {
        name: "config_id",
        path: "config_id",
        kind: FieldKind::Keyword,
    },
    ListField {
        name: "config_type",
        path: "config.config_type",
        kind: FieldKind::Keyword,
    },
    ListField {
        name: "is_enabled",
        path: "config.is_enabled",
        kind: FieldKind::Keyword,
    },
    ListField {
        name: "url",
        path: "config.url",
        kind: FieldKind::Keyword,
    },
    ListField {
        name: "topic_arn",
        path: "config.topic_arn",
        kind: FieldKind::Keyword,
    },
    ListField {
        name: "from_address",
        path: "config.from_address",
        kind: FieldKind::Keyword,
    },
    ListField {
        name: "email_account_id",
        path: "config.email_account_id",
        kind: FieldKind::Keyword,
    },
    ListField {
        name: "region",
        path: "config.region",
        kind: FieldKind::Keyword,
    },
    ListField {
        name: "name",
        path: "config.name",
        kind: FieldKind::Text,
    },
    ListField {
        name: "description",
        path: "config.description",
        kind: FieldKind::Text,
    },
];

impl ListField {
    pub fn all() -> &'static [ListField] {
        FIELDS
    }

    pub fn lookup(name: &str) -> Result<&'static ListField> {
        FIELDS
            .iter()
            .find(|field| field.name == name)
            .ok_or_else(|| AppError::Validation(format!("Unknown field '{}'", name)))
    }

    /// Storage path used when sorting on this field
    pub fn sort_path(&self) -> String {
        match self.kind {
            FieldKind::Text => format!("{}{}", self.path, KEYWORD_SUFFIX),
            FieldKind::Metadata | FieldKind::Keyword => self.path.to_string(),
        }
    }

    pub fn sort(&self, order: SortOrder) -> SortSpec {
        SortSpec {
            path: self.sort_path(),
            order,
        }
    }

    /// Translate a textual filter value into a store filter
    pub fn filter(&self, raw: &str) -> Result<Filter> {
        let path = self.path.to_string();
        match self.kind {
            FieldKind::Text => Ok(Filter::Text {
                path,
                text: raw.to_string(),
            }),
            FieldKind::Keyword => Ok(Filter::Terms {
                path,
                values: raw
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(keyword_value)
                    .collect(),
            }),
            FieldKind::Metadata => match raw.split_once("..") {
                Some((from, to)) => Ok(Filter::Range {
                    path,
                    gte: self.bound(from)?,
                    lte: self.bound(to)?,
                }),
                None => Ok(Filter::Terms {
                    path,
                    values: vec![self.number(raw)?],
                }),
            },
        }
    }

    fn bound(&self, raw: &str) -> Result<Option<Value>> {
        if raw.trim().is_empty() {
            Ok(None)
        } else {
            self.number(raw).map(Some)
        }
    }

    fn number(&self, raw: &str) -> Result<Value> {
        raw.trim().parse::<i64>().map(Value::from).map_err(|_| {
            AppError::Validation(format!(
                "Field '{}' expects a number or range, got '{}'",
                self.name, raw
            ))
        })
    }
}

fn keyword_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_rejected() {
        let err = ListField::lookup("password").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_text_fields_sort_on_keyword_path() {
        let name = ListField::lookup("name").unwrap();
        assert_eq!(name.sort_path(), "config.name.keyword");

        let updated = ListField::lookup("last_updated_time_ms").unwrap();
        assert_eq!(updated.sort_path(), "metadata.last_update_time_ms");
    }

    #[test]
    fn test_keyword_filter_splits_values() {
        let field = ListField::lookup("config_type").unwrap();
        let filter = field.filter("slack, chime").unwrap();
        assert_eq!(
            filter,
            Filter::Terms {
                path: "config.config_type".to_string(),
                values: vec![Value::from("slack"), Value::from("chime")],
            }
        );

        let enabled = ListField::lookup("is_enabled").unwrap().filter("true").unwrap();
        assert!(matches!(enabled, Filter::Terms { values, .. } if values == vec![Value::Bool(true)]));
    }

    #[test]
    fn test_metadata_range_filter() {
        let field = ListField::lookup("created_time_ms").unwrap();
        match field.filter("100..").unwrap() {
            Filter::Range { gte, lte, .. } => {
                assert_eq!(gte, Some(Value::from(100)));
                assert_eq!(lte, None);
            }
            other => panic!("unexpected filter {:?}", other),
        }

        assert!(field.filter("yesterday").is_err());
    }
}
