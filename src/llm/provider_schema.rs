//! The provider-side schema shape and the conversion contract spec
//! §4.9 keeps explicitly in scope: translating the internal
//! `SchemaType` to a provider's own type representation and back
//! without losing a tool's name, required fields, or leaf types. This
//! crate has no concrete third-party provider SDK wired in yet, so the
//! shape below is a second, differently-cased representation standing
//! in for one — enough to exercise a real conversion rather than a
//! type alias.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{SchemaType, ToolSpec};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum ProviderSchema {
    Object {
        props: BTreeMap<String, ProviderSchema>,
        req: Vec<String>,
    },
    Array {
        of: Box<ProviderSchema>,
    },
    Str {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        allowed: Vec<String>,
    },
    Num,
    Int,
    Bool,
}

pub fn to_provider_schema(schema: &SchemaType) -> ProviderSchema {
    match schema {
        SchemaType::Object { properties, required } => ProviderSchema::Object {
            props: properties
                .iter()
                .map(|(k, v)| (k.clone(), to_provider_schema(v)))
                .collect(),
            req: required.clone(),
        },
        SchemaType::Array { items } => ProviderSchema::Array {
            of: Box::new(to_provider_schema(items)),
        },
        SchemaType::String { r#enum } => ProviderSchema::Str {
            allowed: r#enum.clone(),
        },
        SchemaType::Number => ProviderSchema::Num,
        SchemaType::Integer => ProviderSchema::Int,
        SchemaType::Boolean => ProviderSchema::Bool,
    }
}

pub fn from_provider_schema(schema: &ProviderSchema) -> SchemaType {
    match schema {
        ProviderSchema::Object { props, req } => SchemaType::Object {
            properties: props
                .iter()
                .map(|(k, v)| (k.clone(), from_provider_schema(v)))
                .collect(),
            required: req.clone(),
        },
        ProviderSchema::Array { of } => SchemaType::Array {
            items: Box::new(from_provider_schema(of)),
        },
        ProviderSchema::Str { allowed } => SchemaType::String {
            r#enum: allowed.clone(),
        },
        ProviderSchema::Num => SchemaType::Number,
        ProviderSchema::Int => SchemaType::Integer,
        ProviderSchema::Bool => SchemaType::Boolean,
    }
}

/// Round-trips a tool's schema through the provider shape. Adapters run
/// this right before issuing a call and right after parsing a tool_use
/// response back into the core schema.
pub fn roundtrip_tool_schema(spec: &ToolSpec) -> ToolSpec {
    ToolSpec {
        name: spec.name.clone(),
        description: spec.description.clone(),
        input_schema: from_provider_schema(&to_provider_schema(&spec.input_schema)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_tool() -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "query".to_string(),
            SchemaType::String {
                r#enum: Vec::new(),
            },
        );
        properties.insert(
            "sort".to_string(),
            SchemaType::String {
                r#enum: vec!["asc".to_string(), "desc".to_string()],
            },
        );
        properties.insert(
            "limit".to_string(),
            SchemaType::Integer,
        );
        properties.insert(
            "tags".to_string(),
            SchemaType::Array {
                items: Box::new(SchemaType::String { r#enum: Vec::new() }),
            },
        );

        ToolSpec {
            name: "search".to_string(),
            description: "search the web".to_string(),
            input_schema: SchemaType::Object {
                properties,
                required: vec!["query".to_string()],
            },
        }
    }

    #[test]
    fn roundtrip_preserves_name_required_and_leaf_types() {
        let original = search_tool();
        let roundtripped = roundtrip_tool_schema(&original);

        assert_eq!(roundtripped.name, original.name);

        let (SchemaType::Object { properties, required }, SchemaType::Object {
            properties: original_properties,
            required: original_required,
        }) = (&roundtripped.input_schema, &original.input_schema)
        else {
            panic!("expected object schemas");
        };
        assert_eq!(required, original_required);

        assert!(matches!(properties["query"], SchemaType::String { .. }));
        assert!(matches!(original_properties["query"], SchemaType::String { .. }));

        match &properties["sort"] {
            SchemaType::String { r#enum } => {
                assert_eq!(r#enum, &vec!["asc".to_string(), "desc".to_string()]);
            }
            _ => panic!("expected string schema for sort"),
        }
        assert!(matches!(properties["limit"], SchemaType::Integer));
        assert!(matches!(properties["tags"], SchemaType::Array { .. }));
    }

    #[test]
    fn provider_schema_serializes_with_its_own_tags() {
        let provider = to_provider_schema(&SchemaType::Boolean);
        let json = serde_json::to_value(&provider).unwrap();
        assert_eq!(json["kind"], "BOOL");
    }
}
