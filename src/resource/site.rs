//! Sites: areas, buildings and floors of the site hierarchy
//!
//! A site is named by its full hierarchy name (`Global/US/HQ`), which is also
//! what the controller filters on. Reads return the leaf name plus
//! `siteNameHierarchy` and bury type and location under `additionalInfo`;
//! writes take `{type, site: {<type>: {name, parentName, ...}}}` with the
//! leaf name. Sites are created through the execution-status API and
//! everything else hangs off them, so a failed site stops the rest of the
//! plan.

use declarative::{Endpoint, FieldSpec, FieldType, ReadOp, ResourceDescriptor, Result, Schema};
use serde_json::{Map, Number, Value};

pub const KIND: &str = "site";

const PATH: &str = "/dna/intent/api/v1/site";

/// Fields copied as-is between the flat form and the nested site body
const LOCATION: [&str; 4] = ["address", "latitude", "longitude", "rfModel"];

pub fn descriptor() -> Result<ResourceDescriptor> {
    let schema = Schema::new()
        .field(FieldSpec::str("id"))
        .field(
            FieldSpec::str("name")
                .required()
                .describe("Full hierarchy name, e.g. Global/US/HQ"),
        )
        .field(
            FieldSpec::str("parent_name")
                .describe("Hierarchy name of the parent, e.g. Global/US; orders creation after it"),
        )
        .field(
            FieldSpec::str("site_type")
                .default("area")
                .choices(["area", "building", "floor"]),
        )
        .field(FieldSpec::str("address"))
        .field(FieldSpec::new("latitude", FieldType::Float).range(-90.0, 90.0))
        .field(FieldSpec::new("longitude", FieldType::Float).range(-180.0, 180.0))
        .field(
            FieldSpec::str("rf_model").choices([
                "Cubes And Walled Offices",
                "Drywall Office Only",
                "Indoor High Ceiling",
                "Outdoor Open Space",
            ]),
        );

    ResourceDescriptor::builder(KIND, schema)
        .description("Site hierarchy (area, building, floor)")
        .identity(&["name"])
        .id_field("id")
        // the parent is part of the hierarchy name
        .comparable(&["name", "site_type", "address", "latitude", "longitude", "rf_model"])
        .depends_on("parent_name", KIND, "name")
        .api_name("parent_name", "parentName")
        .api_name("site_type", "type")
        .api_name("rf_model", "rfModel")
        .decode(decode)
        .encode(encode)
        .scope(&["parent_name"])
        .list(ReadOp::new(PATH).query("name", "{name}"))
        .create(Endpoint::post(PATH))
        .update(Endpoint::put(format!("{PATH}/{{id}}")))
        .delete(Endpoint::delete(format!("{PATH}/{{id}}")))
        .plan_fatal()
        .build()
}

/// Flatten a site read into hierarchy name, parent and location fields.
fn decode(object: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    if let Some(id) = object.get("id") {
        flat.insert("id".to_string(), id.clone());
    }

    let name = object
        .get("siteNameHierarchy")
        .or_else(|| object.get("name"))
        .and_then(Value::as_str);
    if let Some(name) = name {
        flat.insert("name".to_string(), Value::String(name.to_string()));
        if let Some((parent, _)) = name.rsplit_once('/') {
            flat.insert("parentName".to_string(), Value::String(parent.to_string()));
        }
    }

    let attributes = object
        .get("additionalInfo")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|info| info.get("attributes")?.as_object());
    for attributes in attributes {
        for (key, value) in attributes {
            let value = match key.as_str() {
                "type" | "address" | "rfModel" => value.clone(),
                // coordinates come back as strings
                "latitude" | "longitude" => match coordinate(value) {
                    Some(value) => value,
                    None => continue,
                },
                _ => continue,
            };
            if !value.is_null() {
                flat.entry(key.clone()).or_insert(value);
            }
        }
    }
    flat
}

fn coordinate(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

/// Nest a flat payload under its type, splitting the hierarchy name into
/// leaf and parent.
fn encode(payload: &Map<String, Value>) -> Map<String, Value> {
    let site_type = payload
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("area")
        .to_string();
    let hierarchy = payload.get("name").and_then(Value::as_str).unwrap_or_default();

    let mut site = Map::new();
    let parent = match hierarchy.rsplit_once('/') {
        Some((parent, leaf)) => {
            site.insert("name".to_string(), Value::String(leaf.to_string()));
            Some(Value::String(parent.to_string()))
        }
        None => {
            site.insert("name".to_string(), Value::String(hierarchy.to_string()));
            payload.get("parentName").filter(|v| !v.is_null()).cloned()
        }
    };
    if let Some(parent) = parent {
        site.insert("parentName".to_string(), parent);
    }
    for key in LOCATION {
        if let Some(value) = payload.get(key).filter(|v| !v.is_null()) {
            site.insert(key.to_string(), value.clone());
        }
    }

    let mut by_type = Map::new();
    by_type.insert(site_type.clone(), Value::Object(site));
    let mut body = Map::new();
    body.insert("type".to_string(), Value::String(site_type));
    body.insert("site".to_string(), Value::Object(by_type));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_uses_hierarchy_name() {
        let site = descriptor().unwrap();
        let raw = json!({
            "id": "s-1",
            "parentId": "p-1",
            "name": "HQ",
            "siteNameHierarchy": "Global/US/HQ",
            "additionalInfo": [
                {"nameSpace": "Location", "attributes": {
                    "type": "building",
                    "address": "1 Main St",
                    "latitude": "37.41",
                    "longitude": "-121.95",
                    "country": "United States",
                }},
                {"nameSpace": "ETA", "attributes": {"member.etaCapable.direct": "false"}},
            ],
        });
        let current = site.normalize_current(&raw).unwrap();
        assert_eq!(current["id"], "s-1");
        assert_eq!(current["name"], "Global/US/HQ");
        assert_eq!(current["parent_name"], "Global/US");
        assert_eq!(current["site_type"], "building");
        assert_eq!(current["address"], "1 Main St");
        assert_eq!(current["latitude"], json!(37.41));
        assert_eq!(current["longitude"], json!(-121.95));
        assert!(!current.contains_key("country"));
    }

    #[test]
    fn test_global_has_no_parent() {
        let site = descriptor().unwrap();
        let current = site
            .normalize_current(&json!({"id": "g", "name": "Global", "siteNameHierarchy": "Global"}))
            .unwrap();
        assert_eq!(current["name"], "Global");
        assert!(!current.contains_key("parent_name"));
    }

    #[test]
    fn test_write_nests_leaf_under_type() {
        let site = descriptor().unwrap();
        let payload = json!({
            "name": "Global/US/HQ",
            "parent_name": "Global/US",
            "site_type": "building",
            "address": "1 Main St",
            "latitude": 37.41,
        });
        let body = site
            .request_body(site.create.as_ref().unwrap(), payload.as_object().unwrap())
            .unwrap();
        assert_eq!(
            body,
            json!({
                "type": "building",
                "site": {"building": {
                    "name": "HQ",
                    "parentName": "Global/US",
                    "address": "1 Main St",
                    "latitude": 37.41,
                }},
            })
        );
    }

    #[test]
    fn test_write_takes_parent_from_hierarchy() {
        let site = descriptor().unwrap();
        let payload = json!({"id": "s-1", "name": "Global/EU", "parent_name": "Global/US", "site_type": "area"});
        let body = site.to_api(payload.as_object().unwrap());
        assert_eq!(body["site"]["area"]["name"], "EU");
        assert_eq!(body["site"]["area"]["parentName"], "Global");
        assert!(!body.contains_key("id"));
    }
}
