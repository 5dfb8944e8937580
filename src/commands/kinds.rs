//! `ccwm kinds`: the built-in resource kinds and their schemas

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{FieldSpec, ResourceDescriptor};
use serde_json::{Value, json};
use std::process::ExitCode;

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, kind: Option<&str>) -> Result<ExitCode> {
    let registry = super::registry()?;

    let Some(kind) = kind else {
        if ctx.json {
            let kinds: Vec<Value> = registry
                .iter()
                .map(|d| json!({"kind": d.kind, "description": d.description}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&kinds)?);
        } else {
            ui::header("Resource kinds");
            for descriptor in registry.iter() {
                println!("  {:<12} {}", descriptor.kind.bold(), descriptor.description.dimmed());
            }
        }
        return Ok(ExitCode::SUCCESS);
    };

    let Some(descriptor) = registry.get(kind) else {
        let known: Vec<&str> = registry.kinds().collect();
        bail!("Unknown resource kind '{kind}' (known: {})", known.join(", "));
    };

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&describe(descriptor))?);
    } else {
        print_descriptor(descriptor);
    }
    Ok(ExitCode::SUCCESS)
}

/// Machine-readable summary of a descriptor
pub fn describe(descriptor: &ResourceDescriptor) -> Value {
    let fields: Vec<Value> = descriptor
        .schema
        .fields
        .iter()
        .map(|f| {
            json!({
                "name": f.name,
                "type": f.ty,
                "required": f.required,
                "default": f.default,
                "choices": f.choices,
                "sensitive": f.sensitive,
                "description": f.description,
            })
        })
        .collect();
    let dependencies: Vec<String> = descriptor
        .dependencies
        .iter()
        .map(|d| format!("{} -> {}.{}", d.field, d.target_kind, d.target_field))
        .collect();
    json!({
        "kind": descriptor.kind,
        "description": descriptor.description,
        "identity": descriptor.identity,
        "id_field": descriptor.id_field,
        "comparable": descriptor.comparable,
        "write_only": descriptor.write_only,
        "dependencies": dependencies,
        "fields": fields,
    })
}

fn field_line(field: &FieldSpec) -> String {
    let mut line = format!("{:<26} {:<6}", field.name, field.ty.as_str());
    if field.required {
        line.push_str(" required");
    }
    if let Some(default) = &field.default {
        line.push_str(&format!(" default={default}"));
    }
    if field.sensitive {
        line.push_str(" sensitive");
    }
    if !field.choices.is_empty() {
        let choices: Vec<String> = field.choices.iter().map(ToString::to_string).collect();
        line.push_str(&format!(" one of {}", choices.join("|")));
    }
    line
}

fn print_descriptor(descriptor: &ResourceDescriptor) {
    ui::header(&format!("{} - {}", descriptor.kind, descriptor.description));
    ui::kv("identity", &descriptor.identity.join(", "));
    if let Some(id) = &descriptor.id_field {
        ui::kv("id field", id);
    }
    ui::kv("compared", &descriptor.comparable.join(", "));
    if !descriptor.write_only.is_empty() {
        let fields: Vec<&str> = descriptor.write_only.iter().map(String::as_str).collect();
        ui::kv("write-only", &fields.join(", "));
    }
    for dependency in &descriptor.dependencies {
        ui::kv(
            "depends on",
            &format!("{} -> {}.{}", dependency.field, dependency.target_kind, dependency.target_field),
        );
    }

    println!();
    for field in &descriptor.schema.fields {
        println!("  {}", field_line(field));
        if let Some(text) = &field.description {
            ui::dim(&format!("  {text}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_ssid() {
        let registry = super::super::registry().unwrap();
        let summary = describe(registry.get("ssid").unwrap());
        assert_eq!(summary["identity"], json!(["name"]));
        assert_eq!(summary["write_only"], json!(["passphrase"]));
        assert_eq!(summary["dependencies"], json!(["site -> site.name"]));
        let passphrase = summary["fields"]
            .as_array()
            .unwrap()
            .iter()
            .find(|f| f["name"] == "passphrase")
            .unwrap();
        assert_eq!(passphrase["sensitive"], true);
    }

    #[test]
    fn test_field_line() {
        let field = FieldSpec::str("traffic_type").default("voicedata").choices(["voicedata", "data"]);
        assert_eq!(
            field_line(&field),
            "traffic_type               str    default=\"voicedata\" one of \"voicedata\"|\"data\""
        );
    }
}
